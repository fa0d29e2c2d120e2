use runtime_core::crypto::HeaderCipher;
use runtime_core::model::{HeaderValue, HttpMethod, KnowledgeItem, KnowledgeKind, ParamSchema, Tenant, Tool};
use runtime_core::provider::{KnowledgePassage, MockProviderClient, ToolCallEvent, ToolResultStatus};
use runtime_gateway::session_vars::SessionVariables;
use runtime_gateway::ToolDispatcher;
use std::collections::HashMap;
use std::sync::Arc;

fn dispatcher(provider: MockProviderClient) -> ToolDispatcher {
    ToolDispatcher::new(
        HeaderCipher::from_key_material("test-key-material"),
        Arc::new(provider),
    )
}

fn demo_tenant() -> Tenant {
    Tenant::new("tenant-demo", "Demo Tenant", 100)
}

#[tokio::test]
async fn end_call_always_succeeds_without_touching_the_network() {
    let dispatcher = dispatcher(MockProviderClient::new());
    let vars = Arc::new(SessionVariables::new(HashMap::new()));
    let event = ToolCallEvent {
        tool_name: "end_call".to_string(),
        arguments: serde_json::json!({}),
        correlation_token: "corr-1".to_string(),
    };
    let result = dispatcher
        .dispatch(&event, &[], &[], &vars, "sess-1", &demo_tenant())
        .await;
    assert_eq!(result.correlation_token, "corr-1");
    assert_eq!(result.status, ToolResultStatus::Success);
}

#[tokio::test]
async fn set_dynamic_variable_merges_string_fields_into_session_vars() {
    let dispatcher = dispatcher(MockProviderClient::new());
    let vars = Arc::new(SessionVariables::new(HashMap::from([(
        "name".to_string(),
        "Aria".to_string(),
    )])));
    let event = ToolCallEvent {
        tool_name: "set_dynamic_variable".to_string(),
        arguments: serde_json::json!({"account_tier": "gold", "ignored_number": 3}),
        correlation_token: "corr-2".to_string(),
    };
    let result = dispatcher
        .dispatch(&event, &[], &[], &vars, "sess-1", &demo_tenant())
        .await;
    assert_eq!(result.status, ToolResultStatus::Success);

    let snapshot = vars.snapshot().await;
    assert_eq!(snapshot.get("name"), Some(&"Aria".to_string()));
    assert_eq!(snapshot.get("account_tier"), Some(&"gold".to_string()));
    assert!(!snapshot.contains_key("ignored_number"));
}

#[tokio::test]
async fn set_dynamic_variable_swallows_a_failed_webhook_post() {
    let dispatcher = dispatcher(MockProviderClient::new());
    let vars = Arc::new(SessionVariables::new(HashMap::new()));
    let mut tenant = demo_tenant();
    // No listener on this port: the POST fails, but the tool call must still
    // report success (§4.5 #2 "best-effort, errors logged and swallowed").
    tenant.dynamic_variable_webhook_url =
        Some("http://127.0.0.1:1/dynamic-variables".to_string());
    let event = ToolCallEvent {
        tool_name: "set_dynamic_variable".to_string(),
        arguments: serde_json::json!({"account_tier": "gold"}),
        correlation_token: "corr-2b".to_string(),
    };
    let result = dispatcher
        .dispatch(&event, &[], &[], &vars, "sess-1", &tenant)
        .await;
    assert_eq!(result.status, ToolResultStatus::Success);
    assert_eq!(
        vars.snapshot().await.get("account_tier"),
        Some(&"gold".to_string())
    );
}

#[tokio::test]
async fn retrieve_from_knowledge_rejects_an_empty_query() {
    let dispatcher = dispatcher(MockProviderClient::new());
    let vars = Arc::new(SessionVariables::new(HashMap::new()));
    let event = ToolCallEvent {
        tool_name: "retrieve_from_knowledge".to_string(),
        arguments: serde_json::json!({}),
        correlation_token: "corr-3".to_string(),
    };
    let result = dispatcher
        .dispatch(&event, &[], &[], &vars, "sess-1", &demo_tenant())
        .await;
    assert_eq!(result.status, ToolResultStatus::Error);
}

#[tokio::test]
async fn retrieve_from_knowledge_forwards_query_and_document_ids_to_the_provider() {
    let item = KnowledgeItem {
        id: "kb-1".to_string(),
        tenant_id: "tenant-demo".to_string(),
        kind: KnowledgeKind::Text,
        name: "FAQ".to_string(),
        provider_document_id: "doc-1".to_string(),
    };
    let mut provider = MockProviderClient::new();
    provider
        .expect_retrieve_knowledge()
        .withf(|query, document_ids| query == "refund policy" && document_ids == ["doc-1"])
        .returning(|_, _| {
            Ok(vec![KnowledgePassage {
                document_id: "doc-1".to_string(),
                text: "Refunds are processed within 5 business days.".to_string(),
            }])
        });
    let dispatcher = dispatcher(provider);
    let vars = Arc::new(SessionVariables::new(HashMap::new()));
    let event = ToolCallEvent {
        tool_name: "retrieve_from_knowledge".to_string(),
        arguments: serde_json::json!({"query": "refund policy"}),
        correlation_token: "corr-3b".to_string(),
    };
    let result = dispatcher
        .dispatch(&event, &[], &[item], &vars, "sess-1", &demo_tenant())
        .await;
    assert_eq!(result.status, ToolResultStatus::Success);
    let data = result.data.unwrap();
    assert_eq!(data["passages"][0]["document_id"], "doc-1");
}

#[tokio::test]
async fn retrieve_from_knowledge_hints_a_reprompt_on_no_matching_passages() {
    let mut provider = MockProviderClient::new();
    provider
        .expect_retrieve_knowledge()
        .returning(|_, _| Ok(vec![]));
    let dispatcher = dispatcher(provider);
    let vars = Arc::new(SessionVariables::new(HashMap::new()));
    let event = ToolCallEvent {
        tool_name: "retrieve_from_knowledge".to_string(),
        arguments: serde_json::json!({"query": "something obscure"}),
        correlation_token: "corr-3c".to_string(),
    };
    let result = dispatcher
        .dispatch(&event, &[], &[], &vars, "sess-1", &demo_tenant())
        .await;
    assert_eq!(result.status, ToolResultStatus::Success);
    let data = result.data.unwrap();
    assert_eq!(data["reprompt_llm"], true);
    assert_eq!(data["passages"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn unknown_tool_name_that_matches_no_tenant_webhook_errors() {
    let dispatcher = dispatcher(MockProviderClient::new());
    let vars = Arc::new(SessionVariables::new(HashMap::new()));
    let event = ToolCallEvent {
        tool_name: "does_not_exist".to_string(),
        arguments: serde_json::json!({}),
        correlation_token: "corr-4".to_string(),
    };
    let result = dispatcher
        .dispatch(&event, &[], &[], &vars, "sess-1", &demo_tenant())
        .await;
    assert_eq!(result.status, ToolResultStatus::Error);
    assert!(result.message.unwrap().contains("does_not_exist"));
}

#[tokio::test]
async fn webhook_dispatch_fails_fast_on_a_missing_required_path_param() {
    let dispatcher = dispatcher(MockProviderClient::new());
    let vars = Arc::new(SessionVariables::new(HashMap::new()));
    let tool = Tool {
        id: "tool-1".to_string(),
        tenant_id: "tenant-demo".to_string(),
        name: "lookup_order".to_string(),
        description: String::new(),
        url_template: "https://api.example.com/orders/{order_id}".to_string(),
        method: HttpMethod::Get,
        timeout_seconds: 0,
        path_params_schema: HashMap::new(),
        query_params_schema: HashMap::new(),
        body_schema: HashMap::new(),
        response_variables: HashMap::new(),
        provider_tool_id: "provider-tool-1".to_string(),
        headers: HashMap::from([(
            "x-api-key".to_string(),
            HeaderValue::Plain("secret".to_string()),
        )]),
    };
    let event = ToolCallEvent {
        tool_name: "lookup_order".to_string(),
        arguments: serde_json::json!({}),
        correlation_token: "corr-5".to_string(),
    };
    let result = dispatcher
        .dispatch(&event, &[tool], &[], &vars, "sess-1", &demo_tenant())
        .await;
    assert_eq!(result.status, ToolResultStatus::Error);
    assert!(result.message.unwrap().contains("order_id"));
}

#[tokio::test]
async fn webhook_dispatch_fails_fast_on_a_missing_required_query_param() {
    let dispatcher = dispatcher(MockProviderClient::new());
    let vars = Arc::new(SessionVariables::new(HashMap::new()));
    let tool = Tool {
        id: "tool-2".to_string(),
        tenant_id: "tenant-demo".to_string(),
        name: "search".to_string(),
        description: String::new(),
        url_template: "https://api.example.com/search".to_string(),
        method: HttpMethod::Get,
        timeout_seconds: 5,
        path_params_schema: HashMap::new(),
        query_params_schema: HashMap::from([(
            "q".to_string(),
            ParamSchema {
                required: true,
                description: String::new(),
            },
        )]),
        body_schema: HashMap::new(),
        response_variables: HashMap::new(),
        provider_tool_id: "provider-tool-2".to_string(),
        headers: HashMap::new(),
    };
    let event = ToolCallEvent {
        tool_name: "search".to_string(),
        arguments: serde_json::json!({}),
        correlation_token: "corr-6".to_string(),
    };
    let result = dispatcher
        .dispatch(&event, &[tool], &[], &vars, "sess-1", &demo_tenant())
        .await;
    assert_eq!(result.status, ToolResultStatus::Error);
    assert!(result.message.unwrap().contains('q'));
}
