use crate::session_vars::SessionVariables;
use runtime_core::crypto::HeaderCipher;
use runtime_core::model::{HttpMethod, KnowledgeItem, Tenant, Tool};
use runtime_core::provider::{ProviderClient, ToolCallEvent, ToolResultFrame, ToolResultStatus};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

/// Resolves and executes tool-call events from the provider: the three
/// built-ins plus tenant-defined webhooks (§4.5).
pub struct ToolDispatcher {
    http: reqwest::Client,
    cipher: HeaderCipher,
    provider: Arc<dyn ProviderClient>,
}

impl ToolDispatcher {
    pub fn new(cipher: HeaderCipher, provider: Arc<dyn ProviderClient>) -> Self {
        Self {
            http: reqwest::Client::new(),
            cipher,
            provider,
        }
    }

    #[instrument(skip(self, event, tools, knowledge_items, vars, tenant), fields(tool = %event.tool_name))]
    #[allow(clippy::too_many_arguments)]
    pub async fn dispatch(
        &self,
        event: &ToolCallEvent,
        tools: &[Tool],
        knowledge_items: &[KnowledgeItem],
        vars: &Arc<SessionVariables>,
        session_id: &str,
        tenant: &Tenant,
    ) -> ToolResultFrame {
        let result = match event.tool_name.as_str() {
            "end_call" => self.end_call().await,
            "set_dynamic_variable" => self.set_dynamic_variable(event, vars, tenant).await,
            "retrieve_from_knowledge" => {
                self.retrieve_from_knowledge(event, knowledge_items).await
            }
            name => match tools.iter().find(|t| t.name == name) {
                Some(tool) => {
                    self.dispatch_webhook(tool, event, vars, session_id).await
                }
                None => (
                    ToolResultStatus::Error,
                    None,
                    Some(format!("unknown tool {name}")),
                ),
            },
        };
        let (status, data, message) = result;
        ToolResultFrame {
            correlation_token: event.correlation_token.clone(),
            status,
            data,
            message,
        }
    }

    /// Signals end-of-call intent; actual shutdown is scheduled by the
    /// Provider Bridge ~5s later so the agent can finish speaking (§4.4, §4.5 #1).
    async fn end_call(&self) -> (ToolResultStatus, Option<Value>, Option<String>) {
        (
            ToolResultStatus::Success,
            Some(serde_json::json!({"message": "call end initiated"})),
            None,
        )
    }

    /// Persists the (session, name→value) map and, if the tenant has a
    /// configured outbound webhook, POSTs it there best-effort (§4.5 #2):
    /// failures are logged and swallowed, never surfaced to the provider.
    async fn set_dynamic_variable(
        &self,
        event: &ToolCallEvent,
        vars: &Arc<SessionVariables>,
        tenant: &Tenant,
    ) -> (ToolResultStatus, Option<Value>, Option<String>) {
        let Some(obj) = event.arguments.as_object() else {
            return (
                ToolResultStatus::Error,
                None,
                Some("arguments must be an object".to_string()),
            );
        };
        let updates: HashMap<String, String> = obj
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect();
        vars.set_many(updates.clone()).await;

        if let Some(url) = &tenant.dynamic_variable_webhook_url {
            if let Err(e) = self.http.post(url).json(&updates).send().await {
                warn!(error = %e, "dynamic-variable webhook post failed, ignoring");
            }
        }
        (ToolResultStatus::Success, None, None)
    }

    /// Forwards the query to the provider's retrieval endpoint using stored
    /// provider document ids (§4.5 #3). No-result returns an empty list with
    /// a re-prompt hint rather than an error.
    async fn retrieve_from_knowledge(
        &self,
        event: &ToolCallEvent,
        knowledge_items: &[KnowledgeItem],
    ) -> (ToolResultStatus, Option<Value>, Option<String>) {
        let query = event
            .arguments
            .get("query")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if query.is_empty() {
            return (
                ToolResultStatus::Error,
                None,
                Some("missing query".to_string()),
            );
        }
        let document_ids: Vec<String> = knowledge_items
            .iter()
            .map(|item| item.provider_document_id.clone())
            .collect();

        let passages = match self.provider.retrieve_knowledge(query, &document_ids).await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "knowledge retrieval failed");
                return (
                    ToolResultStatus::Error,
                    None,
                    Some("knowledge retrieval failed".to_string()),
                );
            }
        };

        if passages.is_empty() {
            return (
                ToolResultStatus::Success,
                Some(serde_json::json!({
                    "passages": [],
                    "reprompt_llm": true,
                    "hint": "no matching passages found",
                })),
                None,
            );
        }
        (
            ToolResultStatus::Success,
            Some(serde_json::json!({ "passages": passages })),
            None,
        )
    }

    async fn dispatch_webhook(
        &self,
        tool: &Tool,
        event: &ToolCallEvent,
        vars: &Arc<SessionVariables>,
        session_id: &str,
    ) -> (ToolResultStatus, Option<Value>, Option<String>) {
        let args = event.arguments.as_object().cloned().unwrap_or_default();

        let url = match substitute_path_placeholders(&tool.url_template, &args) {
            Ok(u) => u,
            Err(missing) => {
                return (
                    ToolResultStatus::Error,
                    None,
                    Some(format!("missing required path parameter: {missing}")),
                )
            }
        };

        let mut request = self
            .http
            .request(tool.method.as_reqwest(), url)
            .timeout(Duration::from_secs(if tool.timeout_seconds > 0 {
                tool.timeout_seconds
            } else {
                Tool::default_timeout()
            }));

        for (name, schema) in &tool.query_params_schema {
            if let Some(value) = args.get(name).and_then(|v| v.as_str()) {
                request = request.query(&[(name.as_str(), value)]);
            } else if schema.required {
                return (
                    ToolResultStatus::Error,
                    None,
                    Some(format!("missing required query parameter: {name}")),
                );
            }
        }

        if !matches!(tool.method, HttpMethod::Get) && !tool.body_schema.is_empty() {
            let mut body = serde_json::Map::new();
            for (name, schema) in &tool.body_schema {
                match args.get(name) {
                    Some(v) => {
                        body.insert(name.clone(), v.clone());
                    }
                    None if schema.required => {
                        return (
                            ToolResultStatus::Error,
                            None,
                            Some(format!("missing required body field: {name}")),
                        )
                    }
                    None => {}
                }
            }
            request = request.json(&Value::Object(body));
        }

        for (name, header_value) in &tool.headers {
            match self.cipher.decrypt(header_value) {
                Ok(plain) => request = request.header(name, plain),
                Err(e) => {
                    warn!(error = %e, "failed to decrypt tool header, skipping");
                }
            }
        }
        request = request.header("x-session-id", session_id);

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                return (
                    ToolResultStatus::Error,
                    None,
                    Some(format!("request failed: {e}")),
                )
            }
        };
        let status_ok = response.status().is_success();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !tool.response_variables.is_empty() {
            let mut updates = HashMap::new();
            for (var_name, path) in &tool.response_variables {
                if let Some(extracted) = extract_json_path(&body, path) {
                    updates.insert(var_name.clone(), value_to_string(&extracted));
                }
            }
            if !updates.is_empty() {
                vars.set_many(updates).await;
            }
        }

        if status_ok {
            (ToolResultStatus::Success, Some(body), None)
        } else {
            (
                ToolResultStatus::Error,
                None,
                Some("tool endpoint returned a non-2xx response".to_string()),
            )
        }
    }
}

fn substitute_path_placeholders(
    template: &str,
    args: &serde_json::Map<String, Value>,
) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            let mut name = String::new();
            for c2 in chars.by_ref() {
                if c2 == '}' {
                    break;
                }
                name.push(c2);
            }
            match args.get(&name).and_then(|v| v.as_str()) {
                Some(value) => out.push_str(&urlencoding::encode(value)),
                None => return Err(name),
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

/// Minimal dotted-path reader sufficient for the response-variable maps
/// (§4.5): `"data.items.0.id"`-style paths, no wildcards.
fn extract_json_path(root: &Value, path: &str) -> Option<Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = if let Ok(index) = segment.parse::<usize>() {
            current.get(index)?
        } else {
            current.get(segment)?
        };
    }
    Some(current.clone())
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(json: serde_json::Value) -> serde_json::Map<String, Value> {
        json.as_object().unwrap().clone()
    }

    #[test]
    fn substitute_path_placeholders_fills_in_known_params() {
        let a = args(serde_json::json!({"order_id": "abc 123"}));
        let url = substitute_path_placeholders("https://api.example.com/orders/{order_id}", &a)
            .unwrap();
        assert_eq!(url, "https://api.example.com/orders/abc%20123");
    }

    #[test]
    fn substitute_path_placeholders_reports_missing_param() {
        let a = args(serde_json::json!({}));
        let err = substitute_path_placeholders("/orders/{order_id}", &a).unwrap_err();
        assert_eq!(err, "order_id");
    }

    #[test]
    fn extract_json_path_walks_nested_objects_and_arrays() {
        let body = serde_json::json!({"data": {"items": [{"id": "x1"}, {"id": "x2"}]}});
        let found = extract_json_path(&body, "data.items.1.id").unwrap();
        assert_eq!(found, Value::String("x2".to_string()));
    }

    #[test]
    fn extract_json_path_returns_none_for_missing_segment() {
        let body = serde_json::json!({"data": {}});
        assert!(extract_json_path(&body, "data.missing").is_none());
    }

    #[test]
    fn value_to_string_unwraps_plain_strings_but_stringifies_other_json() {
        assert_eq!(value_to_string(&Value::String("ok".to_string())), "ok");
        assert_eq!(value_to_string(&serde_json::json!(42)), "42");
    }
}
