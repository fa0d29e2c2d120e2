use runtime_core::model::{SessionRecord, SessionStatus, TransportKind};
use runtime_core::provider::{
    ConversationAnalysis, ConversationDetail, ConversationMetadata, ConversationSummary,
    MockProviderClient, ProviderClient,
};
use runtime_core::repo::{ReconciliationJob, SessionRepo};
use runtime_core::storage::Storage;
use runtime_core::telemetry::RuntimeMetrics;
use runtime_gateway::Reconciler;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn temp_storage_path(label: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("runtime-gateway-test-{label}-{}", std::process::id()));
    p
}

fn session_record(id: &str, agent_id: &str, tenant_id: &str) -> SessionRecord {
    SessionRecord {
        id: id.to_string(),
        agent_id: agent_id.to_string(),
        tenant_id: tenant_id.to_string(),
        transport: TransportKind::Browser,
        language: "en".to_string(),
        model_id: "eleven_turbo_v2".to_string(),
        start_time_unix: 0,
        end_time_unix: Some(0),
        status: SessionStatus::Active,
        provider_conversation_id: None,
        tokens_consumed: 0,
        cost: None,
        termination_cause: None,
        language_model_correction: None,
    }
}

#[tokio::test]
async fn settles_a_completed_conversation_and_marks_the_session_done() {
    let path = temp_storage_path("settle-ok");
    let storage = Arc::new(Storage::new(&path).unwrap());
    let sessions = Arc::new(SessionRepo::load(storage).unwrap());
    sessions
        .create(session_record("sess-settle", "agent-1", "tenant-1"))
        .unwrap();

    let mut provider = MockProviderClient::new();
    provider.expect_list_conversations().returning(|_, _, _| {
        Ok(vec![ConversationSummary {
            conversation_id: "conv-1".to_string(),
            agent_id: "agent-1".to_string(),
            start_time_unix_secs: 0,
        }])
    });
    provider.expect_get_conversation_detail().returning(|id| {
        Ok(ConversationDetail {
            conversation_id: id.to_string(),
            has_audio: false,
            metadata: Some(ConversationMetadata {
                call_duration_secs: Some(9.0),
                cost: Some(0.01),
            }),
            analysis: Some(ConversationAnalysis {
                call_summary_title: Some("title".to_string()),
                transcript_summary: Some("summary".to_string()),
            }),
            transcript: Some(Vec::new()),
        })
    });

    let metrics = Arc::new(RuntimeMetrics::new());
    let reconciler = Reconciler::new(
        sessions.clone(),
        Arc::new(provider) as Arc<dyn ProviderClient>,
        metrics,
        std::env::temp_dir(),
        Duration::from_secs(0),
        3,
        1,
    );

    let workers = reconciler.clone().spawn().await;
    reconciler
        .enqueue(ReconciliationJob {
            session_id: "sess-settle".to_string(),
            provider_agent_id: "agent-1".to_string(),
            start_time_unix: 0,
            end_time_unix: 0,
            tentative_provider_conversation_id: None,
            attempts: 0,
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    for h in workers {
        h.abort();
    }

    let session = sessions.get("sess-settle").unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.provider_conversation_id.as_deref(), Some("conv-1"));
    assert_eq!(session.cost, Some(0.01));

    let _ = std::fs::remove_dir_all(&path);
}

#[tokio::test]
async fn is_a_no_op_when_the_session_already_has_a_recording() {
    let path = temp_storage_path("already-settled");
    let storage = Arc::new(Storage::new(&path).unwrap());
    let sessions = Arc::new(SessionRepo::load(storage).unwrap());
    sessions
        .create(session_record("sess-done", "agent-1", "tenant-1"))
        .unwrap();
    sessions
        .put_recording(runtime_core::model::Recording {
            session_id: "sess-done".to_string(),
            audio_path: "already/written.wav".to_string(),
            duration_seconds: 4.0,
            provider_conversation_id: "conv-existing".to_string(),
        })
        .unwrap();

    let mut provider = MockProviderClient::new();
    provider.expect_list_conversations().times(0).returning(|_, _, _| Ok(Vec::new()));
    provider
        .expect_get_conversation_detail()
        .times(0)
        .returning(|id| {
            Ok(ConversationDetail {
                conversation_id: id.to_string(),
                has_audio: false,
                metadata: None,
                analysis: None,
                transcript: None,
            })
        });

    let metrics = Arc::new(RuntimeMetrics::new());
    let reconciler = Reconciler::new(
        sessions.clone(),
        Arc::new(provider) as Arc<dyn ProviderClient>,
        metrics,
        std::env::temp_dir(),
        Duration::from_secs(0),
        3,
        1,
    );

    let workers = reconciler.clone().spawn().await;
    reconciler
        .enqueue(ReconciliationJob {
            session_id: "sess-done".to_string(),
            provider_agent_id: "agent-1".to_string(),
            start_time_unix: 0,
            end_time_unix: 0,
            tentative_provider_conversation_id: None,
            attempts: 0,
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    for h in workers {
        h.abort();
    }

    let _ = std::fs::remove_dir_all(&path);
}
