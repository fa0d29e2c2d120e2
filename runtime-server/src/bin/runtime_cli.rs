//! Local smoke-test harness for the Quota Enforcer and Post-Call Reconciler
//! (SPEC_FULL.md §B.6 "Admin/debug introspection") that exercises both
//! without a live provider connection — useful in CI or on a laptop with no
//! network access to the realtime-voice provider.

use async_trait::async_trait;
use runtime_core::model::{SessionRecord, SessionStatus, TransportKind};
use runtime_core::provider::{
    ConversationAnalysis, ConversationDetail, ConversationMetadata, ConversationSummary,
    ConversationTurn, KnowledgePassage, ProviderClient,
};
use runtime_core::quota::QuotaEnforcer;
use runtime_core::repo::ReconciliationJob;
use runtime_core::resolver::AgentResolver;
use runtime_core::storage::Storage;
use runtime_core::{HeaderCipher, Repos, RuntimeConfig, RuntimeMetrics};
use runtime_gateway::{AppState, Reconciler, ToolDispatcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Answers every call with a complete, audio-less conversation so a
/// reconciliation job can settle without reaching the network.
struct OfflineProviderClient;

#[async_trait]
impl ProviderClient for OfflineProviderClient {
    async fn get_signed_url(&self, _provider_agent_id: &str) -> runtime_core::Result<String> {
        Ok("wss://offline.invalid/signed".to_string())
    }

    async fn list_conversations(
        &self,
        provider_agent_id: &str,
        after_unix: i64,
        _before_unix: i64,
    ) -> runtime_core::Result<Vec<ConversationSummary>> {
        Ok(vec![ConversationSummary {
            conversation_id: format!("conv_{provider_agent_id}"),
            agent_id: provider_agent_id.to_string(),
            start_time_unix_secs: after_unix + 1,
        }])
    }

    async fn get_conversation_detail(
        &self,
        conversation_id: &str,
    ) -> runtime_core::Result<ConversationDetail> {
        Ok(ConversationDetail {
            conversation_id: conversation_id.to_string(),
            has_audio: false,
            metadata: Some(ConversationMetadata {
                call_duration_secs: Some(12.0),
                cost: Some(0.02),
            }),
            analysis: Some(ConversationAnalysis {
                call_summary_title: Some("Offline smoke test".to_string()),
                transcript_summary: Some("Caller asked a question, agent answered.".to_string()),
            }),
            transcript: Some(vec![ConversationTurn {
                role: "user".to_string(),
                message: Some("hello".to_string()),
                time_in_call_secs: Some(0.5),
                interrupted: Some(false),
                tool_calls: None,
                tool_results: None,
            }]),
        })
    }

    async fn fetch_audio(&self, _conversation_id: &str) -> runtime_core::Result<Vec<u8>> {
        Ok(Vec::new())
    }

    async fn retrieve_knowledge(
        &self,
        _query: &str,
        document_ids: &[String],
    ) -> runtime_core::Result<Vec<KnowledgePassage>> {
        Ok(document_ids
            .iter()
            .map(|id| KnowledgePassage {
                document_id: id.clone(),
                text: "offline smoke test passage".to_string(),
            })
            .collect())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    runtime_server::init_tracing();

    let mut config = RuntimeConfig::load();
    // Keep the smoke test fast regardless of the configured tick rate.
    config.tokens_per_minute = 600;
    config.settle_delay_seconds = 0;

    let storage = Arc::new(Storage::new(&config.storage_path)?);
    let repos = Arc::new(Repos::load(storage)?);
    let metrics = Arc::new(RuntimeMetrics::new());

    let resolver = Arc::new(AgentResolver::new(
        repos.agents.clone(),
        repos.tenants.clone(),
        repos.voices.clone(),
        repos.knowledge.clone(),
        repos.tools.clone(),
        config.default_en_tts_model.clone(),
        config.default_multi_tts_model.clone(),
        config.english_capable_tts_models.clone(),
        config.multilingual_tts_models.clone(),
    ));

    let quota = Arc::new(QuotaEnforcer::new(
        repos.tenants.clone(),
        repos.agents.clone(),
        repos.sessions.clone(),
        metrics.clone(),
        config.tokens_per_minute,
    ));

    let provider: Arc<dyn ProviderClient> = Arc::new(OfflineProviderClient);

    let cipher = HeaderCipher::from_key_material(&config.encryption_key);
    let tool_dispatcher = Arc::new(ToolDispatcher::new(cipher, provider.clone()));

    let reconciler = Reconciler::new(
        repos.sessions.clone(),
        provider.clone(),
        metrics.clone(),
        PathBuf::from(&config.audio_storage_root),
        Duration::from_secs(config.settle_delay_seconds),
        config.reconciler_max_retries,
        config.reconciler_worker_count,
    );

    let state = Arc::new(AppState {
        repos,
        resolver,
        quota,
        provider,
        tool_dispatcher,
        reconciler,
        metrics,
        config: Arc::new(config),
    });

    runtime_server::seed::seed_demo_tenant(&state.repos)?;
    println!("seeded demo tenant-demo / agent-demo / voice-demo");

    let snapshot = state
        .resolver
        .resolve(runtime_core::resolver::AgentLookup::PublicDynamicId("demo"))?;
    state.quota.admit(&snapshot)?;
    println!("admission check passed for agent public id 'demo'");

    let session_id = "sess_cli_smoke".to_string();
    state.repos.sessions.create(SessionRecord {
        id: session_id.clone(),
        agent_id: snapshot.agent.id.clone(),
        tenant_id: snapshot.tenant.id.clone(),
        transport: TransportKind::Preview,
        language: snapshot.agent.language.clone(),
        model_id: snapshot.agent.tts_model_id.clone(),
        start_time_unix: 0,
        end_time_unix: Some(0),
        status: SessionStatus::Completed,
        provider_conversation_id: None,
        tokens_consumed: 0,
        cost: None,
        termination_cause: None,
        language_model_correction: None,
    })?;

    for i in 1..=3 {
        match state
            .quota
            .tick(&session_id, &snapshot.agent.id, &snapshot.tenant.id, 0)?
        {
            Ok(()) => println!("tick {i}: debited 1 token"),
            Err(dim) => println!("tick {i}: breached {}", dim.reason_code()),
        }
    }

    let workers = state.reconciler.clone().spawn().await;
    state
        .reconciler
        .enqueue(ReconciliationJob {
            session_id: session_id.clone(),
            provider_agent_id: snapshot.agent.provider_agent_id.clone().unwrap(),
            start_time_unix: 0,
            end_time_unix: 0,
            tentative_provider_conversation_id: None,
            attempts: 0,
        })
        .await?;

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    for h in workers {
        h.abort();
    }

    let session = state.repos.sessions.get(&session_id)?;
    println!(
        "session {} reconciled: status={:?} provider_conversation_id={:?} cost={:?}",
        session.id, session.status, session.provider_conversation_id, session.cost
    );

    Ok(())
}
