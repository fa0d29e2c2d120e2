use runtime_core::provider::{HttpProviderClient, ProviderClient, ProviderClientConfig};
use runtime_core::{HeaderCipher, RuntimeConfig, RuntimeMetrics};
use runtime_core::resolver::AgentResolver;
use runtime_core::quota::QuotaEnforcer;
use runtime_core::storage::Storage;
use runtime_core::Repos;
use runtime_gateway::{AppState, Reconciler, ToolDispatcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub mod seed;

/// Builds the full process wiring described in SPEC_FULL.md §C (runtime-core
/// data/quota/resolver layer handed to the runtime-gateway session machinery),
/// mirroring how `bridge/src/bin/server.rs` wires a `Loom` instance before
/// handing it to `start_server`.
pub fn build_app_state(config: RuntimeConfig) -> runtime_core::Result<Arc<AppState>> {
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

    let provider: Arc<dyn ProviderClient> = Arc::new(HttpProviderClient::new(ProviderClientConfig {
        base_url: config.provider_base_url.clone(),
        api_key: config.provider_api_key.clone(),
        signed_url_timeout: Duration::from_secs(config.signed_url_timeout_seconds),
        request_timeout: Duration::from_secs(30),
    })?);

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

    Ok(Arc::new(AppState {
        repos,
        resolver,
        quota,
        provider,
        tool_dispatcher,
        reconciler,
        metrics,
        config: Arc::new(config),
    }))
}

pub fn init_tracing() {
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,runtime_gateway=info,runtime_core=info".to_string());
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
