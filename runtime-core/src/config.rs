use std::fs;
use std::path::Path;

/// Runtime-wide configuration, loaded from environment variables with an
/// optional TOML overlay (§6 "Environment / configuration").
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub provider_api_key: String,
    pub provider_base_url: String,
    pub tokens_per_minute: i64,
    pub settle_delay_seconds: u64,
    pub provider_idle_timeout_seconds: u64,
    pub signed_url_timeout_seconds: u64,
    pub default_en_tts_model: String,
    pub default_multi_tts_model: String,
    pub english_capable_tts_models: Vec<String>,
    pub multilingual_tts_models: Vec<String>,
    pub approved_domain_list: Vec<String>,
    pub audio_storage_root: String,
    pub encryption_key: String,
    pub storage_path: String,
    pub reconciler_worker_count: usize,
    pub reconciler_max_retries: u32,
    /// Base `wss://` URL the telephony voice-URL webhook points callers back
    /// at when instructing the telephony provider to open its media stream
    /// (§4.1, §6 "Telephony webhook (voice URL)").
    pub telephony_websocket_base_url: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            provider_api_key: std::env::var("PROVIDER_API_KEY").unwrap_or_default(),
            provider_base_url: std::env::var("PROVIDER_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "https://api.elevenlabs.io".to_string()),
            tokens_per_minute: std::env::var("TOKENS_PER_MINUTE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            settle_delay_seconds: std::env::var("SETTLE_DELAY_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            provider_idle_timeout_seconds: std::env::var("PROVIDER_IDLE_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            signed_url_timeout_seconds: std::env::var("SIGNED_URL_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            default_en_tts_model: std::env::var("DEFAULT_EN_TTS_MODEL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "eleven_turbo_v2".to_string()),
            default_multi_tts_model: std::env::var("DEFAULT_MULTI_TTS_MODEL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "eleven_turbo_v2_5".to_string()),
            english_capable_tts_models: vec![
                "eleven_turbo_v2".to_string(),
                "eleven_monolingual_v1".to_string(),
            ],
            multilingual_tts_models: vec![
                "eleven_turbo_v2_5".to_string(),
                "eleven_multilingual_v2".to_string(),
            ],
            approved_domain_list: std::env::var("APPROVED_DOMAIN_LIST")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default(),
            audio_storage_root: std::env::var("AUDIO_STORAGE_ROOT")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "audio_storage/elevenlabs_conversations".to_string()),
            encryption_key: std::env::var("ENCRYPTION_KEY").unwrap_or_default(),
            storage_path: std::env::var("RUNTIME_STORAGE_PATH")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "runtime_data".to_string()),
            reconciler_worker_count: std::env::var("RECONCILER_WORKER_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            reconciler_max_retries: std::env::var("RECONCILER_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            telephony_websocket_base_url: std::env::var("TELEPHONY_WEBSOCKET_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "wss://localhost:8080".to_string()),
        }
    }
}

impl RuntimeConfig {
    /// Loads defaults from the environment, then overlays a TOML file if one
    /// is found at `RUNTIME_CONFIG` (or `./runtime.toml`).
    pub fn load() -> Self {
        let default = Self::default();
        let path = std::env::var("RUNTIME_CONFIG").unwrap_or_else(|_| "runtime.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target = "runtime_core", path = %path, "no TOML config found; using env/defaults");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match toml::from_str::<RuntimeConfigToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target = "runtime_core", error = %e, "failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target = "runtime_core", error = %e, "failed to read TOML; using defaults");
                default
            }
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct RuntimeConfigToml {
    provider_api_key: Option<String>,
    provider_base_url: Option<String>,
    tokens_per_minute: Option<i64>,
    settle_delay_seconds: Option<u64>,
    provider_idle_timeout_seconds: Option<u64>,
    signed_url_timeout_seconds: Option<u64>,
    default_en_tts_model: Option<String>,
    default_multi_tts_model: Option<String>,
    english_capable_tts_models: Option<Vec<String>>,
    multilingual_tts_models: Option<Vec<String>>,
    approved_domain_list: Option<Vec<String>>,
    audio_storage_root: Option<String>,
    encryption_key: Option<String>,
    storage_path: Option<String>,
    reconciler_worker_count: Option<usize>,
    reconciler_max_retries: Option<u32>,
    telephony_websocket_base_url: Option<String>,
}

impl RuntimeConfigToml {
    fn overlay(self, mut base: RuntimeConfig) -> RuntimeConfig {
        if let Some(v) = self.provider_api_key {
            base.provider_api_key = v;
        }
        if let Some(v) = self.provider_base_url {
            base.provider_base_url = v;
        }
        if let Some(v) = self.tokens_per_minute {
            base.tokens_per_minute = v;
        }
        if let Some(v) = self.settle_delay_seconds {
            base.settle_delay_seconds = v;
        }
        if let Some(v) = self.provider_idle_timeout_seconds {
            base.provider_idle_timeout_seconds = v;
        }
        if let Some(v) = self.signed_url_timeout_seconds {
            base.signed_url_timeout_seconds = v;
        }
        if let Some(v) = self.default_en_tts_model {
            base.default_en_tts_model = v;
        }
        if let Some(v) = self.default_multi_tts_model {
            base.default_multi_tts_model = v;
        }
        if let Some(v) = self.english_capable_tts_models {
            base.english_capable_tts_models = v;
        }
        if let Some(v) = self.multilingual_tts_models {
            base.multilingual_tts_models = v;
        }
        if let Some(v) = self.approved_domain_list {
            base.approved_domain_list = v;
        }
        if let Some(v) = self.audio_storage_root {
            base.audio_storage_root = v;
        }
        if let Some(v) = self.encryption_key {
            base.encryption_key = v;
        }
        if let Some(v) = self.storage_path {
            base.storage_path = v;
        }
        if let Some(v) = self.reconciler_worker_count {
            base.reconciler_worker_count = v;
        }
        if let Some(v) = self.reconciler_max_retries {
            base.reconciler_max_retries = v;
        }
        if let Some(v) = self.telephony_websocket_base_url {
            base.telephony_websocket_base_url = v;
        }
        base
    }
}
