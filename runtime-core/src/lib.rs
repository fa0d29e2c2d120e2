pub mod cancel;
pub mod config;
pub mod crypto;
pub mod error;
pub mod model;
pub mod provider;
pub mod quota;
pub mod repo;
pub mod resolver;
pub mod storage;
pub mod telemetry;

pub use cancel::CancelSignal;
pub use config::RuntimeConfig;
pub use crypto::HeaderCipher;
pub use error::{Result, RuntimeError};
pub use quota::{tick_interval, QuotaDimension, QuotaEnforcer};
pub use resolver::{AgentLookup, AgentResolver, AgentSnapshot, LanguageModelCorrection};
pub use storage::Storage;
pub use telemetry::RuntimeMetrics;

use std::sync::Arc;

/// A fresh session identifier, prefixed for readability in logs and storage keys.
pub fn new_session_id() -> String {
    format!("sess_{}", uuid::Uuid::new_v4())
}

/// Convenience bundle of every repository, constructed once at process
/// startup and shared (via `Arc`) with the gateway crate.
pub struct Repos {
    pub tenants: Arc<repo::TenantRepo>,
    pub agents: Arc<repo::AgentRepo>,
    pub voices: Arc<repo::VoiceRepo>,
    pub knowledge: Arc<repo::KnowledgeRepo>,
    pub tools: Arc<repo::ToolRepo>,
    pub sessions: Arc<repo::SessionRepo>,
}

impl Repos {
    pub fn load(storage: Arc<Storage>) -> Result<Self> {
        Ok(Self {
            tenants: Arc::new(repo::TenantRepo::load(storage.clone())?),
            agents: Arc::new(repo::AgentRepo::load(storage.clone())?),
            voices: Arc::new(repo::VoiceRepo::load(storage.clone())?),
            knowledge: Arc::new(repo::KnowledgeRepo::load(storage.clone())?),
            tools: Arc::new(repo::ToolRepo::load(storage.clone())?),
            sessions: Arc::new(repo::SessionRepo::load(storage)?),
        })
    }
}
