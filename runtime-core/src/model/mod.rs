mod agent;
mod knowledge;
mod session;
mod tenant;
mod tool;
mod voice;

pub use agent::{Agent, AgentQuota, UsageWindow, VoiceSettings};
pub use knowledge::{KnowledgeItem, KnowledgeKind};
pub use session::{
    Recording, SessionRecord, SessionStatus, Transcript, TransportKind, Turn, TurnRole,
};
pub use tenant::Tenant;
pub use tool::{is_sensitive_header, HeaderValue, HttpMethod, ParamSchema, Tool};
pub use voice::Voice;
