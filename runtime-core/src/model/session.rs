use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransportKind {
    Browser,
    TelephonyInbound,
    TelephonyOutbound,
    Preview,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Completed,
    AbortedQuota,
    AbortedError,
}

/// One conversation, from admission to the Post-Call Reconciler settling it
/// (spec §3 SessionRecord, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub agent_id: String,
    pub tenant_id: String,
    pub transport: TransportKind,
    pub language: String,
    pub model_id: String,
    pub start_time_unix: i64,
    pub end_time_unix: Option<i64>,
    pub status: SessionStatus,
    pub provider_conversation_id: Option<String>,
    pub tokens_consumed: u64,
    pub cost: Option<f64>,
    pub termination_cause: Option<String>,
    /// Set when the Agent Resolver rewrote the caller's requested TTS model
    /// to the language-family default (§4.2, P6); `None` when the caller's
    /// request was already compatible.
    pub language_model_correction: Option<String>,
}

impl SessionRecord {
    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, SessionStatus::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub session_id: String,
    pub audio_path: String,
    pub duration_seconds: f64,
    pub provider_conversation_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Agent,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    pub time_in_call_secs: f64,
    pub interrupted: bool,
    pub tool_calls: Option<Value>,
    pub tool_results: Option<Value>,
}

/// The reconciled, durable transcript for a session (§4.6: fetched from the
/// provider's post-call API, not reassembled from in-process turn events —
/// the provider's ordering is authoritative).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub session_id: String,
    pub turns: Vec<Turn>,
    pub summary: String,
}
