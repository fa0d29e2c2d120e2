use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Response of the provider's "get-signed-URL" admission endpoint (§4.4).
#[derive(Debug, Clone, Deserialize)]
pub struct SignedUrlResponse {
    pub signed_url: String,
}

/// The single initiation message sent immediately after the provider
/// WebSocket opens (§4.4).
#[derive(Debug, Clone, Serialize)]
pub struct ConversationInitPayload {
    pub conversation_config_override: ConversationConfigOverride,
    pub extra_body: ExtraBody,
    pub dynamic_variables: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationConfigOverride {
    pub agent: AgentConfigOverride,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentConfigOverride {
    pub language: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtraBody {
    pub model: String,
    pub voice_id: String,
}

/// A conversation summary as returned by the "list conversations" endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub agent_id: String,
    pub start_time_unix_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub message: Option<String>,
    pub time_in_call_secs: Option<f64>,
    pub interrupted: Option<bool>,
    pub tool_calls: Option<Value>,
    pub tool_results: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationAnalysis {
    pub call_summary_title: Option<String>,
    pub transcript_summary: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationMetadata {
    pub call_duration_secs: Option<f64>,
    pub cost: Option<f64>,
}

/// Full conversation detail (§4.6 step 3). Any of `metadata`/`analysis`/
/// `transcript` may be absent while the provider is still finalizing —
/// callers must treat that as "incomplete, retry".
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationDetail {
    pub conversation_id: String,
    pub has_audio: bool,
    pub metadata: Option<ConversationMetadata>,
    pub analysis: Option<ConversationAnalysis>,
    pub transcript: Option<Vec<ConversationTurn>>,
}

impl ConversationDetail {
    pub fn is_complete(&self) -> bool {
        self.metadata.is_some() && self.analysis.is_some() && self.transcript.is_some()
    }
}

/// Request body for the provider's knowledge-base retrieval endpoint,
/// scoped to the document ids the calling agent actually has attached
/// (§4.5 #3: "forward the query ... using stored provider document ids").
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeRetrievalRequest {
    pub query: String,
    pub document_ids: Vec<String>,
}

/// One retrieved passage, echoed back to the LLM via the tool result.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KnowledgePassage {
    pub document_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeRetrievalResponse {
    #[serde(default)]
    pub passages: Vec<KnowledgePassage>,
}

/// A tool-call event emitted by the provider mid-session, answered by the
/// Tool Dispatcher with a `ToolResultFrame` bearing the same token (R1).
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallEvent {
    pub tool_name: String,
    pub arguments: Value,
    pub correlation_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolResultFrame {
    pub correlation_token: String,
    pub status: ToolResultStatus,
    pub data: Option<Value>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolResultStatus {
    Success,
    Error,
}
