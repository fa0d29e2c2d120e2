mod client;
mod types;

pub use client::{HttpProviderClient, ProviderClient, ProviderClientConfig};
#[cfg(any(test, feature = "test-util"))]
pub use client::MockProviderClient;
pub use types::{
    AgentConfigOverride, ConversationAnalysis, ConversationConfigOverride, ConversationDetail,
    ConversationListResponse, ConversationMetadata, ConversationSummary, ConversationInitPayload,
    ConversationTurn, ExtraBody, KnowledgePassage, KnowledgeRetrievalRequest,
    KnowledgeRetrievalResponse, SignedUrlResponse, ToolCallEvent, ToolResultFrame,
    ToolResultStatus,
};
