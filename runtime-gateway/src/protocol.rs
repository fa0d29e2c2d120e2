use serde::{Deserialize, Serialize};

/// Messages the caller's browser transport sends (§6).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    ConversationInit {
        language: String,
        model: Option<String>,
    },
    UserAudioChunk {
        data_b64: String,
    },
    End,
}

/// Messages the gateway sends back over the browser transport (§6).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConversationReady,
    AudioInterfaceReady,
    AudioChunk {
        sample_rate: u32,
        channels: u8,
        format: &'static str,
        data_b64: String,
        ts: i64,
    },
    AgentResponse {
        text: String,
        ts: i64,
    },
    UserTranscript {
        text: String,
        ts: i64,
    },
    LatencyMeasurement {
        latency_ms: u64,
        ts: i64,
    },
    LanguageConfirmed {
        language: String,
        model: Option<String>,
    },
    SessionReplaced,
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn audio_chunk(data_b64: String, ts: i64) -> Self {
        ServerMessage::AudioChunk {
            sample_rate: 16_000,
            channels: 1,
            format: "pcm_s16le",
            data_b64,
            ts,
        }
    }
}

/// Telephony "start" handshake custom parameters (§4.1, §6).
#[derive(Debug, Clone, Deserialize)]
pub struct TelephonyStartParams {
    pub agent_id: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelephonyMediaPayload {
    pub payload: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelephonyFrame {
    Start {
        #[serde(rename = "customParameters")]
        custom_parameters: TelephonyStartParams,
    },
    Media {
        media: TelephonyMediaPayload,
    },
    Stop,
}

/// Machine-readable refusal reason surfaced as a transport close (§4.1, §7).
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyViolationReason {
    UnknownAgent,
    AgentDisabled,
    MissingProviderAgentId,
    DomainNotApproved,
    QuotaExhausted,
    ProviderUnreachable,
}

impl PolicyViolationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyViolationReason::UnknownAgent => "unknown_agent",
            PolicyViolationReason::AgentDisabled => "agent_disabled",
            PolicyViolationReason::MissingProviderAgentId => "missing_provider_agent_id",
            PolicyViolationReason::DomainNotApproved => "domain_not_approved",
            PolicyViolationReason::QuotaExhausted => "quota_exhausted",
            PolicyViolationReason::ProviderUnreachable => "provider_unreachable",
        }
    }
}
