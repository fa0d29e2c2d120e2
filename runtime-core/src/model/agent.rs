use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rolling counters enforced by the Quota Enforcer (C3). `daily` resets when
/// `daily.window_start` is more than 24h in the past (I2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageWindow {
    pub used: u64,
    pub cap: u64,
    pub window_start_unix: i64,
}

impl UsageWindow {
    pub fn unbounded() -> Self {
        Self {
            used: 0,
            cap: 0,
            window_start_unix: 0,
        }
    }

    /// cap == 0 means unlimited (spec §3 convention for optional caps).
    pub fn is_unlimited(&self) -> bool {
        self.cap == 0
    }

    pub fn remaining(&self) -> u64 {
        if self.is_unlimited() {
            u64::MAX
        } else {
            self.cap.saturating_sub(self.used)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentQuota {
    pub overall: UsageWindow,
    pub daily: UsageWindow,
}

impl AgentQuota {
    pub fn new(overall_cap: u64, daily_cap: u64) -> Self {
        Self {
            overall: UsageWindow {
                used: 0,
                cap: overall_cap,
                window_start_unix: 0,
            },
            daily: UsageWindow {
                used: 0,
                cap: daily_cap,
                window_start_unix: 0,
            },
        }
    }
}

/// Speech/turn-detection tuning passed through to the provider at session start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub vad_turn_timeout_ms: u64,
    pub interruption_sensitivity: f32,
    pub background_noise_suppression: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            vad_turn_timeout_ms: 700,
            interruption_sensitivity: 0.5,
            background_noise_suppression: true,
        }
    }
}

/// A tenant-configured conversational agent (spec §3 Agent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub tenant_id: String,
    /// Stable, tenant-facing identifier used in public WS/telephony routes.
    /// Invariant I4: at most one active session per public_dynamic_id.
    pub public_dynamic_id: String,
    pub display_name: String,
    pub voice_id: String,
    pub model_id: String,
    pub tts_model_id: String,
    pub language: String,
    pub system_prompt: String,
    pub first_message: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub dynamic_variables: HashMap<String, String>,
    pub voice_settings: VoiceSettings,
    /// 0 means unlimited; otherwise the session is torn down once reached (§4.3).
    pub per_call_token_cap: u64,
    pub provider_agent_id: Option<String>,
    pub enabled: bool,
    pub knowledge_item_ids: Vec<String>,
    /// Ordered: determines the order tools are offered to the provider.
    pub tool_ids: Vec<String>,
    pub quota: AgentQuota,
}

impl Agent {
    pub fn is_admissible(&self) -> bool {
        self.enabled
    }
}
