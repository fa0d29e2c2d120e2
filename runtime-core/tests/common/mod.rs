use runtime_core::model::{Agent, AgentQuota, Tenant, Voice, VoiceSettings};
use std::collections::HashMap;

pub fn tenant(id: &str, balance: i64) -> Tenant {
    Tenant::new(id, format!("tenant-{id}"), balance)
}

pub fn agent(id: &str, tenant_id: &str, public_dynamic_id: &str) -> Agent {
    Agent {
        id: id.to_string(),
        tenant_id: tenant_id.to_string(),
        public_dynamic_id: public_dynamic_id.to_string(),
        display_name: "Test Agent".to_string(),
        voice_id: "voice-1".to_string(),
        model_id: "gpt-test".to_string(),
        tts_model_id: "eleven_turbo_v2".to_string(),
        language: "en".to_string(),
        system_prompt: "You are a helpful assistant, {{name}}.".to_string(),
        first_message: "Hello!".to_string(),
        temperature: 0.7,
        max_output_tokens: 512,
        dynamic_variables: HashMap::new(),
        voice_settings: VoiceSettings::default(),
        per_call_token_cap: 0,
        provider_agent_id: Some("provider-agent-1".to_string()),
        enabled: true,
        knowledge_item_ids: Vec::new(),
        tool_ids: Vec::new(),
        quota: AgentQuota::new(0, 0),
    }
}

pub fn voice(id: &str) -> Voice {
    Voice {
        id: id.to_string(),
        tenant_id: None,
        name: "Test Voice".to_string(),
        provider_voice_id: "provider-voice-1".to_string(),
    }
}

pub fn temp_storage_path(label: &str) -> std::path::PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!(
        "runtime-core-test-{label}-{}",
        std::process::id()
    ));
    p
}
