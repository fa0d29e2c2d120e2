use runtime_core::model::{Agent, AgentQuota, Tenant, Voice, VoiceSettings};
use runtime_core::Repos;
use std::collections::HashMap;

/// Inserts a single demo tenant/agent/voice triple so the server and CLI have
/// something to resolve against without a CRUD layer in front of them (that
/// layer is out of core per spec.md §1). Idempotent: re-running against an
/// already-seeded store just overwrites the same rows.
pub fn seed_demo_tenant(repos: &Repos) -> runtime_core::Result<()> {
    let mut tenant = Tenant::new("tenant-demo", "Demo Tenant", 1_000);
    tenant.approved_domains = vec!["localhost".to_string()];
    repos.tenants.upsert(tenant)?;

    repos.voices.upsert(Voice {
        id: "voice-demo".to_string(),
        tenant_id: None,
        name: "Demo Voice".to_string(),
        provider_voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
    })?;

    let agent = Agent {
        id: "agent-demo".to_string(),
        tenant_id: "tenant-demo".to_string(),
        public_dynamic_id: "demo".to_string(),
        display_name: "Demo Agent".to_string(),
        voice_id: "voice-demo".to_string(),
        model_id: "gpt-4o-realtime".to_string(),
        tts_model_id: "eleven_turbo_v2".to_string(),
        language: "en".to_string(),
        system_prompt: "You are a helpful assistant named {{name}}.".to_string(),
        first_message: "Hi, how can I help you today?".to_string(),
        temperature: 0.7,
        max_output_tokens: 512,
        dynamic_variables: HashMap::from([("name".to_string(), "Aria".to_string())]),
        voice_settings: VoiceSettings::default(),
        per_call_token_cap: 0,
        provider_agent_id: Some("agent_demo_provider_id".to_string()),
        enabled: true,
        knowledge_item_ids: Vec::new(),
        tool_ids: Vec::new(),
        quota: AgentQuota::new(0, 0),
    };
    repos.agents.upsert(agent)?;
    Ok(())
}
