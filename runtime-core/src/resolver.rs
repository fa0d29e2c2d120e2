use crate::model::{Agent, KnowledgeItem, Tenant, Tool, Voice};
use crate::repo::{AgentRepo, KnowledgeRepo, TenantRepo, ToolRepo, VoiceRepo};
use crate::{Result, RuntimeError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

const ENGLISH_LANGUAGES: &[&str] = &["en", "en-US", "en-GB"];

/// Which id the gateway is routing by: browser/preview address agents by
/// public dynamic id, telephony custom parameters carry the internal id.
pub enum AgentLookup<'a> {
    PublicDynamicId(&'a str),
    InternalId(&'a str),
}

/// Immutable per-session copy of an agent and everything it references.
/// Subsequent CRUD mutations to the underlying Agent/Tool/KnowledgeItem rows
/// must never be observed by a session already holding a snapshot (§4.2).
#[derive(Debug, Clone)]
pub struct AgentSnapshot {
    pub agent: Agent,
    pub tenant: Tenant,
    pub voice: Voice,
    pub knowledge_items: Vec<KnowledgeItem>,
    pub tools: Vec<Tool>,
    /// Non-empty only when `resolve_conversation_init` rewrote the caller's
    /// requested language/model combination.
    pub correction: Option<LanguageModelCorrection>,
}

#[derive(Debug, Clone)]
pub struct LanguageModelCorrection {
    pub requested_language: String,
    pub requested_model: String,
    pub effective_model: String,
}

pub struct AgentResolver {
    agents: Arc<AgentRepo>,
    tenants: Arc<TenantRepo>,
    voices: Arc<VoiceRepo>,
    knowledge: Arc<KnowledgeRepo>,
    tools: Arc<ToolRepo>,
    default_en_tts_model: String,
    default_multi_tts_model: String,
    english_capable_models: Vec<String>,
    multilingual_models: Vec<String>,
}

impl AgentResolver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agents: Arc<AgentRepo>,
        tenants: Arc<TenantRepo>,
        voices: Arc<VoiceRepo>,
        knowledge: Arc<KnowledgeRepo>,
        tools: Arc<ToolRepo>,
        default_en_tts_model: String,
        default_multi_tts_model: String,
        english_capable_models: Vec<String>,
        multilingual_models: Vec<String>,
    ) -> Self {
        Self {
            agents,
            tenants,
            voices,
            knowledge,
            tools,
            default_en_tts_model,
            default_multi_tts_model,
            english_capable_models,
            multilingual_models,
        }
    }

    #[instrument(skip(self), fields(agent_lookup))]
    pub fn resolve(&self, lookup: AgentLookup<'_>) -> Result<AgentSnapshot> {
        let agent = match lookup {
            AgentLookup::PublicDynamicId(id) => self.agents.get_by_public_id(id)?,
            AgentLookup::InternalId(id) => self.agents.get(id)?,
        };
        if !agent.is_admissible() {
            return Err(RuntimeError::AdmissionRefused(format!(
                "agent {} disabled",
                agent.id
            )));
        }
        let tenant = self.tenants.get(&agent.tenant_id)?;
        let voice = self.voices.get(&agent.voice_id)?;
        let knowledge_items = self.knowledge.get_many(&agent.knowledge_item_ids)?;
        let tools = self.tools.get_many(&agent.tool_ids)?;

        Ok(AgentSnapshot {
            agent,
            tenant,
            voice,
            knowledge_items,
            tools,
            correction: None,
        })
    }

    fn is_english(language: &str) -> bool {
        ENGLISH_LANGUAGES
            .iter()
            .any(|l| l.eq_ignore_ascii_case(language))
    }

    /// Applies the `conversation_init` payload to a freshly resolved snapshot:
    /// picks the effective language and, if the caller's proposed model is
    /// incompatible with the language family, substitutes the configured
    /// default and records the correction (§4.2, P6).
    pub fn apply_conversation_init(
        &self,
        mut snapshot: AgentSnapshot,
        requested_language: &str,
        requested_model: Option<&str>,
    ) -> AgentSnapshot {
        snapshot.agent.language = requested_language.to_string();
        let english = Self::is_english(requested_language);
        let allowed = if english {
            &self.english_capable_models
        } else {
            &self.multilingual_models
        };

        let current_model = requested_model.unwrap_or(&snapshot.agent.tts_model_id).to_string();
        let compatible = allowed.iter().any(|m| m == &current_model);

        if !compatible {
            let default = if english {
                self.default_en_tts_model.clone()
            } else {
                self.default_multi_tts_model.clone()
            };
            snapshot.correction = Some(LanguageModelCorrection {
                requested_language: requested_language.to_string(),
                requested_model: current_model,
                effective_model: default.clone(),
            });
            snapshot.agent.tts_model_id = default;
        } else {
            snapshot.agent.tts_model_id = current_model;
        }

        snapshot
    }

    /// Merges the agent's declared dynamic-variable defaults with
    /// session-level values. Placeholders are kept unsubstituted (§9):
    /// the provider performs the `{{name}}` substitution, not this runtime.
    pub fn merged_dynamic_variables(
        snapshot: &AgentSnapshot,
        session_id: &str,
        user_id: &str,
        public_dynamic_id: &str,
        start_timestamp: i64,
        client_type: &str,
    ) -> HashMap<String, String> {
        let mut vars = snapshot.agent.dynamic_variables.clone();
        vars.insert("user_id".to_string(), user_id.to_string());
        vars.insert("session_id".to_string(), session_id.to_string());
        vars.insert(
            "public_dynamic_id".to_string(),
            public_dynamic_id.to_string(),
        );
        vars.insert("session_start".to_string(), start_timestamp.to_string());
        vars.insert("client_type".to_string(), client_type.to_string());
        vars
    }
}
