use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    /// None for a built-in preset voice; Some(tenant_id) for a tenant-cloned voice.
    pub tenant_id: Option<String>,
    pub name: String,
    pub provider_voice_id: String,
}
