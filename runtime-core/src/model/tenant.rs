use serde::{Deserialize, Serialize};

/// Owns agents and holds the token balance debited by the Quota Enforcer (C3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    /// Invariant I2/I3/P3: never goes negative; a tick that would cross zero
    /// aborts the session before the debit is committed.
    pub token_balance: i64,
    pub approved_domains: Vec<String>,
    /// Best-effort sink for `set_dynamic_variable` updates (§4.5 #2): `None`
    /// means the tenant has not configured one and the POST is skipped.
    pub dynamic_variable_webhook_url: Option<String>,
}

impl Tenant {
    pub fn new(id: impl Into<String>, name: impl Into<String>, token_balance: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            token_balance,
            approved_domains: Vec::new(),
            dynamic_variable_webhook_url: None,
        }
    }
}
