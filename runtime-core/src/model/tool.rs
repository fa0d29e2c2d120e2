use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_reqwest(&self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// One entry of a JSON-Schema-like parameter description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSchema {
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

/// A header value as stored at rest. Sensitive names (§4.5/§9: `authorization`,
/// `x-api-key`, `api-key`, `token`, case-insensitive) are kept ciphertext and
/// decrypted only immediately before the outbound HTTP call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HeaderValue {
    Plain(String),
    Encrypted { nonce_b64: String, ciphertext_b64: String },
}

/// A tenant-owned webhook descriptor (spec §3 Tool, §4.5 Tool Dispatcher).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub description: String,
    pub method: HttpMethod,
    /// URL template with `{placeholder}` fragments substituted from path_params.
    pub url_template: String,
    pub headers: HashMap<String, HeaderValue>,
    pub path_params_schema: HashMap<String, ParamSchema>,
    pub query_params_schema: HashMap<String, ParamSchema>,
    /// JSON-Schema-like body description: property name -> (required, description).
    pub body_schema: HashMap<String, ParamSchema>,
    /// variable name -> JSON-path into the HTTP response body.
    pub response_variables: HashMap<String, String>,
    pub provider_tool_id: String,
    pub timeout_seconds: u64,
}

impl Tool {
    pub fn default_timeout() -> u64 {
        30
    }
}

/// Names that must be stored encrypted at rest (§4.5 Security, §9).
pub fn is_sensitive_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    matches!(
        lower.as_str(),
        "authorization" | "x-api-key" | "api-key" | "token"
    )
}
