use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("admission refused: {0}")]
    AdmissionRefused(String),

    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("provider unreachable: {0}")]
    ProviderUnreachable(String),

    #[error("provider protocol error: {0}")]
    ProviderProtocol(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
