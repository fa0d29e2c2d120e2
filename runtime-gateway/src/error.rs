use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Runtime(#[from] runtime_core::RuntimeError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("policy violation: {0}")]
    PolicyViolation(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
