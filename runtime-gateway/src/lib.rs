pub mod bridge;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod provider_ws;
pub mod reconciler;
pub mod session_vars;
pub mod tool_dispatch;
pub mod transport;

pub use error::{GatewayError, Result};
pub use gateway::{router, AppState};
pub use reconciler::Reconciler;
pub use tool_dispatch::ToolDispatcher;
