//! Tool markers, execution, and webhook dispatch

pub mod executor;
pub mod marker;
pub mod webhook;

pub use executor::{HttpToolExecutor, HttpToolExecutorConfig};
pub use marker::{scan_markers, validate_invocation, MarkerScan};
pub use webhook::WebhookDispatcher;

use thiserror::Error;

/// Built-in tool names the runtime recognises
pub const TOOL_END_CALL: &str = "end_call";
pub const TOOL_TRANSFER_CALL: &str = "transfer_call";
pub const TOOL_CALL_WEBHOOK: &str = "call_webhook";

/// Webhook event names
pub mod events {
    pub const CALL_STARTED: &str = "call.started";
    pub const CALL_ENDED: &str = "call.ended";
    pub const USER_INTERRUPTED: &str = "user.interrupted";
    pub const TOOL_CALLED: &str = "tool.called";
}

/// Tool errors
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("unknown or inactive tool: {0}")]
    Unknown(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("execution failed: {0}")]
    Execution(String),
}

impl From<ToolError> for voicegate_core::Error {
    fn from(err: ToolError) -> Self {
        voicegate_core::Error::Tool(err.to_string())
    }
}
