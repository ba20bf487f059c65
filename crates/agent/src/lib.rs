//! Per-call session controller
//!
//! Owns the state machine, the worker tasks, and the wiring between the
//! media pipeline and the external collaborators. One `CallSession` exists
//! per live call; the server feeds it carrier events and pumps its outbound
//! frames.

pub mod generation;
pub mod intent;
pub mod session;

pub use intent::{classify_intent, detect_confirmation, Confirmation, Intent};
pub use session::{
    CallPhase, CallSession, SessionConfig, SessionDeps, SessionEvent, SessionInput, SessionParams,
};

use thiserror::Error;

/// Agent/session errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("session error: {0}")]
    Session(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),
}

impl From<AgentError> for voicegate_core::Error {
    fn from(err: AgentError) -> Self {
        voicegate_core::Error::Session(err.to_string())
    }
}
