//! Carrier-facing server
//!
//! Terminates the carrier's media WebSocket, wires each call to a
//! `CallSession`, and exposes a small HTTP surface for health and
//! conversation lookups.

pub mod http;
pub mod protocol;
pub mod state;
pub mod transport;
pub mod websocket;

pub use http::create_router;
pub use state::{AgentRegistry, AppState, SessionRegistry};
pub use transport::WsMediaTransport;

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Config(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Session(_) => axum::http::StatusCode::NOT_FOUND,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
