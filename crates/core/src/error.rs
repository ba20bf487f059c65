//! Error types

use thiserror::Error;

/// Core error type shared across the workspace
#[derive(Error, Debug)]
pub enum Error {
    #[error("audio error: {0}")]
    Audio(String),

    #[error("stt error: {0}")]
    Stt(String),

    #[error("tts error: {0}")]
    Tts(String),

    #[error("llm error: {0}")]
    Llm(String),

    #[error("retrieval error: {0}")]
    Rag(String),

    #[error("tool error: {0}")]
    Tool(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("session error: {0}")]
    Session(String),
}

/// Result alias using the core error
pub type Result<T> = std::result::Result<T, Error>;
