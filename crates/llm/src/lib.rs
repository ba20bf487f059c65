//! LLM backend and prompt assembly

pub mod backend;
pub mod prompt;

pub use backend::{OllamaBackend, OllamaConfig};
pub use prompt::PromptBuilder;

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            LlmError::Network(err.to_string())
        } else {
            LlmError::Api(err.to_string())
        }
    }
}

impl From<LlmError> for voicegate_core::Error {
    fn from(err: LlmError) -> Self {
        voicegate_core::Error::Llm(err.to_string())
    }
}
