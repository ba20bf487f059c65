//! Configuration for the voice call runtime
//!
//! Settings are environment-driven with documented defaults; agent profiles
//! and per-call overrides layer on top (override > profile > environment).

pub mod agent;
pub mod settings;

pub use agent::{AgentProfile, CallOverrides};
pub use settings::{
    InterruptSettings, LlmSettings, RagSettings, ServerSettings, SessionSettings, Settings,
    SpeechSettings, TurnSettings,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
