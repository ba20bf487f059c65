//! Streaming transcript events

use serde::{Deserialize, Serialize};

/// One recognition event from the streaming STT channel
///
/// Partial events (`is_final == false`) are incremental hypotheses that may
/// be revised; final events are the provider's committed result. The runtime
/// only relies on `text` and `is_final` for control flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SttEvent {
    /// Recognised text
    pub text: String,
    /// Whether the provider has committed this result
    pub is_final: bool,
    /// Provider confidence (0.0 - 1.0)
    #[serde(default)]
    pub confidence: f32,
    /// Start of the recognised span, milliseconds into the stream
    #[serde(default)]
    pub start_ms: u64,
    /// End of the recognised span, milliseconds into the stream
    #[serde(default)]
    pub end_ms: u64,
}

impl SttEvent {
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            ..Default::default()
        }
    }

    pub fn final_result(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            ..Default::default()
        }
    }
}
