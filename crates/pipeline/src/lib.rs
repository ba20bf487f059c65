//! Per-call media pipeline
//!
//! The real-time half of the runtime: inbound frame handling and energy
//! tracking, barge-in detection, turn assembly from streaming recognition
//! events, sentence segmentation of streaming LLM output, and the outbound
//! synthesis drainer. Provider adapters for the streaming STT and TTS
//! services live under `stt/` and `tts/`.

pub mod interrupt;
pub mod ring;
pub mod sentence;
pub mod stt;
pub mod tts;
pub mod turn;

pub use interrupt::{InterruptConfig, InterruptDetector};
pub use ring::AudioRing;
pub use sentence::{clean_markdown_for_tts, SentenceSplitter};
pub use stt::DeepgramStt;
pub use tts::{DeepgramTts, SpeechItem, TtsNotice, TtsStreamer};
pub use turn::{GateConfig, TurnAssembler};

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("stt upstream error: {0}")]
    Stt(String),

    #[error("tts upstream error: {0}")]
    Tts(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("codec error: {0}")]
    Codec(String),
}

impl From<PipelineError> for voicegate_core::Error {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Stt(m) => voicegate_core::Error::Stt(m),
            PipelineError::Tts(m) => voicegate_core::Error::Tts(m),
            PipelineError::Transport(m) => voicegate_core::Error::Transport(m),
            PipelineError::Codec(m) => voicegate_core::Error::Audio(m),
        }
    }
}
