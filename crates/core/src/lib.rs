//! Core traits and types for the voice call runtime
//!
//! This crate provides foundational types used across all other crates:
//! - Telephony audio primitives (µ-law codec, RMS energy, resampling)
//! - Streaming transcript events
//! - Conversation turns and the persisted call record
//! - Error types
//! - Collaborator traits for pluggable backends (STT, TTS, LLM, retrieval,
//!   tools, persistence, webhooks, media transport)

pub mod audio;
pub mod conversation;
pub mod error;
pub mod transcript;
pub mod traits;

pub use audio::{
    mulaw_decode, mulaw_decode_sample, mulaw_encode, mulaw_encode_sample, pcm_from_le_bytes,
    pcm_to_le_bytes, rms_energy, LinearResampler, CARRIER_SAMPLE_RATE, FRAME_BYTES,
    FRAME_DURATION_MS, MULAW_SILENCE, WIDEBAND_SAMPLE_RATE,
};
pub use conversation::{render_transcript, ConversationRecord, ConversationStatus, Turn};
pub use error::{Error, Result};
pub use transcript::SttEvent;

pub use traits::{
    CallContext, ConversationStore, Embedder, GenerateRequest, LanguageModel, MediaTransport,
    ParamValue, ScoredChunk, SpeechToText, SttStream, TextToSpeech, ToolExecutor, ToolInvocation,
    ToolOutcome, TtsStream, VectorSearch, WebhookSink,
};
