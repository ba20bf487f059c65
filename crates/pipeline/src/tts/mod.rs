//! Streaming text-to-speech adapters and the outbound drainer

mod deepgram;
mod streamer;

pub use deepgram::{DeepgramTts, DeepgramTtsConfig};
pub use streamer::{SpeechItem, TtsNotice, TtsStreamer};
