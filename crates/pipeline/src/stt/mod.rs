//! Streaming speech-to-text adapters

mod deepgram;

pub use deepgram::{DeepgramStt, DeepgramSttConfig};
