//! Speech processing traits

use crate::{Result, SttEvent};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A live recognition channel
///
/// Feed 20 ms µ-law frames into `audio_tx`; partial and final results arrive
/// on `events`. The channel closing (events returning `None`) means the
/// upstream ended or failed — the caller decides whether to reopen.
pub struct SttStream {
    /// Inbound µ-law frames at the carrier rate
    pub audio_tx: mpsc::Sender<Vec<u8>>,
    /// Recognition events, partials then finals
    pub events: mpsc::Receiver<SttEvent>,
}

/// Streaming speech-to-text interface
///
/// Implementations:
/// - `DeepgramStt` - live transcription over WebSocket
/// - test fakes driving scripted event sequences
#[async_trait]
pub trait SpeechToText: Send + Sync + 'static {
    /// Open a live recognition channel
    async fn open_stream(&self) -> Result<SttStream>;

    /// Model name for logging
    fn model_name(&self) -> &str;
}

/// One streaming synthesis channel
///
/// `audio` yields raw chunks of 16-bit little-endian linear PCM at 16 kHz
/// mono. Chunk boundaries are arbitrary; a chunk may split a sample across
/// the boundary.
pub struct TtsStream {
    pub audio: mpsc::Receiver<Vec<u8>>,
}

/// Streaming text-to-speech interface
///
/// Implementations:
/// - `DeepgramTts` - HTTP streaming synthesis
/// - test fakes yielding canned PCM
#[async_trait]
pub trait TextToSpeech: Send + Sync + 'static {
    /// Open a synthesis channel for one sentence
    async fn synthesize_stream(&self, text: &str, voice_id: &str) -> Result<TtsStream>;

    /// Model name for logging
    fn model_name(&self) -> &str;
}
