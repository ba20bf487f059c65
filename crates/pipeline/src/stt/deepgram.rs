//! Deepgram live transcription adapter
//!
//! Opens a WebSocket to the live endpoint, feeds 16 kHz linear PCM upstream
//! (resampled here from the carrier's 8 kHz µ-law), and maps transcript
//! messages to [`SttEvent`]s. The events channel closing signals an upstream
//! error or end; the session decides whether to reopen.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::client::IntoClientRequest, tungstenite::Message};
use url::Url;

use voicegate_core::{
    audio, Error, Result, SpeechToText, SttEvent, SttStream, CARRIER_SAMPLE_RATE,
    WIDEBAND_SAMPLE_RATE,
};

/// Deepgram live STT configuration
#[derive(Debug, Clone)]
pub struct DeepgramSttConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    /// Provider-side endpointing window in milliseconds
    pub endpointing_ms: u64,
    /// Channel capacity for inbound audio frames
    pub audio_buffer: usize,
}

impl Default for DeepgramSttConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "nova-2".to_string(),
            endpoint: "wss://api.deepgram.com/v1/listen".to_string(),
            endpointing_ms: 800,
            audio_buffer: 128,
        }
    }
}

/// Streaming STT over the Deepgram live API
pub struct DeepgramStt {
    config: DeepgramSttConfig,
}

impl DeepgramStt {
    pub fn new(config: DeepgramSttConfig) -> Self {
        Self { config }
    }

    fn build_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.config.endpoint)
            .map_err(|e| Error::Stt(format!("bad endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("model", &self.config.model)
            .append_pair("language", "en-US")
            .append_pair("encoding", "linear16")
            .append_pair("sample_rate", &WIDEBAND_SAMPLE_RATE.to_string())
            .append_pair("channels", "1")
            .append_pair("smart_format", "true")
            .append_pair("interim_results", "true")
            .append_pair("endpointing", &self.config.endpointing_ms.to_string());
        Ok(url)
    }
}

#[async_trait]
impl SpeechToText for DeepgramStt {
    async fn open_stream(&self) -> Result<SttStream> {
        let url = self.build_url()?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Stt(format!("bad request: {e}")))?;
        request.headers_mut().insert(
            "Authorization",
            format!("Token {}", self.config.api_key)
                .parse()
                .map_err(|_| Error::Stt("invalid api key header".to_string()))?,
        );

        let (ws, _) = connect_async(request)
            .await
            .map_err(|e| Error::Stt(format!("connect failed: {e}")))?;
        let (mut write, mut read) = ws.split();

        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(self.config.audio_buffer);
        let (event_tx, event_rx) = mpsc::channel::<SttEvent>(64);

        // Upstream writer: µ-law 8 kHz in, linear16 16 kHz out
        tokio::spawn(async move {
            let mut resampler = audio::LinearResampler::new(CARRIER_SAMPLE_RATE, WIDEBAND_SAMPLE_RATE);
            while let Some(frame) = audio_rx.recv().await {
                let pcm = audio::mulaw_decode(&frame);
                let wide = resampler.process(&pcm);
                let bytes = audio::pcm_to_le_bytes(&wide);
                if write.send(Message::Binary(bytes)).await.is_err() {
                    tracing::debug!("stt upstream write closed");
                    break;
                }
            }
            let _ = write.send(Message::Close(None)).await;
        });

        // Downstream reader: transcript JSON in, SttEvent out
        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if let Some(event) = parse_transcript_message(&text) {
                            if !event.text.is_empty() && event_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        tracing::info!("stt upstream closed");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("stt upstream error: {e}");
                        break;
                    }
                }
            }
            // event_tx drops here; the closed channel is the error signal
        });

        Ok(SttStream {
            audio_tx,
            events: event_rx,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptMessage {
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    start: f64,
    #[serde(default)]
    duration: f64,
    channel: Option<TranscriptChannel>,
}

#[derive(Debug, Deserialize)]
struct TranscriptChannel {
    alternatives: Vec<TranscriptAlternative>,
}

#[derive(Debug, Deserialize)]
struct TranscriptAlternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    confidence: f32,
}

fn parse_transcript_message(raw: &str) -> Option<SttEvent> {
    let message: TranscriptMessage = serde_json::from_str(raw).ok()?;
    let alternative = message.channel?.alternatives.into_iter().next()?;
    let start_ms = (message.start * 1000.0) as u64;
    Some(SttEvent {
        text: alternative.transcript,
        is_final: message.is_final,
        confidence: alternative.confidence,
        start_ms,
        end_ms: start_ms + (message.duration * 1000.0) as u64,
    })
}
