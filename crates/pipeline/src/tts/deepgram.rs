//! Deepgram streaming synthesis adapter
//!
//! POSTs the sentence and forwards the chunked linear16 body as it arrives.
//! Chunk boundaries are arbitrary; the drainer reassembles samples.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use voicegate_core::{Error, Result, TextToSpeech, TtsStream, WIDEBAND_SAMPLE_RATE};

/// Deepgram TTS configuration
#[derive(Debug, Clone)]
pub struct DeepgramTtsConfig {
    pub api_key: String,
    pub endpoint: String,
}

impl Default for DeepgramTtsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: "https://api.deepgram.com/v1/speak".to_string(),
        }
    }
}

/// Streaming TTS over the Deepgram speak API
pub struct DeepgramTts {
    client: reqwest::Client,
    config: DeepgramTtsConfig,
}

impl DeepgramTts {
    pub fn new(config: DeepgramTtsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Tts(format!("http client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl TextToSpeech for DeepgramTts {
    async fn synthesize_stream(&self, text: &str, voice_id: &str) -> Result<TtsStream> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .query(&[
                ("model", voice_id),
                ("encoding", "linear16"),
                ("sample_rate", &WIDEBAND_SAMPLE_RATE.to_string()),
            ])
            .header("Authorization", format!("Token {}", self.config.api_key))
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| Error::Tts(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("synthesis failed: {status} {body}")));
        }

        let (tx, rx) = mpsc::channel::<Vec<u8>>(32);
        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => {
                        if bytes.is_empty() {
                            continue;
                        }
                        if tx.send(bytes.to_vec()).await.is_err() {
                            // Receiver dropped: sentence was cancelled
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("tts body stream error: {e}");
                        break;
                    }
                }
            }
        });

        Ok(TtsStream { audio: rx })
    }

    fn model_name(&self) -> &str {
        "deepgram-speak"
    }
}
