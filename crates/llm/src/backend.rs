//! Ollama backend
//!
//! Streams tokens from the generate endpoint as NDJSON. Generation stops
//! cleanly when the caller drops the token receiver, which is how a barge-in
//! reaches into a mid-stream completion.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::LlmError;
use voicegate_core::{GenerateRequest, LanguageModel, Result};

/// Ollama backend configuration
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub endpoint: String,
    /// Default model when the request carries no override
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "qwen2.5:14b".to_string(),
            max_tokens: 1200,
            temperature: 0.2,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: i32,
    top_k: u32,
    top_p: f32,
    repeat_penalty: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaStreamChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

/// Ollama language model backend
pub struct OllamaBackend {
    client: Client,
    config: OllamaConfig,
}

impl OllamaBackend {
    pub fn new(config: OllamaConfig) -> std::result::Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("http client: {e}")))?;
        Ok(Self { client, config })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.endpoint, path)
    }
}

#[async_trait]
impl LanguageModel for OllamaBackend {
    async fn generate_stream(
        &self,
        request: GenerateRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<()> {
        let model = request
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.config.model.clone());

        let body = OllamaGenerateRequest {
            model: model.clone(),
            prompt: request.prompt,
            stream: true,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens.min(self.config.max_tokens) as i32,
                top_k: 40,
                top_p: 0.9,
                repeat_penalty: 1.2,
                stop: request.stop,
            },
        };

        tracing::debug!(%model, "starting llm generation");

        let response = self
            .client
            .post(self.api_url("/generate"))
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::from(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{status}: {text}")).into());
        }

        let mut stream = response.bytes_stream();
        let mut tokens: usize = 0;
        let mut partial_line = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| LlmError::from(e))?;
            partial_line.push_str(&String::from_utf8_lossy(&chunk));

            // NDJSON: consume complete lines, keep the tail
            while let Some(pos) = partial_line.find('\n') {
                let line: String = partial_line.drain(..=pos).collect();
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let parsed: OllamaStreamChunk = match serde_json::from_str(line) {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::debug!("skipping unparseable stream line: {e}");
                        continue;
                    }
                };

                if !parsed.response.is_empty() {
                    tokens += 1;
                    if tx.send(parsed.response).await.is_err() {
                        // Receiver dropped: generation cancelled
                        tracing::debug!(tokens, "llm stream cancelled by receiver");
                        return Ok(());
                    }
                }
                if parsed.done {
                    tracing::debug!(tokens, "llm generation complete");
                    return Ok(());
                }
            }
        }

        tracing::debug!(tokens, "llm stream ended without done marker");
        Ok(())
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(self.api_url("/tags"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = OllamaConfig::default();
        assert_eq!(config.max_tokens, 1200);
        assert_eq!(config.temperature, 0.2);
    }

    #[test]
    fn test_stream_chunk_parsing() {
        let chunk: OllamaStreamChunk =
            serde_json::from_str(r#"{"response":"Hello","done":false}"#).unwrap();
        assert_eq!(chunk.response, "Hello");
        assert!(!chunk.done);

        let done: OllamaStreamChunk = serde_json::from_str(r#"{"done":true}"#).unwrap();
        assert!(done.done);
        assert!(done.response.is_empty());
    }

    #[test]
    fn test_request_serialization_skips_empty_stop() {
        let body = OllamaGenerateRequest {
            model: "m".to_string(),
            prompt: "p".to_string(),
            stream: true,
            options: OllamaOptions {
                temperature: 0.2,
                num_predict: 100,
                top_k: 40,
                top_p: 0.9,
                repeat_penalty: 1.2,
                stop: Vec::new(),
            },
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("stop"));
    }
}
