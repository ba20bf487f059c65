//! Language model trait

use crate::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A single generation request
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Fully assembled prompt text
    pub prompt: String,
    /// Model override; implementations fall back to their configured model
    pub model: Option<String>,
    /// Hard cap on generated tokens
    pub max_tokens: usize,
    /// Sampling temperature
    pub temperature: f32,
    /// Stop sequences
    pub stop: Vec<String>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
            max_tokens: 1200,
            temperature: 0.2,
            stop: Vec::new(),
        }
    }
}

/// Streaming language model interface
///
/// Implementations:
/// - `OllamaBackend` - local Ollama inference
/// - test fakes streaming scripted tokens
#[async_trait]
pub trait LanguageModel: Send + Sync + 'static {
    /// Stream tokens into `tx` as they are generated
    ///
    /// Returning `Ok` with the receiver closed mid-stream means the caller
    /// cancelled; implementations must stop generating promptly in that
    /// case rather than error.
    async fn generate_stream(
        &self,
        request: GenerateRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<()>;

    /// Check whether the backend is reachable
    async fn is_available(&self) -> bool;

    /// Model name for logging
    fn model_name(&self) -> &str;
}
