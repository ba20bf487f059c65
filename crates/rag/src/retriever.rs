//! Context retrieval for generation
//!
//! Embeds the utterance, queries the vector store, keeps chunks under the
//! relevance threshold, and joins the best few into the prompt context
//! block. Store failures degrade to an empty context rather than failing
//! the turn.

use std::sync::Arc;

use voicegate_core::{Embedder, ScoredChunk, VectorSearch};

/// Retrieval tuning
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Candidates fetched from the store
    pub top_k: usize,
    /// Maximum accepted distance; chunks farther than this are discarded
    pub relevance_threshold: f32,
    /// Chunks joined into the context block
    pub context_top: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 6,
            relevance_threshold: 1.0,
            context_top: 3,
        }
    }
}

/// Retrieval result handed to prompt assembly
#[derive(Debug, Clone, Default)]
pub struct RetrievedContext {
    /// Chunks that passed the threshold, nearest first
    pub chunks: Vec<ScoredChunk>,
    /// Joined context block; empty when nothing passed
    pub context_block: String,
}

impl RetrievedContext {
    pub fn is_empty(&self) -> bool {
        self.context_block.is_empty()
    }
}

const CHUNK_SEPARATOR: &str = "\n\n---\n\n";

/// Embed-then-search retriever
pub struct ContextRetriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorSearch>,
    config: RetrieverConfig,
}

impl ContextRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorSearch>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    /// Retrieve context for one utterance
    pub async fn retrieve(&self, utterance: &str) -> RetrievedContext {
        let embedding = match self.embedder.embed(utterance).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("embedding failed, continuing without context: {e}");
                return RetrievedContext::default();
            }
        };

        let candidates = match self.store.query(&embedding, self.config.top_k).await {
            Ok(c) => c,
            Err(e) => {
                // Treat as zero retrieved chunks
                tracing::warn!("vector store query failed, continuing without context: {e}");
                return RetrievedContext::default();
            }
        };

        let mut chunks: Vec<ScoredChunk> = candidates
            .into_iter()
            .filter(|c| c.distance <= self.config.relevance_threshold)
            .collect();
        chunks.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        let context_block = chunks
            .iter()
            .take(self.config.context_top)
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(CHUNK_SEPARATOR);

        tracing::debug!(
            kept = chunks.len(),
            context_chars = context_block.len(),
            "retrieval complete"
        );

        RetrievedContext {
            chunks,
            context_block,
        }
    }
}
