//! Retrieval traits for RAG

use crate::Result;
use async_trait::async_trait;

/// Text embedding interface
#[async_trait]
pub trait Embedder: Send + Sync + 'static {
    /// Embed a query into a dense vector
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// One retrieved chunk with its distance from the query
///
/// Lower distance means closer; chunks above the configured relevance
/// threshold are discarded by the retriever.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub text: String,
    pub distance: f32,
}

/// Dense vector search interface
#[async_trait]
pub trait VectorSearch: Send + Sync + 'static {
    /// Return the `top_k` nearest chunks to `embedding`
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>>;
}
