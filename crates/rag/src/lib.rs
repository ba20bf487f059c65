//! Retrieval-augmented generation support
//!
//! Dense retrieval for the per-call pipeline: query embedding via the Ollama
//! embeddings API, nearest-chunk search against a Chroma collection, and the
//! context-block assembly the prompt builder consumes.

pub mod embeddings;
pub mod retriever;
pub mod store;

pub use embeddings::{OllamaEmbedder, OllamaEmbeddingConfig};
pub use retriever::{ContextRetriever, RetrievedContext, RetrieverConfig};
pub use store::{ChromaStore, ChromaStoreConfig};

use thiserror::Error;

/// RAG errors
#[derive(Error, Debug)]
pub enum RagError {
    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("vector store error: {0}")]
    VectorStore(String),

    #[error("connection error: {0}")]
    Connection(String),
}

impl From<RagError> for voicegate_core::Error {
    fn from(err: RagError) -> Self {
        voicegate_core::Error::Rag(err.to_string())
    }
}
