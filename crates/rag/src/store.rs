//! Chroma vector store client
//!
//! Speaks the Chroma REST API; the core only queries by embedding and reads
//! back `(document, distance)` pairs, so that is all this client implements.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::RagError;
use voicegate_core::{Result, ScoredChunk, VectorSearch};

/// Chroma connection configuration
#[derive(Debug, Clone)]
pub struct ChromaStoreConfig {
    pub endpoint: String,
    pub collection: String,
}

impl Default for ChromaStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000".to_string(),
            collection: "docs".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    documents: Vec<Vec<String>>,
    #[serde(default)]
    distances: Vec<Vec<f32>>,
}

/// Chroma vector store
pub struct ChromaStore {
    client: Client,
    config: ChromaStoreConfig,
}

impl ChromaStore {
    pub fn new(config: ChromaStoreConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn query_collection(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> std::result::Result<Vec<ScoredChunk>, RagError> {
        let url = format!(
            "{}/api/v1/collections/{}/query",
            self.config.endpoint, self.config.collection
        );

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "query_embeddings": [embedding],
                "n_results": top_k,
                "include": ["documents", "distances"],
            }))
            .send()
            .await
            .map_err(|e| RagError::Connection(format!("query failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(RagError::VectorStore(format!("query returned {status}")));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| RagError::VectorStore(format!("bad response: {e}")))?;

        let documents = parsed.documents.into_iter().next().unwrap_or_default();
        let distances = parsed.distances.into_iter().next().unwrap_or_default();

        Ok(documents
            .into_iter()
            .zip(distances)
            .map(|(text, distance)| ScoredChunk { text, distance })
            .collect())
    }
}

#[async_trait]
impl VectorSearch for ChromaStore {
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        Ok(self.query_collection(embedding, top_k).await?)
    }
}
