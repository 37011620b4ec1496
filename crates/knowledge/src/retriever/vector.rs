//! Vector retriever — semantic similarity over chunk embeddings.

use std::sync::Arc;
use std::time::Duration;

use mnemo_core::error::RetrievalError;
use mnemo_core::provider::EmbeddingProvider;

use crate::model::TextChunk;
use crate::store::ChunkStore;

const EMBED_TIMEOUT: Duration = Duration::from_secs(5);

/// Embeds the query and asks the chunk store for nearest neighbors.
pub struct VectorRetriever {
    chunk_store: Arc<dyn ChunkStore>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
}

impl VectorRetriever {
    pub fn new(
        chunk_store: Arc<dyn ChunkStore>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            chunk_store,
            embedding_provider,
        }
    }

    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Embed the query text, bounded by the embedding timeout.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RetrievalError> {
        match tokio::time::timeout(EMBED_TIMEOUT, self.embedding_provider.embed(query)).await {
            Ok(Ok(embedding)) => Ok(embedding),
            Ok(Err(e)) => Err(RetrievalError::Backend {
                backend: "embedding".into(),
                reason: e.to_string(),
            }),
            Err(_) => Err(RetrievalError::Timeout {
                backend: "embedding".into(),
                timeout_secs: EMBED_TIMEOUT.as_secs(),
            }),
        }
    }

    /// Retrieve the top chunks by cosine similarity.
    ///
    /// Returns `(chunk, score)` pairs sorted by similarity descending;
    /// chunks below `threshold` are filtered out.
    pub async fn retrieve(
        &self,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<(TextChunk, f32)>, RetrievalError> {
        let query_embedding = self.embed_query(query).await?;
        self.chunk_store
            .search_by_vector(&query_embedding, limit, threshold)
            .await
            .map_err(|e| RetrievalError::Backend {
                backend: "vector".into(),
                reason: e.to_string(),
            })
    }
}
