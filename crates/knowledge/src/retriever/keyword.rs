//! Keyword retriever — substring match over chunk content and keywords.

use std::sync::Arc;

use mnemo_core::error::RetrievalError;

use crate::model::TextChunk;
use crate::store::ChunkStore;

/// Plain keyword matching; results keep insertion order, no scoring.
pub struct KeywordRetriever {
    chunk_store: Arc<dyn ChunkStore>,
}

impl KeywordRetriever {
    pub fn new(chunk_store: Arc<dyn ChunkStore>) -> Self {
        Self { chunk_store }
    }

    pub async fn retrieve(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<TextChunk>, RetrievalError> {
        self.chunk_store
            .search_by_keyword(query, limit)
            .await
            .map_err(|e| RetrievalError::Backend {
                backend: "keyword".into(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryChunkStore;

    #[tokio::test]
    async fn matches_content_substring() {
        let store = Arc::new(InMemoryChunkStore::new());
        store
            .add(TextChunk::new("c1", "the borrow checker enforces ownership", "d"))
            .await
            .unwrap();
        store
            .add(TextChunk::new("c2", "garbage collection elsewhere", "d"))
            .await
            .unwrap();

        let retriever = KeywordRetriever::new(store);
        let hits = retriever.retrieve("borrow", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "c1");
    }

    #[tokio::test]
    async fn respects_limit() {
        let store = Arc::new(InMemoryChunkStore::new());
        for i in 0..5 {
            store
                .add(TextChunk::new(format!("c{i}"), "shared term", "d"))
                .await
                .unwrap();
        }
        let retriever = KeywordRetriever::new(store);
        let hits = retriever.retrieve("shared", 3).await.unwrap();
        assert_eq!(hits.len(), 3);
    }
}
