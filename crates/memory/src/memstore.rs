//! In-memory L3 store — useful for testing and ephemeral sessions.
//!
//! Keyword search scores by occurrence density. When an embedding provider
//! is attached, records are embedded on save and `search_semantic` ranks
//! by cosine similarity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mnemo_core::entry::PersistentRecord;
use mnemo_core::error::MemoryError;
use mnemo_core::provider::EmbeddingProvider;
use mnemo_core::similarity::cosine_similarity;
use mnemo_core::store::{MemoryStore, ScoredRecord};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// An in-memory store that keeps records in a Vec.
pub struct InMemoryStore {
    records: Arc<RwLock<Vec<PersistentRecord>>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
            embedder: None,
        }
    }

    /// Attach an embedding provider, enabling semantic search.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn save(&self, mut record: PersistentRecord) -> Result<String, MemoryError> {
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        if record.embedding.is_none() {
            if let Some(embedder) = &self.embedder {
                match embedder.embed(&record.content.as_text()).await {
                    Ok(vector) => record.embedding = Some(vector),
                    Err(e) => {
                        tracing::debug!(error = %e, "embedding failed, saving without vector");
                    }
                }
            }
        }
        let id = record.id.clone();
        let mut records = self.records.write().await;
        records.retain(|r| r.id != id);
        records.push(record);
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<PersistentRecord>, MemoryError> {
        Ok(self.records.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<PersistentRecord>, MemoryError> {
        let records = self.records.read().await;
        let query_lower = query.to_lowercase();

        let mut scored: Vec<(f32, PersistentRecord)> = records
            .iter()
            .filter_map(|r| {
                let text = r.content.as_text().to_lowercase();
                if !text.contains(&query_lower) {
                    return None;
                }
                // Occurrence density as a cheap relevance score
                let occurrences = text.matches(&query_lower).count();
                let score = occurrences as f32 / (text.len() as f32 / 100.0).max(1.0);
                Some((score, r.clone()))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(_, r)| r).collect())
    }

    fn supports_semantic(&self) -> bool {
        self.embedder.is_some()
    }

    async fn search_semantic(
        &self,
        query: &str,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredRecord>, MemoryError> {
        let Some(embedder) = &self.embedder else {
            return Ok(Vec::new());
        };
        let query_embedding = embedder
            .embed(query)
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(e.to_string()))?;

        let records = self.records.read().await;
        let mut scored: Vec<ScoredRecord> = records
            .iter()
            .filter_map(|r| {
                let embedding = r.embedding.as_ref()?;
                let score = cosine_similarity(embedding, &query_embedding);
                (score >= min_score).then(|| ScoredRecord {
                    record: r.clone(),
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, MemoryError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.created_at >= cutoff);
        Ok(before - records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct HashEmbedder;

    #[async_trait]
    impl EmbeddingProvider for HashEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
            // Toy deterministic embedding: char-class histogram
            let mut v = vec![0.0f32; 4];
            for c in text.chars() {
                v[(c as usize) % 4] += 1.0;
            }
            Ok(v)
        }
    }

    fn record(content: &str) -> PersistentRecord {
        PersistentRecord::new(content, 0.5)
    }

    #[tokio::test]
    async fn save_and_get() {
        let store = InMemoryStore::new();
        let id = store.save(record("Rust is a systems language")).await.unwrap();
        let fetched = store.get(&id).await.unwrap().unwrap();
        assert_eq!(fetched.content.as_text(), "Rust is a systems language");
    }

    #[tokio::test]
    async fn search_is_substring_match() {
        let store = InMemoryStore::new();
        store.save(record("Rust is great for systems")).await.unwrap();
        store.save(record("Python is great for scripting")).await.unwrap();

        let hits = store.search("rust", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.as_text().contains("Rust"));
    }

    #[tokio::test]
    async fn semantic_search_requires_embedder() {
        let store = InMemoryStore::new();
        assert!(!store.supports_semantic());
        assert!(store.search_semantic("q", 5, 0.0).await.unwrap().is_empty());

        let store = InMemoryStore::new().with_embedder(Arc::new(HashEmbedder));
        assert!(store.supports_semantic());
        store.save(record("alpha beta")).await.unwrap();
        let hits = store.search_semantic("alpha beta", 5, 0.0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score > 0.9);
    }

    #[tokio::test]
    async fn delete_older_than_cutoff() {
        let store = InMemoryStore::new();
        let mut old = record("old");
        old.created_at = Utc::now() - chrono::Duration::days(10);
        store.save(old).await.unwrap();
        store.save(record("new")).await.unwrap();

        let removed = store
            .delete_older_than(Utc::now() - chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn save_assigns_id_when_missing() {
        let store = InMemoryStore::new();
        let mut r = record("no id");
        r.id = String::new();
        let id = store.save(r).await.unwrap();
        assert!(!id.is_empty());
    }
}
