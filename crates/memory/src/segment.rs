//! In-memory segment store — FIFO-capped storage for compaction segments.
//!
//! The compactor persists full-fidelity originals here before replacing
//! them with summaries. Production deployments can substitute a durable
//! `SegmentStore` implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mnemo_core::error::MemoryError;
use mnemo_core::store::{MemorySegment, SegmentStore};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory segment store with a FIFO capacity cap.
pub struct InMemorySegmentStore {
    segments: Arc<RwLock<Vec<MemorySegment>>>,
    max_segments: usize,
}

impl InMemorySegmentStore {
    pub fn new(max_segments: usize) -> Self {
        Self {
            segments: Arc::new(RwLock::new(Vec::new())),
            max_segments,
        }
    }

    pub async fn len(&self) -> usize {
        self.segments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.segments.read().await.is_empty()
    }
}

impl Default for InMemorySegmentStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl SegmentStore for InMemorySegmentStore {
    async fn store(&self, segment: MemorySegment) -> Result<String, MemoryError> {
        let id = segment.id.clone();
        let mut segments = self.segments.write().await;
        segments.push(segment);
        // FIFO: drop the oldest when over capacity
        while segments.len() > self.max_segments {
            segments.remove(0);
        }
        Ok(id)
    }

    async fn retrieve(&self, segment_ids: &[String]) -> Result<Vec<MemorySegment>, MemoryError> {
        let segments = self.segments.read().await;
        Ok(segment_ids
            .iter()
            .filter_map(|id| segments.iter().find(|s| &s.id == id).cloned())
            .collect())
    }

    async fn cleanup(&self, before: DateTime<Utc>) -> Result<usize, MemoryError> {
        let mut segments = self.segments.write().await;
        let count = segments.len();
        segments.retain(|s| s.timestamp >= before);
        Ok(count - segments.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_and_retrieve() {
        let store = InMemorySegmentStore::default();
        let id = store.store(MemorySegment::new("verbatim text")).await.unwrap();

        let segments = store.retrieve(&[id, "missing".into()]).await.unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].content, "verbatim text");
    }

    #[tokio::test]
    async fn fifo_cap_drops_oldest() {
        let store = InMemorySegmentStore::new(2);
        let first = store.store(MemorySegment::new("one")).await.unwrap();
        store.store(MemorySegment::new("two")).await.unwrap();
        store.store(MemorySegment::new("three")).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert!(store.retrieve(&[first]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cleanup_removes_old_segments() {
        let store = InMemorySegmentStore::default();
        let mut old = MemorySegment::new("old");
        old.timestamp = Utc::now() - chrono::Duration::hours(2);
        store.store(old).await.unwrap();
        store.store(MemorySegment::new("fresh")).await.unwrap();

        let removed = store
            .cleanup(Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len().await, 1);
    }
}
