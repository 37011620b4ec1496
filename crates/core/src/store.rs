//! Persistent store traits — the narrow L3 interface and segment storage.
//!
//! The memory core treats L3 as write-mostly during execution and
//! flush-from-L2 at session boundaries. Implementations own their own
//! persistence; vector search is an advertised capability, not a
//! requirement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entry::PersistentRecord;
use crate::error::MemoryError;

/// A search hit with its relevance score.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: PersistentRecord,
    pub score: f32,
}

/// The L3 persistent store interface.
///
/// Implementations: in-memory (testing), JSONL file, SQLite.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The store name (e.g., "in_memory", "file", "sqlite").
    fn name(&self) -> &str;

    /// Persist a record, returning its id.
    async fn save(&self, record: PersistentRecord) -> Result<String, MemoryError>;

    /// Fetch a record by id.
    async fn get(&self, id: &str) -> Result<Option<PersistentRecord>, MemoryError>;

    /// Search records; at minimum a case-insensitive substring match.
    async fn search(&self, query: &str, limit: usize)
    -> Result<Vec<PersistentRecord>, MemoryError>;

    /// Whether `search_semantic` is backed by real vector search.
    fn supports_semantic(&self) -> bool {
        false
    }

    /// Semantic similarity search. Default: empty (capability absent).
    async fn search_semantic(
        &self,
        _query: &str,
        _top_k: usize,
        _min_score: f32,
    ) -> Result<Vec<ScoredRecord>, MemoryError> {
        Ok(Vec::new())
    }

    /// Delete records created before the cutoff. Returns the count removed.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, MemoryError>;
}

/// A verbatim message segment persisted during compaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySegment {
    /// Unique segment ID
    pub id: String,

    /// Raw content, stored verbatim
    pub content: String,

    /// When this segment was captured
    pub timestamp: DateTime<Utc>,

    /// Owning session, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Metadata (role, index, provenance)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl MemorySegment {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            timestamp: Utc::now(),
            session_id: None,
            metadata: serde_json::Map::new(),
        }
    }
}

/// Segment storage used by the compactor to keep full-fidelity originals
/// behind the summaries it writes into L2.
#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// Store a segment, returning its id.
    async fn store(&self, segment: MemorySegment) -> Result<String, MemoryError>;

    /// Retrieve segments by id; unknown ids are skipped.
    async fn retrieve(&self, segment_ids: &[String]) -> Result<Vec<MemorySegment>, MemoryError>;

    /// Remove segments captured before the cutoff. Returns the count removed.
    async fn cleanup(&self, before: DateTime<Utc>) -> Result<usize, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullStore;

    #[async_trait]
    impl MemoryStore for NullStore {
        fn name(&self) -> &str {
            "null"
        }

        async fn save(&self, record: PersistentRecord) -> Result<String, MemoryError> {
            Ok(record.id)
        }

        async fn get(&self, _id: &str) -> Result<Option<PersistentRecord>, MemoryError> {
            Ok(None)
        }

        async fn search(
            &self,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<PersistentRecord>, MemoryError> {
            Ok(Vec::new())
        }

        async fn delete_older_than(&self, _cutoff: DateTime<Utc>) -> Result<usize, MemoryError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn semantic_search_defaults_to_empty() {
        let store = NullStore;
        assert!(!store.supports_semantic());
        let hits = store.search_semantic("query", 5, 0.0).await.unwrap();
        assert!(hits.is_empty());
    }
}
