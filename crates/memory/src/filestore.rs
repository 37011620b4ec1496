//! File-based L3 store — persistent JSON-lines storage.
//!
//! Each line is a JSON-encoded `PersistentRecord`. Records are loaded into
//! memory on creation and flushed to disk on every mutation, giving fast
//! reads with durable writes. Corrupted lines are skipped with a warning
//! rather than failing the whole load.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mnemo_core::entry::PersistentRecord;
use mnemo_core::error::MemoryError;
use mnemo_core::store::MemoryStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// A file-backed store using JSONL (one JSON object per line).
pub struct FileStore {
    path: PathBuf,
    records: Arc<RwLock<Vec<PersistentRecord>>>,
}

impl FileStore {
    /// Create a new file-based store at the given path.
    ///
    /// If the file exists, records are loaded from it; otherwise the store
    /// starts empty and the file is created on first write.
    pub fn new(path: PathBuf) -> Self {
        let records = Self::load_from_disk(&path);
        debug!(path = %path.display(), count = records.len(), "file store loaded");
        Self {
            path,
            records: Arc::new(RwLock::new(records)),
        }
    }

    fn load_from_disk(path: &PathBuf) -> Vec<PersistentRecord> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Vec::new(), // File doesn't exist yet — start empty
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<PersistentRecord>(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "skipping corrupted persistent record");
                    None
                }
            })
            .collect()
    }

    async fn flush(&self) -> Result<(), MemoryError> {
        let records = self.records.read().await;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MemoryError::Storage(format!("create store directory: {e}")))?;
        }

        let mut content = String::new();
        for record in records.iter() {
            let line = serde_json::to_string(record)
                .map_err(|e| MemoryError::Storage(format!("serialize record: {e}")))?;
            content.push_str(&line);
            content.push('\n');
        }

        std::fs::write(&self.path, &content)
            .map_err(|e| MemoryError::Storage(format!("write store file: {e}")))
    }
}

#[async_trait]
impl MemoryStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn save(&self, mut record: PersistentRecord) -> Result<String, MemoryError> {
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        let id = record.id.clone();
        {
            let mut records = self.records.write().await;
            records.retain(|r| r.id != id);
            records.push(record);
        }
        self.flush().await?;
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
        Ok(records
            .iter()
            .filter(|r| r.content.as_text().to_lowercase().contains(&query_lower))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, MemoryError> {
        let removed = {
            let mut records = self.records.write().await;
            let before = records.len();
            records.retain(|r| r.created_at >= cutoff);
            before - records.len()
        };
        if removed > 0 {
            self.flush().await?;
        }
        Ok(removed)
    }
}
