//! SQLite L3 store.
//!
//! Uses a single database file with one table: searchable columns for
//! content and creation time plus a JSON `data` column carrying the full
//! record. Good enough for per-agent persistent memory without running a
//! database server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mnemo_core::entry::PersistentRecord;
use mnemo_core::error::MemoryError;
use mnemo_core::store::MemoryStore;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{info, warn};
use uuid::Uuid;

/// A SQLite-backed persistent store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database
    /// (useful for tests).
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // An in-memory database exists per connection; the pool must not
        // fan out across several of them.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("open SQLite: {e}")))?;

        let store = Self { pool };
        store.bootstrap().await?;
        info!("SQLite persistent store initialized at {path}");
        Ok(store)
    }

    async fn bootstrap(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id           TEXT PRIMARY KEY,
                content_text TEXT NOT NULL,
                session_id   TEXT,
                importance   REAL NOT NULL DEFAULT 0.5,
                created_at   TEXT NOT NULL,
                data         TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("records table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_records_created_at ON records(created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("created_at index: {e}")))?;

        Ok(())
    }

    fn decode(row: &sqlx::sqlite::SqliteRow) -> Option<PersistentRecord> {
        let data: String = row.get("data");
        match serde_json::from_str(&data) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "skipping undecodable persistent record");
                None
            }
        }
    }
}

#[async_trait]
impl MemoryStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn save(&self, mut record: PersistentRecord) -> Result<String, MemoryError> {
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        let data = serde_json::to_string(&record)
            .map_err(|e| MemoryError::Storage(format!("serialize record: {e}")))?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO records (id, content_text, session_id, importance, created_at, data)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(record.content.as_text())
        .bind(&record.session_id)
        .bind(record.importance)
        .bind(record.created_at.to_rfc3339())
        .bind(&data)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("insert record: {e}")))?;

        Ok(record.id)
    }

    async fn get(&self, id: &str) -> Result<Option<PersistentRecord>, MemoryError> {
        let row = sqlx::query("SELECT data FROM records WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("get record: {e}")))?;
        Ok(row.as_ref().and_then(Self::decode))
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<PersistentRecord>, MemoryError> {
        let pattern = format!("%{}%", query.to_lowercase());
        let rows = sqlx::query(
            r#"
            SELECT data FROM records
            WHERE lower(content_text) LIKE ?
            ORDER BY importance DESC, created_at DESC
            LIMIT ?
            "#,
        )
        .bind(&pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("search records: {e}")))?;

        Ok(rows.iter().filter_map(Self::decode).collect())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, MemoryError> {
        // RFC 3339 UTC timestamps compare lexicographically.
        let result = sqlx::query("DELETE FROM records WHERE created_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("delete records: {e}")))?;
        Ok(result.rows_affected() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn record(content: &str, importance: f64) -> PersistentRecord {
        PersistentRecord::new(content, importance)
    }

    #[tokio::test]
    async fn save_and_get_roundtrip() {
        let store = store().await;
        let id = store.save(record("a durable fact", 0.7)).await.unwrap();
        let fetched = store.get(&id).await.unwrap().unwrap();
        assert_eq!(fetched.content.as_text(), "a durable fact");
        assert!((fetched.importance - 0.7).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn search_orders_by_importance() {
        let store = store().await;
        store.save(record("rust fact minor", 0.2)).await.unwrap();
        store.save(record("rust fact major", 0.9)).await.unwrap();

        let hits = store.search("rust fact", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content.as_text(), "rust fact major");
    }

    #[tokio::test]
    async fn search_missing_term_is_empty() {
        let store = store().await;
        store.save(record("something", 0.5)).await.unwrap();
        assert!(store.search("absent", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_older_than_works() {
        let store = store().await;
        let mut old = record("ancient", 0.5);
        old.created_at = Utc::now() - chrono::Duration::days(30);
        store.save(old).await.unwrap();
        store.save(record("recent", 0.5)).await.unwrap();

        let removed = store
            .delete_older_than(Utc::now() - chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.search("recent", 10).await.unwrap().len(), 1);
    }
}
