//! Working-memory entries and persistent records.
//!
//! `WorkingEntry` is the L2 unit: typed, importance-weighted, token-priced,
//! optionally expiring. `PersistentRecord` is the L3 unit produced by the
//! session-end flush and by compaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::Content;

/// The kind of an L2 working-memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Fact,
    Decision,
    Plan,
    Summary,
    Context,
    Thought,
    ToolCall,
    ToolResult,
    /// A message promoted from L1 eviction
    Message,
}

/// An entry in L2 working memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingEntry {
    /// Unique entry ID
    pub id: String,

    /// The content payload
    pub content: Content,

    /// What kind of entry this is
    pub entry_type: EntryType,

    /// Importance score in [0, 1]; drives eviction order
    pub importance: f64,

    /// Token cost of this entry
    pub token_count: usize,

    /// Tags for categorization
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// IDs of the L1 records this entry was derived from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_message_ids: Vec<String>,

    /// Owning session, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// How many times this entry has been read
    #[serde(default)]
    pub access_count: u64,

    /// Absolute expiry; expired entries are invisible to reads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// When this entry was created
    pub created_at: DateTime<Utc>,

    /// Free-form metadata
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl WorkingEntry {
    /// Create a new entry with clamped importance and no expiry.
    pub fn new(content: impl Into<Content>, entry_type: EntryType, importance: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            entry_type,
            importance: importance.clamp(0.0, 1.0),
            token_count: 0,
            tags: Vec::new(),
            source_message_ids: Vec::new(),
            session_id: None,
            access_count: 0,
            expires_at: None,
            created_at: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_token_count(mut self, tokens: usize) -> Self {
        self.token_count = tokens;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set an absolute expiry `ttl_seconds` from now.
    pub fn with_ttl(mut self, ttl_seconds: i64) -> Self {
        self.expires_at = Some(Utc::now() + chrono::Duration::seconds(ttl_seconds));
        self
    }

    pub fn with_source_messages(mut self, ids: Vec<String>) -> Self {
        self.source_message_ids = ids;
        self
    }

    /// Whether this entry has passed its absolute expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

/// A record in the L3 persistent store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentRecord {
    /// Unique record ID
    pub id: String,

    /// The content payload
    pub content: Content,

    /// Owning user, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Originating session, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Importance carried from the L2 entry that produced this record
    pub importance: f64,

    /// Tags for categorization
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Optional embedding vector (stored by vector-capable backends)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// IDs of the L2 entries that produced this record.
    ///
    /// Non-empty whenever the record was produced by flush or compaction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_entry_ids: Vec<String>,

    /// When this record was created
    pub created_at: DateTime<Utc>,

    /// Free-form metadata
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl PersistentRecord {
    pub fn new(content: impl Into<Content>, importance: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            user_id: None,
            session_id: None,
            importance: importance.clamp(0.0, 1.0),
            tags: Vec::new(),
            embedding: None,
            source_entry_ids: Vec::new(),
            created_at: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Build a record from an L2 entry at flush time.
    pub fn from_entry(entry: &WorkingEntry) -> Self {
        let mut record = Self::new(entry.content.clone(), entry.importance);
        record.session_id = entry.session_id.clone();
        record.tags = entry.tags.clone();
        record.source_entry_ids = vec![entry.id.clone()];
        record
    }
}
