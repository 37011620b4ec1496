//! The memory core — one L1, one L2, an optional L3, one counter.
//!
//! Unifies the layer hierarchy behind a single owner: ingests messages
//! into L1, promotes importance-gated evictions into L2, flushes L2 into
//! L3 at session end, and serves cross-layer search. Cores form a
//! parent/child tree for context inheritance: `read` falls through to the
//! parent when a key is absent locally — lookup fallthrough, not state
//! copying.
//!
//! Mutations are serialized behind a mutex that is never held across an
//! await, so state updates are atomic between suspension points.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use mnemo_core::counter::TokenCounter;
use mnemo_core::entry::{EntryType, PersistentRecord, WorkingEntry};
use mnemo_core::error::MemoryError;
use mnemo_core::message::{Content, MessageRecord, Role};
use mnemo_core::provider::EmbeddingProvider;
use mnemo_core::store::{MemoryStore, ScoredRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::window::MessageWindow;
use crate::working::WorkingMemory;

/// Configuration for a memory core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCoreConfig {
    /// L1 capacity in tokens
    pub l1_token_budget: usize,

    /// L2 capacity in tokens
    pub l2_token_budget: usize,

    /// Gate for L1→L2 promotion; 0.0 accepts every eviction
    pub l2_importance_threshold: f64,

    /// Default TTL applied to new L2 entries, if any
    pub l2_ttl_seconds: Option<i64>,

    /// Queue L2 evictions for persistence instead of dropping them
    pub durable_evictions: bool,
}

impl Default for MemoryCoreConfig {
    fn default() -> Self {
        Self {
            l1_token_budget: 8000,
            l2_token_budget: 16000,
            l2_importance_threshold: 0.6,
            l2_ttl_seconds: Some(86_400),
            durable_evictions: false,
        }
    }
}

/// A shared key-value context entry (task-to-task handoff).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    pub id: String,
    pub content: serde_json::Value,
    pub created_by: String,
}

/// Which layer a cross-layer search hit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryLayer {
    L1,
    L2,
    L3,
}

/// A cross-layer search hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub layer: MemoryLayer,
    pub id: String,
    pub content: String,
    pub score: f32,
}

/// Serializable snapshot of a core's in-process state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub node_id: String,
    pub l1_items: Vec<MessageRecord>,
    pub l2_items: Vec<WorkingEntry>,
    #[serde(default)]
    pub context: HashMap<String, ContextEntry>,
}

struct Inner {
    window: MessageWindow,
    working: WorkingMemory,
    context: HashMap<String, ContextEntry>,
    pending: Vec<PersistentRecord>,
}

/// The per-agent memory core.
pub struct MemoryCore {
    node_id: String,
    config: MemoryCoreConfig,
    counter: Arc<dyn TokenCounter>,
    store: RwLock<Option<Arc<dyn MemoryStore>>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    parent: Option<Arc<MemoryCore>>,
    children: Mutex<Vec<String>>,
    session_id: Option<String>,
    inner: Mutex<Inner>,
}

impl MemoryCore {
    pub fn new(
        node_id: impl Into<String>,
        config: MemoryCoreConfig,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        let window = MessageWindow::new(config.l1_token_budget, Arc::clone(&counter));
        let working = WorkingMemory::new(config.l2_token_budget);
        Self {
            node_id: node_id.into(),
            config,
            counter,
            store: RwLock::new(None),
            embedder: None,
            parent: None,
            children: Mutex::new(Vec::new()),
            session_id: None,
            inner: Mutex::new(Inner {
                window,
                working,
                context: HashMap::new(),
                pending: Vec::new(),
            }),
        }
    }

    /// Attach an L3 persistent store.
    pub fn with_store(self, store: Arc<dyn MemoryStore>) -> Self {
        *self.store.write().expect("store lock") = Some(store);
        self
    }

    /// Attach an embedding provider for lazy record embedding.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Declare a parent core for context inheritance.
    pub fn with_parent(mut self, parent: Arc<MemoryCore>) -> Self {
        parent.register_child(&self.node_id);
        self.parent = Some(parent);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Swap the L3 store after construction.
    pub fn set_store(&self, store: Arc<dyn MemoryStore>) {
        *self.store.write().expect("store lock") = Some(store);
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn has_store(&self) -> bool {
        self.store.read().expect("store lock").is_some()
    }

    fn store_handle(&self) -> Option<Arc<dyn MemoryStore>> {
        self.store.read().expect("store lock").clone()
    }

    pub fn register_child(&self, node_id: &str) {
        let mut children = self.children.lock().expect("children lock");
        if !children.iter().any(|c| c == node_id) {
            children.push(node_id.to_string());
        }
    }

    pub fn unregister_child(&self, node_id: &str) {
        self.children
            .lock()
            .expect("children lock")
            .retain(|c| c != node_id);
    }

    pub fn children_count(&self) -> usize {
        self.children.lock().expect("children lock").len()
    }

    // ── L1: message API ───────────────────────────────────────────────────

    /// Ingest a message into L1, promoting evictions through the
    /// importance gate. Returns the evicted records.
    pub async fn add_message(
        &self,
        role: Role,
        content: impl Into<Content>,
        token_count: Option<usize>,
    ) -> Vec<MessageRecord> {
        let mut record = MessageRecord {
            role,
            ..MessageRecord::user(content.into())
        };
        record.token_count = match token_count {
            Some(n) => n,
            None => self.counter.count_message(&record),
        };
        self.add_record(record).await
    }

    /// Ingest a tool result. A result whose matching tool call was already
    /// evicted appends as a plain tool message.
    pub async fn add_tool_result(
        &self,
        tool_call_id: impl Into<String>,
        content: impl Into<Content>,
        tool_name: Option<String>,
    ) -> Vec<MessageRecord> {
        let mut record = MessageRecord::tool_result(tool_call_id, content);
        record.tool_name = tool_name;
        record.token_count = self.counter.count_message(&record);
        self.add_record(record).await
    }

    /// Ingest a pre-built record into L1.
    pub async fn add_record(&self, record: MessageRecord) -> Vec<MessageRecord> {
        let mut inner = self.inner.lock().expect("memory lock");
        let evicted = inner.window.append(record);
        if !evicted.is_empty() {
            self.promote(&mut inner, &evicted);
        }
        evicted
    }

    /// Build L2 entries for evicted L1 records that pass the importance
    /// gate; below-gate candidates are discarded silently.
    fn promote(&self, inner: &mut Inner, evicted: &[MessageRecord]) {
        for record in evicted {
            let importance = record.importance();
            if importance < self.config.l2_importance_threshold {
                continue;
            }
            let mut entry = WorkingEntry::new(record.content.clone(), EntryType::Message, importance)
                .with_token_count(record.token_count)
                .with_source_messages(vec![record.id.clone()]);
            if let Some(ttl) = self.config.l2_ttl_seconds {
                entry = entry.with_ttl(ttl);
            }
            if let Some(session) = &self.session_id {
                entry = entry.with_session(session.clone());
            }
            debug!(importance, "promoting evicted L1 record to L2");
            let incoming_id = entry.id.clone();
            let displaced = inner.working.add(entry);
            self.queue_durable(inner, &incoming_id, displaced);
        }
    }

    /// Queue true L2 evictions for later persistence when configured.
    fn queue_durable(&self, inner: &mut Inner, incoming_id: &str, displaced: Vec<WorkingEntry>) {
        if !self.config.durable_evictions {
            return;
        }
        for entry in displaced {
            // A rejected add returns the incoming entry; that is not an
            // eviction and must not be persisted.
            if entry.id != incoming_id {
                inner.pending.push(PersistentRecord::from_entry(&entry));
            }
        }
    }

    /// L1 wire messages in window order.
    pub async fn get_messages(&self) -> Vec<serde_json::Value> {
        self.inner.lock().expect("memory lock").window.get_messages()
    }

    /// L1 records in window order.
    pub async fn get_items(&self) -> Vec<MessageRecord> {
        self.inner.lock().expect("memory lock").window.get_items()
    }

    /// The most recent `n` L1 records.
    pub async fn get_recent(&self, n: usize) -> Vec<MessageRecord> {
        self.inner.lock().expect("memory lock").window.get_recent(n)
    }

    // ── L2: working memory API ────────────────────────────────────────────

    /// Add an entry to L2, applying the default TTL and pricing via the
    /// counter when missing. Returns displaced entries (or the entry
    /// itself when rejected).
    pub async fn add_working_memory(&self, mut entry: WorkingEntry) -> Vec<WorkingEntry> {
        if entry.token_count == 0 {
            entry.token_count = self.counter.count(&entry.content.as_text());
        }
        if entry.expires_at.is_none() {
            if let Some(ttl) = self.config.l2_ttl_seconds {
                entry = entry.with_ttl(ttl);
            }
        }
        if entry.session_id.is_none() {
            entry.session_id = self.session_id.clone();
        }
        let incoming_id = entry.id.clone();
        let mut inner = self.inner.lock().expect("memory lock");
        let displaced = inner.working.add(entry);
        self.queue_durable(&mut inner, &incoming_id, displaced.clone());
        displaced
    }

    /// Read L2 entries, optionally restricted to one type.
    pub async fn get_working_memory(
        &self,
        limit: Option<usize>,
        entry_type: Option<EntryType>,
    ) -> Vec<WorkingEntry> {
        let mut inner = self.inner.lock().expect("memory lock");
        match entry_type {
            Some(t) => inner.working.get_by_type(t),
            None => inner.working.get_entries(limit),
        }
    }

    pub async fn remove_working_memory(&self, id: &str) -> Option<WorkingEntry> {
        self.inner.lock().expect("memory lock").working.remove(id)
    }

    // ── L3: persistent API ────────────────────────────────────────────────

    /// Persist a record, embedding it lazily when a provider is wired.
    /// Returns `None` when no store is attached or the save fails.
    pub async fn save_persistent(&self, mut record: PersistentRecord) -> Option<String> {
        let store = self.store_handle()?;
        self.embed_record(&mut record).await;
        match store.save(record).await {
            Ok(id) => Some(id),
            Err(e) => {
                debug!(error = %e, "L3 save failed");
                None
            }
        }
    }

    /// Search L3 by keyword. Empty when no store is attached or the search
    /// fails.
    pub async fn search_persistent(&self, query: &str, limit: usize) -> Vec<PersistentRecord> {
        let Some(store) = self.store_handle() else {
            return Vec::new();
        };
        match store.search(query, limit).await {
            Ok(records) => records,
            Err(e) => {
                debug!(error = %e, "L3 search failed");
                Vec::new()
            }
        }
    }

    /// Semantic search over L3 when the store advertises the capability.
    pub async fn search_semantic(
        &self,
        query: &str,
        top_k: usize,
        min_score: f32,
    ) -> Vec<ScoredRecord> {
        let Some(store) = self.store_handle() else {
            return Vec::new();
        };
        if !store.supports_semantic() {
            return Vec::new();
        }
        match store.search_semantic(query, top_k, min_score).await {
            Ok(hits) => hits,
            Err(e) => {
                debug!(error = %e, "L3 semantic search failed");
                Vec::new()
            }
        }
    }

    async fn embed_record(&self, record: &mut PersistentRecord) {
        if record.embedding.is_some() {
            return;
        }
        let Some(embedder) = &self.embedder else { return };
        match embedder.embed(&record.content.as_text()).await {
            Ok(vector) => record.embedding = Some(vector),
            Err(e) => debug!(error = %e, "lazy embedding failed"),
        }
    }

    // ── Cross-layer search ────────────────────────────────────────────────

    /// Fan out a substring search across L1, L2, and L3 (plus semantic
    /// similarity when available) and merge into a mixed hit list.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let query_lower = query.to_lowercase();
        let mut hits: Vec<SearchHit> = Vec::new();

        {
            let mut inner = self.inner.lock().expect("memory lock");
            for record in inner.window.get_items() {
                if record.content.as_text().to_lowercase().contains(&query_lower) {
                    hits.push(SearchHit {
                        layer: MemoryLayer::L1,
                        id: record.id.clone(),
                        content: record.content.as_text(),
                        score: 1.0,
                    });
                }
            }
            for entry in inner.working.get_entries(None) {
                if entry.content.as_text().to_lowercase().contains(&query_lower) {
                    hits.push(SearchHit {
                        layer: MemoryLayer::L2,
                        id: entry.id.clone(),
                        content: entry.content.as_text(),
                        score: entry.importance as f32,
                    });
                }
            }
        }

        for record in self.search_persistent(query, limit).await {
            hits.push(SearchHit {
                layer: MemoryLayer::L3,
                id: record.id.clone(),
                content: record.content.as_text(),
                score: 0.5,
            });
        }
        for scored in self.search_semantic(query, limit, 0.0).await {
            hits.push(SearchHit {
                layer: MemoryLayer::L3,
                id: scored.record.id.clone(),
                content: scored.record.content.as_text(),
                score: scored.score,
            });
        }

        // Dedup by id keeping the best score
        let mut best: HashMap<String, SearchHit> = HashMap::new();
        for hit in hits {
            best.entry(hit.id.clone())
                .and_modify(|existing| {
                    if hit.score > existing.score {
                        *existing = hit.clone();
                    }
                })
                .or_insert(hit);
        }
        let mut merged: Vec<SearchHit> = best.into_values().collect();
        merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        merged.truncate(limit);
        merged
    }

    // ── Session lifecycle ─────────────────────────────────────────────────

    /// Flush every L2 entry into L3, then clear L1 and L2.
    ///
    /// Returns the count persisted. A second call finds empty layers and
    /// returns 0; without a store nothing is persisted.
    pub async fn end_session(&self) -> usize {
        let entries: Vec<WorkingEntry> = {
            let mut inner = self.inner.lock().expect("memory lock");
            inner.working.get_entries(None)
        };

        let mut persisted = 0usize;
        if let Some(store) = self.store_handle() {
            for entry in &entries {
                let mut record = PersistentRecord::from_entry(entry);
                self.embed_record(&mut record).await;
                match store.save(record).await {
                    Ok(_) => persisted += 1,
                    Err(e) => debug!(error = %e, "session flush save failed"),
                }
            }
        }

        let mut inner = self.inner.lock().expect("memory lock");
        inner.window.clear();
        inner.working.clear();
        debug!(persisted, "session ended");
        persisted
    }

    /// Drain the durable-eviction queue into L3. Returns the count saved.
    pub async fn flush_pending(&self) -> usize {
        let pending: Vec<PersistentRecord> = {
            let mut inner = self.inner.lock().expect("memory lock");
            std::mem::take(&mut inner.pending)
        };
        if pending.is_empty() {
            return 0;
        }
        let Some(store) = self.store_handle() else {
            return 0;
        };
        let mut saved = 0usize;
        for mut record in pending {
            self.embed_record(&mut record).await;
            match store.save(record).await {
                Ok(_) => saved += 1,
                Err(e) => debug!(error = %e, "pending flush save failed"),
            }
        }
        saved
    }

    // ── Context store (parent/child inheritance) ──────────────────────────

    /// Store a shared context value under a key.
    pub async fn set_context(&self, context_id: impl Into<String>, content: serde_json::Value) {
        let id = context_id.into();
        let entry = ContextEntry {
            id: id.clone(),
            content,
            created_by: self.node_id.clone(),
        };
        self.inner
            .lock()
            .expect("memory lock")
            .context
            .insert(id, entry);
    }

    /// Read a context value, falling through to ancestors when the key is
    /// absent locally.
    pub async fn read(&self, context_id: &str) -> Option<ContextEntry> {
        if let Some(entry) = self
            .inner
            .lock()
            .expect("memory lock")
            .context
            .get(context_id)
        {
            return Some(entry.clone());
        }
        let mut ancestor = self.parent.clone();
        while let Some(core) = ancestor {
            if let Some(entry) = core
                .inner
                .lock()
                .expect("memory lock")
                .context
                .get(context_id)
            {
                return Some(entry.clone());
            }
            ancestor = core.parent.clone();
        }
        None
    }

    /// All locally-stored context entries.
    pub async fn list_context(&self) -> Vec<ContextEntry> {
        self.inner
            .lock()
            .expect("memory lock")
            .context
            .values()
            .cloned()
            .collect()
    }

    /// Context entries visible through the parent chain, nearest ancestor
    /// first. Keys shadowed locally are excluded.
    pub async fn list_inherited_context(&self) -> Vec<ContextEntry> {
        let local_keys: std::collections::HashSet<String> = self
            .inner
            .lock()
            .expect("memory lock")
            .context
            .keys()
            .cloned()
            .collect();

        let mut seen = local_keys;
        let mut inherited = Vec::new();
        let mut ancestor = self.parent.clone();
        while let Some(core) = ancestor {
            {
                let inner = core.inner.lock().expect("memory lock");
                for (key, entry) in &inner.context {
                    if seen.insert(key.clone()) {
                        inherited.push(entry.clone());
                    }
                }
            }
            ancestor = core.parent.clone();
        }
        inherited
    }

    // ── Snapshots ─────────────────────────────────────────────────────────

    /// Export L1, L2, and the context store as a flat structured value.
    pub async fn export_snapshot(&self) -> serde_json::Value {
        let inner = self.inner.lock().expect("memory lock");
        let snapshot = MemorySnapshot {
            node_id: self.node_id.clone(),
            l1_items: inner.window.get_items(),
            l2_items: inner.working.entries(),
            context: inner.context.clone(),
        };
        serde_json::to_value(&snapshot).unwrap_or(serde_json::Value::Null)
    }

    /// Restore from a snapshot value.
    ///
    /// A snapshot with missing required fields aborts the restore and
    /// leaves the core empty.
    pub async fn restore_snapshot(&self, snapshot: serde_json::Value) -> Result<(), MemoryError> {
        let parsed: MemorySnapshot = match serde_json::from_value(snapshot) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "corrupted snapshot, leaving core empty");
                self.clear_all().await;
                return Err(MemoryError::Snapshot(e.to_string()));
            }
        };

        let mut inner = self.inner.lock().expect("memory lock");
        inner.window.clear();
        inner.working.clear();
        inner.context.clear();
        for item in parsed.l1_items {
            inner.window.append(item);
        }
        for entry in parsed.l2_items {
            inner.working.add(entry);
        }
        inner.context = parsed.context;
        Ok(())
    }

    /// Clear every in-process layer and the context store.
    pub async fn clear_all(&self) {
        let mut inner = self.inner.lock().expect("memory lock");
        inner.window.clear();
        inner.working.clear();
        inner.context.clear();
        inner.pending.clear();
    }

    // ── Stats ─────────────────────────────────────────────────────────────

    pub async fn stats(&self) -> MemoryStats {
        let inner = self.inner.lock().expect("memory lock");
        MemoryStats {
            node_id: self.node_id.clone(),
            l1_size: inner.window.size(),
            l1_tokens: inner.window.token_usage(),
            l1_budget: inner.window.token_budget(),
            l2_size: inner.working.size(),
            l2_tokens: inner.working.token_usage(),
            l2_budget: inner.working.token_budget(),
            context_count: inner.context.len(),
            pending_count: inner.pending.len(),
            children_count: self.children.lock().expect("children lock").len(),
            has_store: self.has_store(),
        }
    }
}

/// A point-in-time view of a core's occupancy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    pub node_id: String,
    pub l1_size: usize,
    pub l1_tokens: usize,
    pub l1_budget: usize,
    pub l2_size: usize,
    pub l2_tokens: usize,
    pub l2_budget: usize,
    pub context_count: usize,
    pub pending_count: usize,
    pub children_count: usize,
    pub has_store: bool,
}
