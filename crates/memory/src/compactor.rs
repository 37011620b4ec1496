//! Memory compaction — summarize the assembled context under pressure.
//!
//! When context usage crosses the configured threshold (and no cooldown
//! is active for the session), the compactor persists each non-system
//! message verbatim to the segment store, writes one summary entry per
//! message into L2 with a back-reference, and promotes high-importance
//! messages into L3 facts. An LLM summarizer is optional; failures fall
//! back to a rule-based excerpt and never abort compaction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mnemo_core::counter::TokenCounter;
use mnemo_core::entry::{EntryType, PersistentRecord, WorkingEntry};
use mnemo_core::error::MemoryError;
use mnemo_core::message::{MessageRecord, Role};
use mnemo_core::provider::{ChatRequest, Provider};
use mnemo_core::store::{MemorySegment, SegmentStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::MemoryCore;

/// How compaction is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionStrategy {
    /// Triggered automatically when the threshold is crossed
    #[default]
    Silent,
    /// Only `compact_now` triggers compaction
    Explicit,
    /// Compaction disabled
    None,
}

/// Compaction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    pub enabled: bool,

    /// Context usage ratio that triggers compaction
    pub threshold: f64,

    /// Minimum seconds between compactions per session
    pub cooldown_seconds: u64,

    pub strategy: CompactionStrategy,

    /// Messages at or above this importance become L3 facts
    pub fact_importance_threshold: f64,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.85,
            cooldown_seconds: 300,
            strategy: CompactionStrategy::Silent,
            fact_importance_threshold: 0.7,
        }
    }
}

/// Optional LLM-backed fact summarization.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, MemoryError>;
}

/// A summarizer that asks the LLM collaborator for a one-line fact.
pub struct LlmSummarizer {
    provider: Arc<dyn Provider>,
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, MemoryError> {
        let request = ChatRequest::new(vec![serde_json::json!({
            "role": "user",
            "content": format!(
                "Condense the following message into a single factual sentence:\n\n{text}"
            ),
        })]);
        let response = self.provider.chat(request).await?;
        Ok(response.content)
    }
}

/// The compactor.
pub struct Compactor {
    config: CompactionConfig,
    core: Arc<MemoryCore>,
    counter: Arc<dyn TokenCounter>,
    segments: Option<Arc<dyn SegmentStore>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    last_compaction: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Compactor {
    pub fn new(
        config: CompactionConfig,
        core: Arc<MemoryCore>,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        Self {
            config,
            core,
            counter,
            segments: None,
            summarizer: None,
            last_compaction: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a segment store for verbatim originals.
    pub fn with_segment_store(mut self, segments: Arc<dyn SegmentStore>) -> Self {
        self.segments = Some(segments);
        self
    }

    /// Attach an LLM summarizer for fact promotion.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Check usage and compact if warranted. Returns whether compaction
    /// ran.
    pub async fn check_and_compact(
        &self,
        session_id: &str,
        messages: &[MessageRecord],
        max_context_tokens: usize,
    ) -> bool {
        if !self.config.enabled
            || max_context_tokens == 0
            || self.config.strategy != CompactionStrategy::Silent
        {
            return false;
        }

        let current = self.counter.count_messages(messages);
        let usage = current as f64 / max_context_tokens as f64;
        if usage < self.config.threshold {
            return false;
        }

        if self.in_cooldown(session_id) {
            debug!(session_id, "compaction skipped: cooldown active");
            return false;
        }

        self.perform(session_id, messages).await;
        self.stamp(session_id);
        true
    }

    /// Explicitly trigger compaction, bypassing the usage threshold.
    /// Still respects the per-session cooldown. No-op when disabled.
    pub async fn compact_now(&self, session_id: &str, messages: &[MessageRecord]) -> bool {
        if !self.config.enabled || self.config.strategy == CompactionStrategy::None {
            return false;
        }
        if self.in_cooldown(session_id) {
            return false;
        }
        self.perform(session_id, messages).await;
        self.stamp(session_id);
        true
    }

    fn in_cooldown(&self, session_id: &str) -> bool {
        let guard = self.last_compaction.lock().expect("compaction lock");
        match guard.get(session_id) {
            Some(last) => {
                let elapsed = Utc::now().signed_duration_since(*last);
                elapsed < chrono::Duration::seconds(self.config.cooldown_seconds as i64)
            }
            None => false,
        }
    }

    fn stamp(&self, session_id: &str) {
        self.last_compaction
            .lock()
            .expect("compaction lock")
            .insert(session_id.to_string(), Utc::now());
    }

    async fn perform(&self, session_id: &str, messages: &[MessageRecord]) {
        let compressible: Vec<&MessageRecord> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .collect();
        if compressible.is_empty() {
            debug!("nothing to compact");
            return;
        }

        info!(
            session_id,
            messages = compressible.len(),
            "starting memory compaction"
        );

        // Persist originals as segments first so summaries can point back.
        let mut segment_ids: Vec<Option<String>> = Vec::with_capacity(compressible.len());
        for (index, message) in compressible.iter().enumerate() {
            let id = match &self.segments {
                Some(store) => {
                    let mut segment = MemorySegment::new(message.content.as_text());
                    segment.session_id = Some(session_id.to_string());
                    segment
                        .metadata
                        .insert("role".into(), serde_json::json!(message.role.as_str()));
                    segment
                        .metadata
                        .insert("index".into(), serde_json::json!(index));
                    match store.store(segment).await {
                        Ok(id) => Some(id),
                        Err(e) => {
                            warn!(error = %e, "segment store failed, summary will lack backref");
                            None
                        }
                    }
                }
                None => None,
            };
            segment_ids.push(id);
        }

        let mut facts = 0usize;
        for (message, segment_id) in compressible.iter().zip(segment_ids.iter()) {
            let excerpt = Self::excerpt(&message.content.as_text(), 200);
            let summary_text = format!("{}: {excerpt}", message.role.as_str());

            let mut entry = WorkingEntry::new(
                summary_text.clone(),
                EntryType::Summary,
                message.importance(),
            )
            .with_session(session_id.to_string())
            .with_source_messages(vec![message.id.clone()]);
            entry.token_count = self.counter.count(&summary_text);
            if let Some(sid) = segment_id {
                entry
                    .metadata
                    .insert("segment_id".into(), serde_json::json!(sid));
            }
            let entry_id = entry.id.clone();
            self.core.add_working_memory(entry).await;

            // High-importance messages become durable facts.
            if message.importance() >= self.config.fact_importance_threshold {
                let fact_text = self.summarize_or_excerpt(&message.content.as_text()).await;
                let mut record = PersistentRecord::new(fact_text, message.importance());
                record.session_id = Some(session_id.to_string());
                record.source_entry_ids = vec![entry_id];
                record
                    .metadata
                    .insert("kind".into(), serde_json::json!("compacted_fact"));
                if self.core.save_persistent(record).await.is_some() {
                    facts += 1;
                }
            }
        }

        info!(
            session_id,
            compacted = compressible.len(),
            facts,
            "memory compaction finished"
        );
    }

    /// Summarize via the LLM when wired, falling back to a rule-based
    /// excerpt on any failure.
    async fn summarize_or_excerpt(&self, text: &str) -> String {
        if let Some(summarizer) = &self.summarizer {
            match summarizer.summarize(text).await {
                Ok(summary) if !summary.is_empty() => return summary,
                Ok(_) => debug!("summarizer returned empty output, using excerpt"),
                Err(e) => debug!(error = %e, "summarizer failed, using excerpt"),
            }
        }
        Self::excerpt(text, 200)
    }

    fn excerpt(text: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            text.to_string()
        } else {
            text.chars().take(max_chars).collect()
        }
    }
}
