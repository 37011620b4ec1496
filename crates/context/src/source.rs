//! Context sources — the providers the orchestrator consults.
//!
//! Each source turns its backing state into token-priced context blocks
//! under the allocation it is handed. Sources never exceed their budget;
//! the orchestrator still enforces the global bound.

use std::sync::Arc;

use async_trait::async_trait;
use mnemo_core::block::ContextBlock;
use mnemo_core::counter::TokenCounter;
use mnemo_core::message::Role;
use mnemo_memory::MemoryCore;

/// A named provider of context blocks.
#[async_trait]
pub trait ContextSource: Send + Sync {
    /// The allocation name this source collects under (e.g. "L1_recent").
    fn source_name(&self) -> &str;

    /// Produce blocks for the query within `token_budget`.
    async fn collect(
        &self,
        query: &str,
        token_budget: usize,
        counter: &dyn TokenCounter,
        min_relevance: f32,
    ) -> Vec<ContextBlock>;
}

/// Fixed payload source for system_prompt / user_input / tools / skills,
/// supplied by the execution loop each iteration.
pub struct StaticSource {
    name: String,
    role: String,
    content: String,
    priority: f64,
}

impl StaticSource {
    pub fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            content: content.into(),
            priority: 0.9,
        }
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }
}

#[async_trait]
impl ContextSource for StaticSource {
    fn source_name(&self) -> &str {
        &self.name
    }

    async fn collect(
        &self,
        _query: &str,
        token_budget: usize,
        counter: &dyn TokenCounter,
        _min_relevance: f32,
    ) -> Vec<ContextBlock> {
        if self.content.is_empty() {
            return Vec::new();
        }
        let tokens = counter.count(&self.content);
        if tokens > token_budget {
            return Vec::new();
        }
        vec![
            ContextBlock::new(self.content.clone(), self.role.clone(), self.name.clone())
                .with_tokens(tokens)
                .with_priority(self.priority)
                .not_compressible(),
        ]
    }
}

/// Recent L1 messages, newest-first admission under the budget, emitted
/// in chronological order. System records are skipped — the orchestrator
/// owns the system prompt.
pub struct RecentMessagesSource {
    core: Arc<MemoryCore>,
}

impl RecentMessagesSource {
    pub fn new(core: Arc<MemoryCore>) -> Self {
        Self { core }
    }
}

#[async_trait]
impl ContextSource for RecentMessagesSource {
    fn source_name(&self) -> &str {
        "L1_recent"
    }

    async fn collect(
        &self,
        _query: &str,
        token_budget: usize,
        counter: &dyn TokenCounter,
        _min_relevance: f32,
    ) -> Vec<ContextBlock> {
        let records = self.core.get_items().await;
        let mut used = 0usize;
        let mut included = Vec::new();

        for record in records.iter().rev() {
            if record.role == Role::System {
                continue;
            }
            let tokens = if record.token_count > 0 {
                record.token_count
            } else {
                counter.count_message(record)
            };
            if used + tokens > token_budget {
                break;
            }
            used += tokens;
            included.push((record, tokens));
        }
        included.reverse();

        included
            .into_iter()
            .map(|(record, tokens)| {
                let mut block = ContextBlock::new(
                    record.content.as_text(),
                    record.role.as_str(),
                    "L1_recent",
                )
                .with_tokens(tokens)
                .with_priority(0.6);
                block
                    .metadata
                    .insert("message_id".into(), serde_json::json!(record.id));
                block
            })
            .collect()
    }
}

/// Important L2 entries, highest importance first.
pub struct ImportantEntriesSource {
    core: Arc<MemoryCore>,
}

impl ImportantEntriesSource {
    pub fn new(core: Arc<MemoryCore>) -> Self {
        Self { core }
    }
}

#[async_trait]
impl ContextSource for ImportantEntriesSource {
    fn source_name(&self) -> &str {
        "L2_important"
    }

    async fn collect(
        &self,
        _query: &str,
        token_budget: usize,
        counter: &dyn TokenCounter,
        min_relevance: f32,
    ) -> Vec<ContextBlock> {
        let entries = self.core.get_working_memory(None, None).await;
        let mut used = 0usize;
        let mut blocks = Vec::new();

        for entry in entries {
            if (entry.importance as f32) < min_relevance {
                continue;
            }
            let content = format!("[Working Memory] {}", entry.content.as_text());
            let tokens = counter.count(&content);
            if used + tokens > token_budget {
                continue;
            }
            used += tokens;
            let mut block = ContextBlock::new(content, "system", "L2_important")
                .with_tokens(tokens)
                .with_priority(entry.importance);
            block
                .metadata
                .insert("entry_id".into(), serde_json::json!(entry.id));
            block.metadata.insert(
                "entry_type".into(),
                serde_json::json!(format!("{:?}", entry.entry_type).to_lowercase()),
            );
            blocks.push(block);
        }
        blocks
    }
}

/// Context inherited from ancestor cores (fractal parent chain).
pub struct InheritedContextSource {
    core: Arc<MemoryCore>,
}

impl InheritedContextSource {
    pub fn new(core: Arc<MemoryCore>) -> Self {
        Self { core }
    }
}

#[async_trait]
impl ContextSource for InheritedContextSource {
    fn source_name(&self) -> &str {
        "INHERITED"
    }

    async fn collect(
        &self,
        _query: &str,
        token_budget: usize,
        counter: &dyn TokenCounter,
        _min_relevance: f32,
    ) -> Vec<ContextBlock> {
        let entries = self.core.list_inherited_context().await;
        let mut used = 0usize;
        let mut blocks = Vec::new();

        for entry in entries {
            let rendered = match entry.content.as_str() {
                Some(text) => text.to_string(),
                None => entry.content.to_string(),
            };
            let content = format!("[Inherited: {}] {rendered}", entry.id);
            let tokens = counter.count(&content);
            if used + tokens > token_budget {
                continue;
            }
            used += tokens;
            let mut block = ContextBlock::new(content, "system", "INHERITED")
                .with_tokens(tokens)
                .with_priority(0.4);
            block
                .metadata
                .insert("created_by".into(), serde_json::json!(entry.created_by));
            blocks.push(block);
        }
        blocks
    }
}

/// A cross-agent shared pool of pinned context strings.
#[derive(Default)]
pub struct SharedPool {
    items: std::sync::Mutex<Vec<(String, f64)>>,
}

impl SharedPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a context string at a priority.
    pub fn publish(&self, content: impl Into<String>, priority: f64) {
        self.items
            .lock()
            .expect("shared pool lock")
            .push((content.into(), priority.clamp(0.0, 1.0)));
    }

    pub fn clear(&self) {
        self.items.lock().expect("shared pool lock").clear();
    }

    fn snapshot(&self) -> Vec<(String, f64)> {
        self.items.lock().expect("shared pool lock").clone()
    }
}

/// Source over a `SharedPool`.
pub struct SharedPoolSource {
    pool: Arc<SharedPool>,
}

impl SharedPoolSource {
    pub fn new(pool: Arc<SharedPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContextSource for SharedPoolSource {
    fn source_name(&self) -> &str {
        "shared_pool"
    }

    async fn collect(
        &self,
        _query: &str,
        token_budget: usize,
        counter: &dyn TokenCounter,
        _min_relevance: f32,
    ) -> Vec<ContextBlock> {
        let mut used = 0usize;
        let mut blocks = Vec::new();
        for (content, priority) in self.pool.snapshot() {
            let labeled = format!("[Shared] {content}");
            let tokens = counter.count(&labeled);
            if used + tokens > token_budget {
                continue;
            }
            used += tokens;
            blocks.push(
                ContextBlock::new(labeled, "system", "shared_pool")
                    .with_tokens(tokens)
                    .with_priority(priority),
            );
        }
        blocks
    }
}
