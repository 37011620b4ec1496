//! The context orchestrator — gathers sources under budget and emits the
//! final prompt message list.
//!
//! Per iteration: derive a fresh budget for the current system prompt,
//! allocate it across the registered sources, collect each source under
//! its grant (slow or failing sources contribute zero blocks), then
//! render blocks into wire messages with the system prompt first. The
//! assembled prompt never exceeds `total − reserved_output`; when
//! over-budget, the lowest-priority compressible blocks are dropped.

use std::sync::Arc;
use std::time::Duration;

use mnemo_core::block::ContextBlock;
use mnemo_core::counter::TokenCounter;
use mnemo_core::message::MessageRecord;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::budget::{AdaptiveBudgetManager, BudgetAllocation, TokenBudget};
use crate::source::ContextSource;

/// Deterministic collection order across sources.
pub const SOURCE_PRIORITY: [&str; 9] = [
    "system_prompt",
    "user_input",
    "tools",
    "skills",
    "L1_recent",
    "L2_important",
    "shared_pool",
    "retrieval",
    "INHERITED",
];

fn priority_rank(name: &str) -> usize {
    SOURCE_PRIORITY
        .iter()
        .position(|candidate| *candidate == name)
        .unwrap_or(SOURCE_PRIORITY.len())
}

/// Orchestrator tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Insert prompt-cache markers after the system prompt and after
    /// large retrieved blocks
    pub cache_markers: bool,

    /// A retrieved block at or above this size counts as large
    pub large_block_tokens: usize,

    /// Per-source collection timeout
    pub source_timeout_secs: u64,

    /// Separator between fragments of the same source
    pub fragment_separator: String,

    /// Relevance floor handed to sources
    pub min_relevance: f32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cache_markers: false,
            large_block_tokens: 512,
            source_timeout_secs: 30,
            fragment_separator: "\n---\n".into(),
            min_relevance: 0.5,
        }
    }
}

/// The assembled prompt plus accounting metadata.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    /// Wire-format messages, system prompt first
    pub messages: Vec<serde_json::Value>,

    /// Total measured tokens of `messages`
    pub total_tokens: usize,

    /// The budget this prompt was assembled under
    pub budget: TokenBudget,

    /// Per-source allocations used
    pub allocations: BudgetAllocation,

    /// Blocks dropped by the final bound enforcement
    pub dropped_blocks: usize,
}

/// Gathers context sources and emits a bounded message list.
pub struct ContextOrchestrator {
    budget_manager: Arc<AdaptiveBudgetManager>,
    counter: Arc<dyn TokenCounter>,
    sources: Vec<Arc<dyn ContextSource>>,
    config: OrchestratorConfig,
}

impl ContextOrchestrator {
    pub fn new(
        budget_manager: Arc<AdaptiveBudgetManager>,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        Self {
            budget_manager,
            counter,
            sources: Vec::new(),
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a source. Collection follows `SOURCE_PRIORITY` order, not
    /// registration order.
    pub fn with_source(mut self, source: Arc<dyn ContextSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn register_source(&mut self, source: Arc<dyn ContextSource>) {
        self.sources.push(source);
    }

    /// Assemble the prompt for one iteration.
    pub async fn assemble(&self, query: &str, system_prompt: &str) -> AssembledPrompt {
        // 1. Fresh budget and allocations for the sources we will consult
        let budget = self.budget_manager.create_budget(system_prompt);
        let mut ordered: Vec<&Arc<dyn ContextSource>> = self.sources.iter().collect();
        ordered.sort_by_key(|source| priority_rank(source.source_name()));
        let names: Vec<&str> = ordered.iter().map(|s| s.source_name()).collect();
        let allocations = self.budget_manager.allocate_for_sources(&budget, &names);

        // 2. Collect each source under its grant; timeouts and
        // cancellations yield zero blocks.
        let timeout = Duration::from_secs(self.config.source_timeout_secs);
        let mut blocks: Vec<ContextBlock> = Vec::new();
        for source in ordered {
            let grant = allocations.get(source.source_name());
            if grant == 0 {
                continue;
            }
            let collected = match tokio::time::timeout(
                timeout,
                source.collect(query, grant, self.counter.as_ref(), self.config.min_relevance),
            )
            .await
            {
                Ok(collected) => collected,
                Err(_) => {
                    warn!(source = source.source_name(), "source collection timed out");
                    Vec::new()
                }
            };
            debug!(
                source = source.source_name(),
                grant,
                blocks = collected.len(),
                "source collected"
            );
            blocks.extend(collected);
        }

        // 3. Enforce the hard output bound before rendering
        let system_tokens = if system_prompt.is_empty() {
            0
        } else {
            self.counter
                .count_message(&MessageRecord::system(system_prompt))
        };
        let hard_limit = budget.total.saturating_sub(budget.reserved_output);
        let mut dropped = 0usize;
        loop {
            let total: usize = system_tokens + blocks.iter().map(|b| b.token_count).sum::<usize>();
            if total <= hard_limit {
                break;
            }
            // Drop the lowest-priority compressible block.
            let victim = blocks
                .iter()
                .enumerate()
                .filter(|(_, b)| b.compressible)
                .min_by(|a, b| {
                    a.1.priority
                        .partial_cmp(&b.1.priority)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(idx, _)| idx);
            match victim {
                Some(idx) => {
                    blocks.remove(idx);
                    dropped += 1;
                }
                None => break,
            }
        }
        if dropped > 0 {
            warn!(dropped, "assembled prompt exceeded bound, dropped blocks");
        }

        // 4. Render to wire messages
        let messages = self.render(system_prompt, &blocks);
        let total_tokens = system_tokens + blocks.iter().map(|b| b.token_count).sum::<usize>();

        AssembledPrompt {
            messages,
            total_tokens,
            budget,
            allocations,
            dropped_blocks: dropped,
        }
    }

    /// Render blocks into wire messages, system prompt first. Consecutive
    /// system-role fragments of the same source merge into one message
    /// with a separator; other roles stay one message per block.
    fn render(&self, system_prompt: &str, blocks: &[ContextBlock]) -> Vec<serde_json::Value> {
        let mut messages: Vec<serde_json::Value> = Vec::new();

        if !system_prompt.is_empty() {
            let mut system = serde_json::json!({
                "role": "system",
                "content": system_prompt,
            });
            if self.config.cache_markers {
                system["cache_control"] = serde_json::json!({"type": "ephemeral"});
            }
            messages.push(system);
        }

        let mut index = 0usize;
        while index < blocks.len() {
            let block = &blocks[index];
            if block.role == "system" {
                // Merge the run of system blocks from this source
                let mut contents = vec![block.content.clone()];
                let mut run_tokens = block.token_count;
                let source = block.source.clone();
                let mut end = index + 1;
                while end < blocks.len()
                    && blocks[end].role == "system"
                    && blocks[end].source == source
                {
                    contents.push(blocks[end].content.clone());
                    run_tokens += blocks[end].token_count;
                    end += 1;
                }
                let merged = contents.join(&self.config.fragment_separator);
                let mut message = serde_json::json!({
                    "role": "system",
                    "content": merged,
                });
                if self.config.cache_markers
                    && source == "retrieval"
                    && run_tokens >= self.config.large_block_tokens
                {
                    message["cache_control"] = serde_json::json!({"type": "ephemeral"});
                }
                messages.push(message);
                index = end;
            } else {
                messages.push(serde_json::json!({
                    "role": block.role,
                    "content": block.content,
                }));
                index += 1;
            }
        }

        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSource;
    use async_trait::async_trait;
    use mnemo_core::counter::EstimateCounter;

    fn orchestrator(window: usize) -> ContextOrchestrator {
        let counter: Arc<dyn TokenCounter> = Arc::new(EstimateCounter::new());
        let budget = Arc::new(AdaptiveBudgetManager::new(Arc::clone(&counter), window, 0.25));
        ContextOrchestrator::new(budget, counter)
    }

    struct SlowSource;

    #[async_trait]
    impl ContextSource for SlowSource {
        fn source_name(&self) -> &str {
            "retrieval"
        }

        async fn collect(
            &self,
            _query: &str,
            _token_budget: usize,
            _counter: &dyn TokenCounter,
            _min_relevance: f32,
        ) -> Vec<ContextBlock> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            vec![ContextBlock::new("too late", "system", "retrieval").with_tokens(3)]
        }
    }

    struct FragmentSource;

    #[async_trait]
    impl ContextSource for FragmentSource {
        fn source_name(&self) -> &str {
            "L2_important"
        }

        async fn collect(
            &self,
            _query: &str,
            _token_budget: usize,
            _counter: &dyn TokenCounter,
            _min_relevance: f32,
        ) -> Vec<ContextBlock> {
            vec![
                ContextBlock::new("fragment one", "system", "L2_important").with_tokens(4),
                ContextBlock::new("fragment two", "system", "L2_important").with_tokens(4),
            ]
        }
    }

    #[tokio::test]
    async fn system_prompt_is_first_message() {
        let orch = orchestrator(8000)
            .with_source(Arc::new(StaticSource::new("user_input", "user", "hello")));
        let prompt = orch.assemble("hello", "You are a helpful agent.").await;

        assert_eq!(prompt.messages[0]["role"], "system");
        assert_eq!(prompt.messages[0]["content"], "You are a helpful agent.");
        assert_eq!(prompt.messages[1]["role"], "user");
    }

    #[tokio::test]
    async fn total_stays_under_hard_bound() {
        let orch = orchestrator(400).with_source(Arc::new(
            StaticSource::new("skills", "system", "s ".repeat(200)).with_priority(0.2),
        ));
        let prompt = orch.assemble("q", "prompt").await;
        assert!(prompt.total_tokens <= prompt.budget.total - prompt.budget.reserved_output);
    }

    #[tokio::test]
    async fn over_budget_drops_lowest_priority_compressible() {
        // Window small enough that not everything fits; the low-priority
        // block goes first. Hard bound: 160 − 40 reserved = 120 tokens.
        let counter: Arc<dyn TokenCounter> = Arc::new(EstimateCounter::new());
        let budget = Arc::new(AdaptiveBudgetManager::new(Arc::clone(&counter), 160, 0.25));
        let mut orch = ContextOrchestrator::new(budget, counter);

        struct FixedBlocks;

        #[async_trait]
        impl ContextSource for FixedBlocks {
            fn source_name(&self) -> &str {
                "retrieval"
            }

            async fn collect(
                &self,
                _query: &str,
                _token_budget: usize,
                _counter: &dyn TokenCounter,
                _min_relevance: f32,
            ) -> Vec<ContextBlock> {
                vec![
                    ContextBlock::new("keep me", "system", "retrieval")
                        .with_tokens(60)
                        .with_priority(0.9),
                    ContextBlock::new("drop me", "system", "retrieval")
                        .with_tokens(80)
                        .with_priority(0.1),
                ]
            }
        }

        orch.register_source(Arc::new(FixedBlocks));
        let prompt = orch.assemble("q", "sys").await;

        assert_eq!(prompt.dropped_blocks, 1);
        let rendered = prompt.messages.iter().any(|m| {
            m["content"]
                .as_str()
                .is_some_and(|c| c.contains("drop me"))
        });
        assert!(!rendered);
        assert!(prompt.total_tokens <= 150);
    }

    #[tokio::test]
    async fn timed_out_source_contributes_nothing() {
        let counter: Arc<dyn TokenCounter> = Arc::new(EstimateCounter::new());
        let budget = Arc::new(AdaptiveBudgetManager::new(Arc::clone(&counter), 8000, 0.25));
        let orch = ContextOrchestrator::new(budget, counter)
            .with_config(OrchestratorConfig {
                source_timeout_secs: 1,
                ..OrchestratorConfig::default()
            })
            .with_source(Arc::new(SlowSource))
            .with_source(Arc::new(StaticSource::new("user_input", "user", "hi")));

        tokio::time::pause();
        let handle = tokio::spawn(async move { orch.assemble("q", "sys").await });
        tokio::time::advance(Duration::from_secs(2)).await;
        let prompt = handle.await.unwrap();

        assert!(
            !prompt
                .messages
                .iter()
                .any(|m| m["content"].as_str().is_some_and(|c| c.contains("too late")))
        );
        assert!(prompt.messages.iter().any(|m| m["content"] == "hi"));
    }

    #[tokio::test]
    async fn fragments_merge_with_separator() {
        let orch = orchestrator(8000).with_source(Arc::new(FragmentSource));
        let prompt = orch.assemble("q", "sys").await;

        let merged = prompt
            .messages
            .iter()
            .find(|m| {
                m["content"]
                    .as_str()
                    .is_some_and(|c| c.contains("fragment one"))
            })
            .unwrap();
        let content = merged["content"].as_str().unwrap();
        assert!(content.contains("\n---\n"));
        assert!(content.contains("fragment two"));
    }

    #[tokio::test]
    async fn cache_markers_attach_to_system_and_large_retrieval() {
        struct BigRetrieval;

        #[async_trait]
        impl ContextSource for BigRetrieval {
            fn source_name(&self) -> &str {
                "retrieval"
            }

            async fn collect(
                &self,
                _query: &str,
                _token_budget: usize,
                _counter: &dyn TokenCounter,
                _min_relevance: f32,
            ) -> Vec<ContextBlock> {
                vec![
                    ContextBlock::new("big retrieved knowledge", "system", "retrieval")
                        .with_tokens(600),
                ]
            }
        }

        let counter: Arc<dyn TokenCounter> = Arc::new(EstimateCounter::new());
        let budget = Arc::new(AdaptiveBudgetManager::new(Arc::clone(&counter), 8000, 0.25));
        let orch = ContextOrchestrator::new(budget, counter)
            .with_config(OrchestratorConfig {
                cache_markers: true,
                ..OrchestratorConfig::default()
            })
            .with_source(Arc::new(BigRetrieval));

        let prompt = orch.assemble("q", "system prompt").await;
        assert_eq!(prompt.messages[0]["cache_control"]["type"], "ephemeral");
        let retrieval = prompt
            .messages
            .iter()
            .find(|m| {
                m["content"]
                    .as_str()
                    .is_some_and(|c| c.contains("big retrieved"))
            })
            .unwrap();
        assert_eq!(retrieval["cache_control"]["type"], "ephemeral");
    }

    #[tokio::test]
    async fn sources_collected_in_priority_order() {
        // Register in reverse order; INHERITED must still land after
        // user_input in the rendered prompt.
        let orch = orchestrator(8000)
            .with_source(Arc::new(
                StaticSource::new("INHERITED", "system", "inherited note").with_priority(0.4),
            ))
            .with_source(Arc::new(StaticSource::new("user_input", "user", "the question")));
        let prompt = orch.assemble("q", "sys").await;

        let idx_of = |needle: &str| {
            prompt
                .messages
                .iter()
                .position(|m| m["content"].as_str().is_some_and(|c| c.contains(needle)))
                .unwrap()
        };
        assert!(idx_of("the question") < idx_of("inherited note"));
    }
}
