//! The unified retrieval source.
//!
//! One pipeline replaces separate semantic-memory and knowledge-base
//! sources: query rewrite → parallel recall from every backend →
//! unified rerank → budget-aware injection. Backends compete in the
//! shared retrieval budget pool; a failing or slow backend contributes
//! nothing while the rest continue.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use mnemo_core::block::ContextBlock;
use mnemo_core::counter::TokenCounter;
use mnemo_core::knowledge::KnowledgeBase;
use mnemo_memory::MemoryCore;
use tracing::debug;

use crate::candidate::RetrievalCandidate;
use crate::injector::RetrievalInjector;
use crate::reranker::Reranker;
use crate::rewriter::QueryRewriter;
use crate::source::ContextSource;

const BACKEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Memory + knowledge retrieval behind a single `ContextSource`.
pub struct UnifiedRetrievalSource {
    memory: Option<Arc<MemoryCore>>,
    knowledge_bases: Vec<Arc<dyn KnowledgeBase>>,
    rewriter: QueryRewriter,
    reranker: Reranker,
    injector: RetrievalInjector,
    recall_limit: usize,
    include_layer_search: bool,
    context_messages: Mutex<Vec<serde_json::Value>>,
}

impl UnifiedRetrievalSource {
    pub fn new() -> Self {
        Self {
            memory: None,
            knowledge_bases: Vec::new(),
            rewriter: QueryRewriter::new(),
            reranker: Reranker::new(),
            injector: RetrievalInjector::new(),
            recall_limit: 20,
            include_layer_search: false,
            context_messages: Mutex::new(Vec::new()),
        }
    }

    /// Attach a memory core for semantic (L4-style) recall.
    pub fn with_memory(mut self, memory: Arc<MemoryCore>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Register a knowledge base.
    pub fn with_knowledge_base(mut self, kb: Arc<dyn KnowledgeBase>) -> Self {
        self.knowledge_bases.push(kb);
        self
    }

    pub fn with_rewriter(mut self, rewriter: QueryRewriter) -> Self {
        self.rewriter = rewriter;
        self
    }

    pub fn with_reranker(mut self, reranker: Reranker) -> Self {
        self.reranker = reranker;
        self
    }

    pub fn with_injector(mut self, injector: RetrievalInjector) -> Self {
        self.injector = injector;
        self
    }

    pub fn with_recall_limit(mut self, recall_limit: usize) -> Self {
        self.recall_limit = recall_limit;
        self
    }

    /// Also recall from the proactive cross-layer search channel.
    pub fn with_layer_search(mut self, enabled: bool) -> Self {
        self.include_layer_search = enabled;
        self
    }

    /// Update the conversation context used for query rewriting. Called
    /// once per iteration before `collect`.
    pub fn set_context_messages(&self, messages: Vec<serde_json::Value>) {
        *self.context_messages.lock().expect("context messages lock") = messages;
    }

    async fn recall_semantic(&self, query: &str, min_relevance: f32) -> Vec<RetrievalCandidate> {
        let Some(memory) = &self.memory else {
            return Vec::new();
        };
        memory
            .search_semantic(query, self.recall_limit, min_relevance)
            .await
            .into_iter()
            .map(|scored| {
                RetrievalCandidate::from_memory_result(
                    scored.record.content.as_text(),
                    scored.score,
                    Some(scored.record.id),
                    None,
                )
            })
            .collect()
    }

    async fn recall_knowledge(&self, query: &str, min_relevance: f32) -> Vec<RetrievalCandidate> {
        let recalls = self.knowledge_bases.iter().map(|kb| {
            let kb = Arc::clone(kb);
            let query = query.to_string();
            async move {
                match tokio::time::timeout(
                    BACKEND_TIMEOUT,
                    kb.query(&query, self.recall_limit, None),
                )
                .await
                {
                    Ok(Ok(items)) => items,
                    Ok(Err(e)) => {
                        debug!(kb = kb.name(), error = %e, "knowledge recall failed");
                        Vec::new()
                    }
                    Err(_) => {
                        debug!(kb = kb.name(), "knowledge recall timed out");
                        Vec::new()
                    }
                }
            }
        });

        join_all(recalls)
            .await
            .into_iter()
            .flatten()
            .filter(|item| item.relevance >= min_relevance)
            .map(|item| {
                RetrievalCandidate::from_knowledge_item(
                    item.id,
                    item.content,
                    item.source,
                    item.relevance,
                    Some(item.metadata),
                )
            })
            .collect()
    }

    async fn recall_layers(&self, query: &str) -> Vec<RetrievalCandidate> {
        let Some(memory) = &self.memory else {
            return Vec::new();
        };
        memory
            .search(query, self.recall_limit)
            .await
            .into_iter()
            .map(|hit| {
                let layer = format!("{:?}", hit.layer).to_lowercase();
                RetrievalCandidate::from_layer_hit(hit.id, hit.content, hit.score, &layer)
            })
            .collect()
    }
}

impl Default for UnifiedRetrievalSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContextSource for UnifiedRetrievalSource {
    fn source_name(&self) -> &str {
        "retrieval"
    }

    async fn collect(
        &self,
        query: &str,
        token_budget: usize,
        counter: &dyn TokenCounter,
        min_relevance: f32,
    ) -> Vec<ContextBlock> {
        if query.is_empty() {
            return Vec::new();
        }
        if self.memory.is_none() && self.knowledge_bases.is_empty() {
            return Vec::new();
        }

        // 1. Query rewrite from recent conversation
        let context = self
            .context_messages
            .lock()
            .expect("context messages lock")
            .clone();
        let rewrite = self.rewriter.rewrite(query, &context);
        let enriched = &rewrite.rewritten;

        // 2. Parallel recall across backends
        let (mut candidates, rag, layers) = tokio::join!(
            self.recall_semantic(enriched, min_relevance),
            self.recall_knowledge(enriched, min_relevance),
            async {
                if self.include_layer_search {
                    self.recall_layers(query).await
                } else {
                    Vec::new()
                }
            },
        );
        candidates.extend(rag);
        candidates.extend(layers);

        if candidates.is_empty() {
            return Vec::new();
        }

        // 3. Unified rerank, overlap computed against the original query
        let result = self
            .reranker
            .rerank(candidates, query, self.recall_limit)
            .await;
        debug!(
            recalled = result.total_recalled,
            deduped = result.duplicates_removed,
            survivors = result.candidates.len(),
            elapsed_ms = result.elapsed_ms,
            keywords = ?rewrite.keywords,
            "unified retrieval"
        );

        if result.candidates.is_empty() {
            return Vec::new();
        }

        // 4. Budget-aware injection
        self.injector
            .inject(&result.candidates, token_budget, counter)
    }
}
