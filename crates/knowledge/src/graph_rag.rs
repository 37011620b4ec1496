//! `GraphRag` — the graph-augmented knowledge base.
//!
//! Implements the `KnowledgeBase` trait over a retrieval strategy and the
//! three stores, with a `from_config` factory that degrades gracefully
//! when capabilities are missing: a strategy that needs embeddings falls
//! back to graph-only when no provider is configured (never an error).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mnemo_core::error::KnowledgeError;
use mnemo_core::knowledge::{KnowledgeBase, KnowledgeItem};
use mnemo_core::provider::EmbeddingProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::build::IndexBuilder;
use crate::model::Document;
use crate::retriever::{GraphRetriever, VectorRetriever};
use crate::store::{
    ChunkStore, EntityStore, InMemoryChunkStore, InMemoryEntityStore, InMemoryRelationStore,
    RelationStore,
};
use crate::strategy::{
    GraphFirstStrategy, GraphOnlyStrategy, HybridStrategy, RetrievalStrategy, StrategyKind,
    VectorFirstStrategy,
};

/// Configuration for a `GraphRag` knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Knowledge base name (shown in context labels)
    pub name: String,

    /// Which strategy to run
    pub strategy: StrategyKind,

    /// Graph traversal depth
    pub n_hop: usize,

    /// Hybrid merge weights
    pub graph_weight: f32,
    pub vector_weight: f32,
    pub expansion_weight: f32,

    /// Expansion chunks per query
    pub max_expansion: usize,

    /// Vector-first score floor
    pub vector_threshold: f32,

    /// Seed entities matched per graph query
    pub seed_limit: usize,

    /// Chunking parameters
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            name: "graph_rag".into(),
            strategy: StrategyKind::GraphFirst,
            n_hop: 2,
            graph_weight: 0.5,
            vector_weight: 0.5,
            expansion_weight: 0.3,
            max_expansion: 10,
            vector_threshold: 0.0,
            seed_limit: 5,
            chunk_size: 512,
            chunk_overlap: 64,
        }
    }
}

/// A graph-augmented RAG knowledge base.
pub struct GraphRag {
    name: String,
    strategy: Arc<dyn RetrievalStrategy>,
    chunk_store: Arc<dyn ChunkStore>,
    index_builder: IndexBuilder,
}

impl GraphRag {
    /// Build a knowledge base from configuration with in-memory stores.
    ///
    /// Strategy selection degrades by capability: a strategy needing
    /// embeddings without a provider becomes graph-only (logged at info).
    pub fn from_config(
        config: RagConfig,
        embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Self {
        let chunk_store: Arc<dyn ChunkStore> = Arc::new(InMemoryChunkStore::new());
        let entity_store: Arc<dyn EntityStore> = Arc::new(InMemoryEntityStore::new());
        let relation_store: Arc<dyn RelationStore> = Arc::new(InMemoryRelationStore::new());
        Self::with_stores(config, embedding_provider, chunk_store, entity_store, relation_store)
    }

    /// Build over caller-supplied stores.
    pub fn with_stores(
        config: RagConfig,
        embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
        chunk_store: Arc<dyn ChunkStore>,
        entity_store: Arc<dyn EntityStore>,
        relation_store: Arc<dyn RelationStore>,
    ) -> Self {
        let graph_retriever = Arc::new(
            GraphRetriever::new(
                entity_store.clone(),
                relation_store.clone(),
                chunk_store.clone(),
            )
            .with_seed_limit(config.seed_limit),
        );

        let vector_retriever = embedding_provider.clone().map(|provider| {
            Arc::new(VectorRetriever::new(chunk_store.clone(), provider))
        });

        let strategy = Self::select_strategy(
            &config,
            graph_retriever,
            vector_retriever,
            entity_store.clone(),
            relation_store.clone(),
            chunk_store.clone(),
        );

        let mut index_builder = IndexBuilder::new(
            chunk_store.clone(),
            entity_store,
            relation_store,
        )
        .with_chunker(Box::new(crate::build::SlidingWindowChunker::new(
            config.chunk_size,
            config.chunk_overlap,
        )));
        if let Some(provider) = embedding_provider {
            index_builder = index_builder.with_embedding_provider(provider);
        }

        Self {
            name: config.name,
            strategy,
            chunk_store,
            index_builder,
        }
    }

    fn select_strategy(
        config: &RagConfig,
        graph_retriever: Arc<GraphRetriever>,
        vector_retriever: Option<Arc<VectorRetriever>>,
        entity_store: Arc<dyn EntityStore>,
        relation_store: Arc<dyn RelationStore>,
        chunk_store: Arc<dyn ChunkStore>,
    ) -> Arc<dyn RetrievalStrategy> {
        let Some(vector_retriever) = vector_retriever else {
            if config.strategy != StrategyKind::GraphOnly {
                info!(
                    requested = ?config.strategy,
                    "no embedding provider configured, degrading to graph-only retrieval"
                );
            }
            return Arc::new(GraphOnlyStrategy::new(graph_retriever, config.n_hop));
        };

        match config.strategy {
            StrategyKind::VectorFirst => Arc::new(VectorFirstStrategy::new(
                vector_retriever,
                config.vector_threshold,
            )),
            StrategyKind::Hybrid => Arc::new(
                HybridStrategy::new(
                    graph_retriever,
                    vector_retriever,
                    entity_store,
                    relation_store,
                    chunk_store,
                    config.n_hop,
                    config.graph_weight,
                    config.vector_weight,
                    config.expansion_weight,
                )
                .with_max_expansion(config.max_expansion),
            ),
            StrategyKind::GraphOnly => {
                Arc::new(GraphOnlyStrategy::new(graph_retriever, config.n_hop))
            }
            StrategyKind::GraphFirst => Arc::new(GraphFirstStrategy::new(
                graph_retriever,
                vector_retriever,
                config.n_hop,
            )),
        }
    }

    /// The active strategy kind (after degradation).
    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// Index documents into the knowledge base.
    pub async fn add_documents(
        &self,
        documents: Vec<Document>,
        extract_entities: bool,
    ) -> Result<(), KnowledgeError> {
        self.index_builder
            .add_documents(documents, extract_entities)
            .await
    }

    /// Convenience: index raw texts as one document each.
    pub async fn add_texts(&self, texts: Vec<String>) -> Result<(), KnowledgeError> {
        let documents = texts
            .into_iter()
            .map(|text| Document::new(format!("doc_{}", uuid::Uuid::new_v4().simple()), text))
            .collect();
        self.add_documents(documents, true).await
    }
}

#[async_trait]
impl KnowledgeBase for GraphRag {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Graph-augmented document knowledge base"
    }

    fn search_hints(&self) -> Vec<String> {
        vec!["entity names".into(), "topic phrases".into()]
    }

    async fn query(
        &self,
        query: &str,
        limit: usize,
        _filters: Option<&HashMap<String, String>>,
    ) -> Result<Vec<KnowledgeItem>, KnowledgeError> {
        let result = self
            .strategy
            .retrieve(query, limit)
            .await
            .map_err(|e| KnowledgeError::QueryFailed {
                name: self.name.clone(),
                reason: e.to_string(),
            })?;

        debug!(
            query,
            chunks = result.chunks.len(),
            entities = result.entities.len(),
            "knowledge base query"
        );

        Ok(result
            .chunks
            .iter()
            .map(|chunk| {
                let score = result.scores.get(&chunk.id).copied().unwrap_or(0.0);
                let mut metadata = chunk.metadata.clone();
                metadata.insert("entity_ids".into(), serde_json::json!(chunk.entity_ids));
                metadata.insert("keywords".into(), serde_json::json!(chunk.keywords));
                KnowledgeItem {
                    id: chunk.id.clone(),
                    content: chunk.content.clone(),
                    source: chunk.document_id.clone(),
                    relevance: score,
                    metadata,
                }
            })
            .collect())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<KnowledgeItem>, KnowledgeError> {
        let chunk = self.chunk_store.get(id).await?;
        Ok(chunk.map(|chunk| KnowledgeItem {
            id: chunk.id,
            content: chunk.content,
            source: chunk.document_id,
            relevance: 0.0,
            metadata: chunk.metadata,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mnemo_core::error::MemoryError;

    struct ClassEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ClassEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
            let mut v = vec![0.0f32; 8];
            for c in text.to_lowercase().chars().filter(|c| c.is_alphanumeric()) {
                v[(c as usize) % 8] += 1.0;
            }
            Ok(v)
        }
    }

    #[tokio::test]
    async fn degrades_to_graph_only_without_embeddings() {
        for requested in [StrategyKind::GraphFirst, StrategyKind::VectorFirst, StrategyKind::Hybrid]
        {
            let kb = GraphRag::from_config(
                RagConfig {
                    strategy: requested,
                    ..RagConfig::default()
                },
                None,
            );
            assert_eq!(kb.strategy_kind(), StrategyKind::GraphOnly);
        }
    }

    #[tokio::test]
    async fn honors_configuration_with_embeddings() {
        let kb = GraphRag::from_config(
            RagConfig {
                strategy: StrategyKind::Hybrid,
                ..RagConfig::default()
            },
            Some(Arc::new(ClassEmbedder)),
        );
        assert_eq!(kb.strategy_kind(), StrategyKind::Hybrid);
    }

    #[tokio::test]
    async fn index_then_query_roundtrip() {
        let kb = GraphRag::from_config(RagConfig::default(), Some(Arc::new(ClassEmbedder)));
        kb.add_documents(
            vec![Document::new(
                "doc1",
                "Tokio is the async runtime most Rust services build on",
            )],
            true,
        )
        .await
        .unwrap();

        let items = kb.query("Tokio", 5, None).await.unwrap();
        assert!(!items.is_empty());
        assert!(items[0].content.contains("Tokio"));
        assert_eq!(items[0].source, "doc1");
        assert!(items[0].metadata.contains_key("entity_ids"));
    }

    #[tokio::test]
    async fn get_by_id_finds_chunk() {
        let kb = GraphRag::from_config(RagConfig::default(), None);
        kb.add_documents(vec![Document::new("doc1", "short content")], false)
            .await
            .unwrap();

        let item = kb.get_by_id("doc1_0").await.unwrap();
        assert!(item.is_some());
        assert_eq!(item.unwrap().content, "short content");
        assert!(kb.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_query_is_empty_not_error() {
        let kb = GraphRag::from_config(RagConfig::default(), None);
        let items = kb.query("nothing indexed", 5, None).await.unwrap();
        assert!(items.is_empty());
    }
}
