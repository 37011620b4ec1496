//! Graph-first strategy: structural retrieval, semantic rerank, vector
//! fallback.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mnemo_core::error::RetrievalError;
use mnemo_core::similarity::cosine_similarity;
use tracing::debug;

use crate::model::{RetrievalResult, TextChunk};
use crate::retriever::{GraphRetriever, VectorRetriever};
use crate::strategy::{RetrievalStrategy, StrategyKind};

/// Graph retrieval with cosine rerank; pure vector retrieval when the
/// graph has nothing for the query.
pub struct GraphFirstStrategy {
    graph_retriever: Arc<GraphRetriever>,
    vector_retriever: Arc<VectorRetriever>,
    n_hop: usize,
}

impl GraphFirstStrategy {
    pub fn new(
        graph_retriever: Arc<GraphRetriever>,
        vector_retriever: Arc<VectorRetriever>,
        n_hop: usize,
    ) -> Self {
        Self {
            graph_retriever,
            vector_retriever,
            n_hop,
        }
    }

    async fn semantic_rerank(
        &self,
        query: &str,
        chunks: Vec<TextChunk>,
    ) -> Vec<(TextChunk, f32)> {
        let query_embedding = match self.vector_retriever.embed_query(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                debug!(error = %e, "query embedding failed, keeping graph order");
                let count = chunks.len();
                return chunks
                    .into_iter()
                    .enumerate()
                    .map(|(i, c)| (c, 1.0 - i as f32 / count as f32))
                    .collect();
            }
        };
        chunks
            .into_iter()
            .map(|chunk| {
                let score = chunk
                    .embedding
                    .as_ref()
                    .map(|e| cosine_similarity(&query_embedding, e))
                    .unwrap_or(0.0);
                (chunk, score)
            })
            .collect()
    }
}

#[async_trait]
impl RetrievalStrategy for GraphFirstStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::GraphFirst
    }

    async fn retrieve(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<RetrievalResult, RetrievalError> {
        // 1. Graph retrieval; a failed graph backend means an empty graph.
        let (entities, relations, graph_chunks) = match self
            .graph_retriever
            .retrieve(query, self.n_hop, limit * 2)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                debug!(error = %e, "graph backend failed");
                (Vec::new(), Vec::new(), Vec::new())
            }
        };

        if graph_chunks.is_empty() {
            // Degrade to pure vector retrieval.
            debug!(retrieval.fallback_to_vector = true, query, "graph empty, using vector");
            let vector_results = match self.vector_retriever.retrieve(query, limit, 0.0).await {
                Ok(results) => results,
                Err(e) => {
                    debug!(error = %e, "vector fallback failed");
                    Vec::new()
                }
            };
            let scores: HashMap<String, f32> = vector_results
                .iter()
                .map(|(c, s)| (c.id.clone(), *s))
                .collect();
            return Ok(RetrievalResult {
                chunks: vector_results.into_iter().map(|(c, _)| c).collect(),
                entities: Vec::new(),
                relations: Vec::new(),
                scores,
            });
        }

        // 2. Semantic rerank of the graph chunks
        let mut scored = self.semantic_rerank(query, graph_chunks).await;
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        let scores: HashMap<String, f32> =
            scored.iter().map(|(c, s)| (c.id.clone(), *s)).collect();
        Ok(RetrievalResult {
            chunks: scored.into_iter().map(|(c, _)| c).collect(),
            entities,
            relations,
            scores,
        })
    }
}
