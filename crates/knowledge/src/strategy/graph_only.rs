//! Graph-only strategy — the degradation target when no embedding
//! provider is configured. Scores are assigned by reverse rank.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mnemo_core::error::RetrievalError;
use tracing::debug;

use crate::model::RetrievalResult;
use crate::retriever::GraphRetriever;
use crate::strategy::{RetrievalStrategy, StrategyKind};

pub struct GraphOnlyStrategy {
    graph_retriever: Arc<GraphRetriever>,
    n_hop: usize,
}

impl GraphOnlyStrategy {
    pub fn new(graph_retriever: Arc<GraphRetriever>, n_hop: usize) -> Self {
        Self {
            graph_retriever,
            n_hop,
        }
    }
}

#[async_trait]
impl RetrievalStrategy for GraphOnlyStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::GraphOnly
    }

    async fn retrieve(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<RetrievalResult, RetrievalError> {
        let (entities, relations, chunks) = match self
            .graph_retriever
            .retrieve(query, self.n_hop, limit)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                debug!(error = %e, "graph backend failed");
                (Vec::new(), Vec::new(), Vec::new())
            }
        };

        let count = chunks.len();
        let scores: HashMap<String, f32> = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), 1.0 - i as f32 / count as f32))
            .collect();

        Ok(RetrievalResult {
            chunks,
            entities,
            relations,
            scores,
        })
    }
}
