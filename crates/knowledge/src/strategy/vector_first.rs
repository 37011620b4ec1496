//! Vector-first strategy: pure semantic retrieval with a score floor.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mnemo_core::error::RetrievalError;
use tracing::debug;

use crate::model::RetrievalResult;
use crate::retriever::VectorRetriever;
use crate::strategy::{RetrievalStrategy, StrategyKind};

/// Pure vector retrieval. Right fit when the knowledge graph is sparse
/// or absent.
pub struct VectorFirstStrategy {
    vector_retriever: Arc<VectorRetriever>,
    threshold: f32,
}

impl VectorFirstStrategy {
    pub fn new(vector_retriever: Arc<VectorRetriever>, threshold: f32) -> Self {
        Self {
            vector_retriever,
            threshold,
        }
    }
}

#[async_trait]
impl RetrievalStrategy for VectorFirstStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::VectorFirst
    }

    async fn retrieve(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<RetrievalResult, RetrievalError> {
        let results = match self
            .vector_retriever
            .retrieve(query, limit, self.threshold)
            .await
        {
            Ok(results) => results,
            Err(e) => {
                debug!(error = %e, "vector backend failed");
                Vec::new()
            }
        };

        let scores: HashMap<String, f32> =
            results.iter().map(|(c, s)| (c.id.clone(), *s)).collect();
        Ok(RetrievalResult {
            chunks: results.into_iter().map(|(c, _)| c).collect(),
            entities: Vec::new(),
            relations: Vec::new(),
            scores,
        })
    }
}
