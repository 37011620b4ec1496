//! Retrieval strategies — uniform `RetrievalResult` over the backends.
//!
//! Backend failures never propagate out of a strategy: the failing side
//! contributes an empty result (logged at debug) and the rest continues.

mod graph_first;
mod graph_only;
mod hybrid;
mod vector_first;

use async_trait::async_trait;
use mnemo_core::error::RetrievalError;
use serde::{Deserialize, Serialize};

use crate::model::RetrievalResult;

pub use graph_first::GraphFirstStrategy;
pub use graph_only::GraphOnlyStrategy;
pub use hybrid::HybridStrategy;
pub use vector_first::VectorFirstStrategy;

/// Which strategy is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    GraphFirst,
    VectorFirst,
    Hybrid,
    /// Internal fallback when no embedding provider is configured
    GraphOnly,
}

/// A retrieval strategy over the knowledge stores.
#[async_trait]
pub trait RetrievalStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn retrieve(&self, query: &str, limit: usize)
    -> Result<RetrievalResult, RetrievalError>;
}
