//! Knowledge base provider interface (consumed).
//!
//! External knowledge sources — document stores, graph-RAG indexes, APIs —
//! implement this trait and compete for the shared retrieval budget pool.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::KnowledgeError;

/// A knowledge unit returned by a knowledge base query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeItem {
    /// Unique item ID
    pub id: String,

    /// The knowledge content
    pub content: String,

    /// Where this came from (document id, URL, API name)
    pub source: String,

    /// Relevance score in [0, 1]
    #[serde(default)]
    pub relevance: f32,

    /// Additional metadata
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// The knowledge base provider interface.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Identifier name (e.g., "product_docs").
    fn name(&self) -> &str;

    /// Human-readable description of what this base contains.
    fn description(&self) -> &str {
        ""
    }

    /// Hints about what kinds of queries work well.
    fn search_hints(&self) -> Vec<String> {
        Vec::new()
    }

    /// Filter dimensions accepted by `query`.
    fn supported_filters(&self) -> Vec<String> {
        Vec::new()
    }

    /// Query the knowledge base; results ordered by relevance.
    async fn query(
        &self,
        query: &str,
        limit: usize,
        filters: Option<&HashMap<String, String>>,
    ) -> Result<Vec<KnowledgeItem>, KnowledgeError>;

    /// Fetch a single item by id.
    async fn get_by_id(&self, id: &str) -> Result<Option<KnowledgeItem>, KnowledgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBase;

    #[async_trait]
    impl KnowledgeBase for FixedBase {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn query(
            &self,
            query: &str,
            limit: usize,
            _filters: Option<&HashMap<String, String>>,
        ) -> Result<Vec<KnowledgeItem>, KnowledgeError> {
            Ok((0..limit.min(2))
                .map(|i| KnowledgeItem {
                    id: format!("item_{i}"),
                    content: format!("{query} result {i}"),
                    source: "fixed".into(),
                    relevance: 0.9,
                    metadata: serde_json::Map::new(),
                })
                .collect())
        }

        async fn get_by_id(&self, id: &str) -> Result<Option<KnowledgeItem>, KnowledgeError> {
            if id == "item_0" {
                Ok(Some(KnowledgeItem {
                    id: id.into(),
                    content: "stored".into(),
                    source: "fixed".into(),
                    relevance: 0.0,
                    metadata: serde_json::Map::new(),
                }))
            } else {
                Ok(None)
            }
        }
    }

    #[tokio::test]
    async fn query_respects_limit() {
        let base = FixedBase;
        let items = base.query("rust", 1, None).await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].content.contains("rust"));
    }

    #[tokio::test]
    async fn default_metadata_methods() {
        let base = FixedBase;
        assert_eq!(base.description(), "");
        assert!(base.search_hints().is_empty());
        assert!(base.supported_filters().is_empty());
    }
}
