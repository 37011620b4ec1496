//! The uniform retrieval candidate envelope.
//!
//! Memory hits and knowledge items are normalized into the same shape so
//! the reranker can order and dedupe across sources. The fingerprint is a
//! truncated MD5 of the lowercased, whitespace-collapsed content.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a candidate was recalled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOrigin {
    L4Semantic,
    RagKnowledge,
    /// L1/L2/L3 proactive search channel
    Memory,
}

impl CandidateOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateOrigin::L4Semantic => "l4_semantic",
            CandidateOrigin::RagKnowledge => "rag_knowledge",
            CandidateOrigin::Memory => "memory",
        }
    }
}

/// A retrieval candidate awaiting rerank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    pub id: String,
    pub content: String,
    pub origin: CandidateOrigin,

    /// Raw score from the source backend
    pub vector_score: f32,

    /// Composite score, filled by the reranker
    pub final_score: f32,

    /// Per-signal subscores, filled by the reranker
    #[serde(default)]
    pub signal_scores: HashMap<String, f32>,

    /// Source labels and provenance
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Content fingerprint used for deduplication
    pub fingerprint: String,
}

fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    format!("{digest:x}")
}

impl RetrievalCandidate {
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        origin: CandidateOrigin,
        vector_score: f32,
    ) -> Self {
        let content = content.into();
        let fingerprint = Self::compute_fingerprint(&content);
        Self {
            id: id.into(),
            content,
            origin,
            vector_score,
            final_score: 0.0,
            signal_scores: HashMap::new(),
            metadata: serde_json::Map::new(),
            fingerprint,
        }
    }

    /// Lowercase, collapse whitespace, hash, truncate to 12 hex chars.
    pub fn compute_fingerprint(content: &str) -> String {
        let normalized = content
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let mut hex = md5_hex(&normalized);
        hex.truncate(12);
        hex
    }

    /// Adapter for L4 semantic memory results.
    pub fn from_memory_result(
        content: impl Into<String>,
        score: f32,
        memory_id: Option<String>,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Self {
        let content = content.into();
        let id = memory_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("l4_{}", &md5_hex(&content)[..8]));
        let mut candidate = Self::new(id, content, CandidateOrigin::L4Semantic, score);
        if let Some(meta) = metadata {
            candidate.metadata = meta;
        }
        candidate
    }

    /// Adapter for knowledge base items.
    pub fn from_knowledge_item(
        item_id: impl Into<String>,
        content: impl Into<String>,
        source: impl Into<String>,
        relevance: f32,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Self {
        let mut candidate =
            Self::new(item_id, content, CandidateOrigin::RagKnowledge, relevance);
        if let Some(meta) = metadata {
            candidate.metadata = meta;
        }
        candidate
            .metadata
            .insert("knowledge_source".into(), serde_json::json!(source.into()));
        candidate
    }

    /// Adapter for proactive L1/L2/L3 layer search hits.
    pub fn from_layer_hit(
        id: impl Into<String>,
        content: impl Into<String>,
        score: f32,
        layer: &str,
    ) -> Self {
        let mut candidate = Self::new(id, content, CandidateOrigin::Memory, score);
        candidate
            .metadata
            .insert("layer".into(), serde_json::json!(layer));
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_normalizes_case_and_whitespace() {
        let a = RetrievalCandidate::compute_fingerprint("Hello   World");
        let b = RetrievalCandidate::compute_fingerprint("hello world");
        let c = RetrievalCandidate::compute_fingerprint("  HELLO\tWORLD  ");
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.len(), 12);
    }

    #[test]
    fn different_content_differs() {
        let a = RetrievalCandidate::compute_fingerprint("alpha");
        let b = RetrievalCandidate::compute_fingerprint("beta");
        assert_ne!(a, b);
    }

    #[test]
    fn memory_adapter_generates_id_when_absent() {
        let c = RetrievalCandidate::from_memory_result("some content", 0.8, None, None);
        assert!(c.id.starts_with("l4_"));
        assert_eq!(c.origin, CandidateOrigin::L4Semantic);
        assert!((c.vector_score - 0.8).abs() < f32::EPSILON);

        let c = RetrievalCandidate::from_memory_result(
            "some content",
            0.8,
            Some("mem-1".into()),
            None,
        );
        assert_eq!(c.id, "mem-1");
    }

    #[test]
    fn knowledge_adapter_records_source() {
        let c = RetrievalCandidate::from_knowledge_item("k1", "content", "product_docs", 0.9, None);
        assert_eq!(c.origin, CandidateOrigin::RagKnowledge);
        assert_eq!(c.metadata["knowledge_source"], "product_docs");
    }

    #[test]
    fn layer_adapter_tags_layer() {
        let c = RetrievalCandidate::from_layer_hit("m1", "content", 0.5, "l2");
        assert_eq!(c.origin, CandidateOrigin::Memory);
        assert_eq!(c.metadata["layer"], "l2");
    }
}
