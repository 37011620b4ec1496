//! Budget-aware injection of reranked candidates into context blocks.
//!
//! Candidates arrive sorted (high score first). Each is priced via the
//! token counter; one that would overflow the remaining budget is
//! skipped so the next, shorter candidate may still fit. Score decides
//! priority: promoted candidates inject at working-set priority, the
//! rest at background priority.

use mnemo_core::block::ContextBlock;
use mnemo_core::counter::TokenCounter;
use mnemo_core::message::MessageRecord;

use crate::candidate::{CandidateOrigin, RetrievalCandidate};

/// Converts surviving candidates into token-priced context blocks.
pub struct RetrievalInjector {
    promote_threshold: f32,
    high_priority: f64,
    low_priority: f64,
}

impl RetrievalInjector {
    pub fn new() -> Self {
        Self {
            promote_threshold: 0.7,
            high_priority: 0.75,
            low_priority: 0.35,
        }
    }

    pub fn with_promote_threshold(mut self, threshold: f32) -> Self {
        self.promote_threshold = threshold;
        self
    }

    pub fn with_priorities(mut self, high: f64, low: f64) -> Self {
        self.high_priority = high;
        self.low_priority = low;
        self
    }

    /// Convert candidates to blocks, spending at most `token_budget`.
    pub fn inject(
        &self,
        candidates: &[RetrievalCandidate],
        token_budget: usize,
        counter: &dyn TokenCounter,
    ) -> Vec<ContextBlock> {
        let mut blocks = Vec::new();
        let mut used = 0usize;

        for candidate in candidates {
            if used >= token_budget {
                break;
            }

            let content = Self::format_content(candidate);
            let tokens = counter.count_message(&MessageRecord::system(content.clone()));
            if used + tokens > token_budget {
                continue; // The next, shorter candidate may still fit.
            }

            let promoted = candidate.final_score >= self.promote_threshold;
            let priority = if promoted {
                self.high_priority
            } else {
                self.low_priority
            };

            let mut block = ContextBlock::new(content, "system", "retrieval")
                .with_tokens(tokens)
                .with_priority(priority);
            block
                .metadata
                .insert("candidate_id".into(), serde_json::json!(candidate.id));
            block
                .metadata
                .insert("origin".into(), serde_json::json!(candidate.origin.as_str()));
            block.metadata.insert(
                "final_score".into(),
                serde_json::json!((candidate.final_score * 10_000.0).round() / 10_000.0),
            );
            block
                .metadata
                .insert("promoted".into(), serde_json::json!(promoted));

            used += tokens;
            blocks.push(block);
        }

        blocks
    }

    /// Prefix content with its source label.
    fn format_content(candidate: &RetrievalCandidate) -> String {
        if candidate.origin == CandidateOrigin::RagKnowledge {
            let source = candidate
                .metadata
                .get("knowledge_source")
                .and_then(|v| v.as_str())
                .unwrap_or("knowledge");
            format!("[Knowledge: {source}] {}", candidate.content)
        } else {
            format!("[Retrieved Memory] {}", candidate.content)
        }
    }
}

impl Default for RetrievalInjector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_core::counter::EstimateCounter;

    fn scored(id: &str, content: &str, final_score: f32) -> RetrievalCandidate {
        let mut c = RetrievalCandidate::new(id, content, CandidateOrigin::L4Semantic, 0.5);
        c.final_score = final_score;
        c
    }

    #[test]
    fn high_score_gets_working_set_priority() {
        let injector = RetrievalInjector::new();
        let counter = EstimateCounter::new();
        let blocks = injector.inject(
            &[scored("a", "promoted content", 0.9), scored("b", "background content", 0.3)],
            1000,
            &counter,
        );

        assert_eq!(blocks.len(), 2);
        assert!((blocks[0].priority - 0.75).abs() < 1e-9);
        assert!((blocks[1].priority - 0.35).abs() < 1e-9);
        assert_eq!(blocks[0].metadata["promoted"], true);
        assert_eq!(blocks[1].metadata["promoted"], false);
    }

    #[test]
    fn knowledge_candidates_get_source_label() {
        let injector = RetrievalInjector::new();
        let counter = EstimateCounter::new();
        let kb = RetrievalCandidate::from_knowledge_item("k1", "doc text", "product_docs", 0.8, None);
        let mem = scored("m1", "memory text", 0.8);

        let blocks = injector.inject(&[kb, mem], 1000, &counter);
        assert!(blocks[0].content.starts_with("[Knowledge: product_docs]"));
        assert!(blocks[1].content.starts_with("[Retrieved Memory]"));
    }

    #[test]
    fn oversized_candidate_skipped_but_shorter_fits() {
        let injector = RetrievalInjector::new();
        let counter = EstimateCounter::new();
        let big = scored("big", &"x".repeat(2000), 0.9); // ~500 tokens
        let small = scored("small", "tiny", 0.8);

        let blocks = injector.inject(&[big, small], 40, &counter);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].metadata["candidate_id"], "small");
    }

    #[test]
    fn budget_is_respected() {
        let injector = RetrievalInjector::new();
        let counter = EstimateCounter::new();
        let candidates: Vec<RetrievalCandidate> = (0..20)
            .map(|i| scored(&format!("c{i}"), &format!("content number {i} with padding"), 0.5))
            .collect();

        let blocks = injector.inject(&candidates, 50, &counter);
        let total: usize = blocks.iter().map(|b| b.token_count).sum();
        assert!(total <= 50);
        assert!(!blocks.is_empty());
    }

    #[test]
    fn zero_budget_yields_nothing() {
        let injector = RetrievalInjector::new();
        let counter = EstimateCounter::new();
        let blocks = injector.inject(&[scored("a", "content", 0.9)], 0, &counter);
        assert!(blocks.is_empty());
    }
}
