//! The unified reranker — the only one in the system.
//!
//! Every retrieval path funnels through here before injection. The
//! pipeline is: fingerprint dedup (keep the higher raw score) → weighted
//! multi-signal scoring → floor filter → stable sort → top-k. A tie on
//! final score resolves to the earliest-added candidate.
//!
//! Signals are objects exposing `(name, weight, score)`; adding a signal
//! is inserting one object into the list.

use std::collections::HashMap;
use std::time::Instant;

use tracing::debug;

use crate::candidate::{CandidateOrigin, RetrievalCandidate};
use crate::rewriter::extract_words;

/// The scoring context a signal sees: the query's tokens and the origin
/// distribution of candidates scored so far.
pub struct RankContext {
    pub query_tokens: Vec<String>,
    pub origin_counts: HashMap<CandidateOrigin, usize>,
    pub pool_size: usize,
}

/// A rerank scoring signal.
pub trait RankSignal: Send + Sync {
    fn name(&self) -> &'static str;
    fn weight(&self) -> f32;
    fn score(&self, candidate: &RetrievalCandidate, ctx: &RankContext) -> f32;
}

/// The candidate's raw backend score, clamped to [0, 1].
struct VectorScoreSignal;

impl RankSignal for VectorScoreSignal {
    fn name(&self) -> &'static str {
        "vector_score"
    }

    fn weight(&self) -> f32 {
        0.40
    }

    fn score(&self, candidate: &RetrievalCandidate, _ctx: &RankContext) -> f32 {
        candidate.vector_score.clamp(0.0, 1.0)
    }
}

/// Fraction of query tokens present in the content; 0.5 when the query
/// has no usable tokens.
struct QueryOverlapSignal;

impl RankSignal for QueryOverlapSignal {
    fn name(&self) -> &'static str {
        "query_overlap"
    }

    fn weight(&self) -> f32 {
        0.35
    }

    fn score(&self, candidate: &RetrievalCandidate, ctx: &RankContext) -> f32 {
        if ctx.query_tokens.is_empty() {
            return 0.5;
        }
        let content = candidate.content.to_lowercase();
        let present = ctx
            .query_tokens
            .iter()
            .filter(|token| content.contains(token.as_str()))
            .count();
        present as f32 / ctx.query_tokens.len() as f32
    }
}

/// Penalizes candidates whose origin already dominates the pool scored
/// so far: 0.3 above 70% share, 0.6 above 50%, else 0.9 (0.8 on an empty
/// pool).
struct OriginDiversitySignal;

impl RankSignal for OriginDiversitySignal {
    fn name(&self) -> &'static str {
        "origin_diversity"
    }

    fn weight(&self) -> f32 {
        0.15
    }

    fn score(&self, candidate: &RetrievalCandidate, ctx: &RankContext) -> f32 {
        if ctx.pool_size == 0 {
            return 0.8;
        }
        let share = ctx
            .origin_counts
            .get(&candidate.origin)
            .copied()
            .unwrap_or(0) as f32
            / ctx.pool_size as f32;
        if share > 0.7 {
            0.3
        } else if share > 0.5 {
            0.6
        } else {
            0.9
        }
    }
}

/// Bell-shaped length preference peaking at 200–800 characters, with
/// penalties for very short (<50) and very long (>2000) content.
struct ContentLengthSignal;

impl RankSignal for ContentLengthSignal {
    fn name(&self) -> &'static str {
        "content_length"
    }

    fn weight(&self) -> f32 {
        0.10
    }

    fn score(&self, candidate: &RetrievalCandidate, _ctx: &RankContext) -> f32 {
        let len = candidate.content.chars().count();
        match len {
            0..=49 => 0.2,
            50..=199 => 0.6,
            200..=800 => 1.0,
            801..=2000 => 0.6,
            _ => 0.2,
        }
    }
}

/// The rerank outcome.
#[derive(Debug, Clone, Default)]
pub struct RerankResult {
    pub candidates: Vec<RetrievalCandidate>,
    pub total_recalled: usize,
    pub duplicates_removed: usize,
    pub elapsed_ms: f64,
}

impl RerankResult {
    pub fn top(&self) -> Option<&RetrievalCandidate> {
        self.candidates.first()
    }
}

/// The unified multi-signal reranker. Stateless; share freely.
pub struct Reranker {
    signals: Vec<Box<dyn RankSignal>>,
    min_score_threshold: f32,
    dedup: bool,
}

impl Reranker {
    pub fn new() -> Self {
        Self {
            signals: vec![
                Box::new(VectorScoreSignal),
                Box::new(QueryOverlapSignal),
                Box::new(OriginDiversitySignal),
                Box::new(ContentLengthSignal),
            ],
            min_score_threshold: 0.1,
            dedup: true,
        }
    }

    pub fn with_min_score(mut self, min_score_threshold: f32) -> Self {
        self.min_score_threshold = min_score_threshold;
        self
    }

    pub fn with_dedup(mut self, dedup: bool) -> Self {
        self.dedup = dedup;
        self
    }

    /// Add a custom signal.
    pub fn with_signal(mut self, signal: Box<dyn RankSignal>) -> Self {
        self.signals.push(signal);
        self
    }

    /// Rerank candidates for a query, returning at most `top_k`.
    pub async fn rerank(
        &self,
        candidates: Vec<RetrievalCandidate>,
        query: &str,
        top_k: usize,
    ) -> RerankResult {
        let started = Instant::now();
        let total_recalled = candidates.len();

        // 1. Fingerprint dedup, keeping the higher raw score
        let (mut pool, duplicates_removed) = if self.dedup {
            self.dedup_by_fingerprint(candidates)
        } else {
            (candidates, 0)
        };

        // 2. Weighted multi-signal scoring; origin distribution builds as
        // the pool is scored, so earlier candidates shape later diversity.
        let mut ctx = RankContext {
            query_tokens: extract_words(query)
                .into_iter()
                .map(|w| w.to_lowercase())
                .collect(),
            origin_counts: HashMap::new(),
            pool_size: 0,
        };
        let total_weight: f32 = self.signals.iter().map(|s| s.weight()).sum();
        for candidate in &mut pool {
            let mut weighted = 0.0f32;
            for signal in &self.signals {
                let score = signal.score(candidate, &ctx);
                candidate.signal_scores.insert(signal.name().into(), score);
                weighted += score * signal.weight();
            }
            candidate.final_score = if total_weight > 0.0 {
                weighted / total_weight
            } else {
                0.0
            };
            *ctx.origin_counts.entry(candidate.origin).or_insert(0) += 1;
            ctx.pool_size += 1;
        }

        // 3. Floor filter
        pool.retain(|c| c.final_score >= self.min_score_threshold);

        // 4. Stable sort (ties keep earliest-added order) and truncate
        pool.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        pool.truncate(top_k);

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(
            total_recalled,
            duplicates_removed,
            survivors = pool.len(),
            elapsed_ms,
            "rerank"
        );

        RerankResult {
            candidates: pool,
            total_recalled,
            duplicates_removed,
            elapsed_ms,
        }
    }

    fn dedup_by_fingerprint(
        &self,
        candidates: Vec<RetrievalCandidate>,
    ) -> (Vec<RetrievalCandidate>, usize) {
        let mut kept: Vec<RetrievalCandidate> = Vec::with_capacity(candidates.len());
        let mut index_by_fingerprint: HashMap<String, usize> = HashMap::new();
        let mut removed = 0usize;

        for candidate in candidates {
            match index_by_fingerprint.get(&candidate.fingerprint) {
                Some(&idx) => {
                    removed += 1;
                    if candidate.vector_score > kept[idx].vector_score {
                        kept[idx] = candidate;
                    }
                }
                None => {
                    index_by_fingerprint.insert(candidate.fingerprint.clone(), kept.len());
                    kept.push(candidate);
                }
            }
        }
        (kept, removed)
    }
}

impl Default for Reranker {
    fn default() -> Self {
        Self::new()
    }
}
