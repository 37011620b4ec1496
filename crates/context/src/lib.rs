//! Context assembly for Mnemo: budgets, reranking, and orchestration.
//!
//! Per agent iteration the orchestrator asks the budget manager for
//! per-source token allocations, collects context blocks from every
//! registered source (recent messages, working memory, unified retrieval,
//! inherited context, static payloads), and emits a bounded wire-format
//! message list. The unified retrieval source pipes memory and knowledge
//! base recall through query rewrite → the single multi-signal reranker →
//! budget-aware injection.

pub mod budget;
pub mod candidate;
pub mod injector;
pub mod orchestrator;
pub mod reranker;
pub mod retrieval;
pub mod rewriter;
pub mod source;

pub use budget::{
    AdaptiveBudgetManager, BudgetAllocation, BudgetManager, TaskPhase, TokenBudget,
    phase_allocation_template,
};
pub use candidate::{CandidateOrigin, RetrievalCandidate};
pub use injector::RetrievalInjector;
pub use orchestrator::{AssembledPrompt, ContextOrchestrator, OrchestratorConfig};
pub use reranker::{RankSignal, Reranker, RerankResult};
pub use retrieval::UnifiedRetrievalSource;
pub use rewriter::{QueryRewriter, RewriteResult};
pub use source::{
    ContextSource, ImportantEntriesSource, InheritedContextSource, RecentMessagesSource,
    SharedPool, SharedPoolSource, StaticSource,
};
