//! # Mnemo Core
//!
//! Domain types, traits, and error definitions for the Mnemo memory and
//! context assembly engine. This crate has **zero sibling dependencies** —
//! it defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every pluggable capability is defined as a trait here: token counting,
//! the L3 persistent store, segment storage, LLM/embedding providers, and
//! knowledge bases. Implementations live in their respective crates. This
//! enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod block;
pub mod counter;
pub mod entry;
pub mod error;
pub mod knowledge;
pub mod message;
pub mod provider;
pub mod similarity;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use block::ContextBlock;
pub use counter::{EstimateCounter, MESSAGE_OVERHEAD_TOKENS, TokenCounter};
pub use entry::{EntryType, PersistentRecord, WorkingEntry};
pub use error::{Error, KnowledgeError, MemoryError, Result, RetrievalError};
pub use knowledge::{KnowledgeBase, KnowledgeItem};
pub use message::{Content, MessageRecord, Role, ToolCallDescriptor};
pub use provider::{
    ChatRequest, ChatResponse, EmbeddingProvider, Provider, StreamChunk, Usage,
};
pub use similarity::cosine_similarity;
pub use store::{MemorySegment, MemoryStore, ScoredRecord, SegmentStore};
