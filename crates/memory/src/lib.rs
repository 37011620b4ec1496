//! Memory system for Mnemo — the three-tier hierarchy.
//!
//! - **L1** `MessageWindow`: token-budgeted sliding window of chat records
//!   with paired tool-call/tool-result eviction
//! - **L2** `WorkingMemory`: importance-weighted typed entries with TTL
//! - **L3** `MemoryStore` implementations: in-memory, JSONL file, SQLite
//!
//! `MemoryCore` unifies the three layers, owns the L1→L2 promotion gate
//! and the session-end flush, and supports snapshots and parent/child
//! context inheritance. The `Compactor` summarizes the assembled context
//! when usage crosses a threshold.

pub mod compactor;
pub mod core;
pub mod counter;
pub mod filestore;
pub mod memstore;
pub mod segment;
pub mod window;
pub mod working;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use compactor::{CompactionConfig, CompactionStrategy, Compactor, LlmSummarizer, Summarizer};
pub use crate::core::{
    ContextEntry, MemoryCore, MemoryCoreConfig, MemoryLayer, MemorySnapshot, MemoryStats,
    SearchHit,
};
pub use counter::TokenizerCounter;
pub use filestore::FileStore;
pub use memstore::InMemoryStore;
pub use segment::InMemorySegmentStore;
pub use window::MessageWindow;
pub use working::WorkingMemory;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
