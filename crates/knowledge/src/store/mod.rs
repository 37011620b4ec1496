//! Storage layer for the knowledge graph: chunks, entities, relations.
//!
//! Each store is a trait plus an in-memory implementation. Entity and
//! relation stores keep adjacency indexes so graph traversal never scans.

mod chunk;
mod entity;
mod relation;

pub use chunk::{ChunkStore, InMemoryChunkStore};
pub use entity::{EntityStore, InMemoryEntityStore};
pub use relation::{InMemoryRelationStore, RelationDirection, RelationStore};
