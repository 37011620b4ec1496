//! Graph-augmented retrieval for Mnemo.
//!
//! A knowledge base built from three stores — text chunks, entities, and
//! relations — with three retrievers (vector, graph, keyword) and four
//! strategies layered on top:
//!
//! - **graph-first**: structural retrieval with semantic rerank, falling
//!   back to pure vector search when the graph has nothing
//! - **vector-first**: pure semantic similarity with a score floor
//! - **hybrid**: parallel graph + vector fan-out with weighted merge and
//!   one-hop graph expansion from vector hits
//! - **graph-only**: the degradation target when no embedding provider is
//!   configured
//!
//! `GraphRag` wires it all together behind the `KnowledgeBase` trait.

pub mod build;
pub mod graph_rag;
pub mod model;
pub mod retriever;
pub mod store;
pub mod strategy;

pub use build::{IndexBuilder, SimpleEntityExtractor, SlidingWindowChunker};
pub use graph_rag::{GraphRag, RagConfig};
pub use model::{Document, Entity, Relation, RetrievalResult, TextChunk};
pub use retriever::{GraphRetriever, KeywordRetriever, VectorRetriever};
pub use store::{
    ChunkStore, EntityStore, InMemoryChunkStore, InMemoryEntityStore, InMemoryRelationStore,
    RelationDirection, RelationStore,
};
pub use strategy::{
    GraphFirstStrategy, GraphOnlyStrategy, HybridStrategy, RetrievalStrategy, StrategyKind,
    VectorFirstStrategy,
};
