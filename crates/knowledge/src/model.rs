//! Graph-RAG data model: documents, chunks, entities, relations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A source document before chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: serde_json::Map::new(),
        }
    }
}

/// A text chunk — the basic retrieval unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChunk {
    /// Unique identifier
    pub id: String,

    /// The text content
    pub content: String,

    /// Owning document
    pub document_id: String,

    /// Vector representation, when embedded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Entities mentioned in this chunk
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entity_ids: Vec<String>,

    /// Extracted keywords
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl TextChunk {
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        document_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            document_id: document_id.into(),
            embedding: None,
            entity_ids: Vec::new(),
            keywords: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }
}

/// A knowledge-graph entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier
    pub id: String,

    /// Entity text (name)
    pub text: String,

    /// Entity type tag (PERSON, ORG, CONCEPT, ...)
    pub entity_type: String,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Chunks this entity appears in
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunk_ids: Vec<String>,

    /// Occurrence frequency
    #[serde(default = "one")]
    pub frequency: u64,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

fn one() -> u64 {
    1
}

impl Entity {
    pub fn new(id: impl Into<String>, text: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            entity_type: entity_type.into(),
            description: None,
            chunk_ids: Vec::new(),
            frequency: 1,
            metadata: serde_json::Map::new(),
        }
    }
}

/// A knowledge-graph relation between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    /// Unique identifier
    pub id: String,

    /// Source entity
    pub source_id: String,

    /// Target entity
    pub target_id: String,

    /// Relation type tag
    pub relation_type: String,

    /// Relation weight
    #[serde(default = "unit_weight")]
    pub weight: f32,

    /// Chunk this relation was extracted from, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

fn unit_weight() -> f32 {
    1.0
}

impl Relation {
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relation_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            relation_type: relation_type.into(),
            weight: 1.0,
            chunk_id: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Whether source and target are the same entity.
    pub fn is_self_loop(&self) -> bool {
        self.source_id == self.target_id
    }
}

/// The uniform output of every retrieval strategy.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub chunks: Vec<TextChunk>,
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
    /// chunk_id → relevance score
    pub scores: HashMap<String, f32>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The highest-scoring `n` chunks.
    pub fn top_chunks(&self, n: usize) -> Vec<&TextChunk> {
        let mut sorted: Vec<&TextChunk> = self.chunks.iter().collect();
        sorted.sort_by(|a, b| {
            let sa = self.scores.get(&a.id).copied().unwrap_or(0.0);
            let sb = self.scores.get(&b.id).copied().unwrap_or(0.0);
            sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
        });
        sorted.truncate(n);
        sorted
    }
}
