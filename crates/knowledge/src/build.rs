//! Index building: chunking, entity extraction, and store wiring.
//!
//! A deliberately simple pipeline — sliding-window chunking plus a
//! capitalized-token entity heuristic with co-occurrence relations. Both
//! seams are traits so applications can plug in real NLP extractors.

use std::collections::HashSet;
use std::sync::Arc;

use mnemo_core::error::KnowledgeError;
use mnemo_core::provider::EmbeddingProvider;
use tracing::debug;
use uuid::Uuid;

use crate::model::{Document, Entity, Relation, TextChunk};
use crate::store::{ChunkStore, EntityStore, RelationStore};

/// Splits document content into chunks.
pub trait Chunker: Send + Sync {
    fn chunk(&self, document: &Document) -> Vec<TextChunk>;
}

/// Extracts entity names from chunk content.
pub trait EntityExtractor: Send + Sync {
    fn extract(&self, content: &str) -> Vec<String>;
}

/// Character-window chunking with overlap, breaking at whitespace where
/// possible.
pub struct SlidingWindowChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl SlidingWindowChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
        }
    }
}

impl Default for SlidingWindowChunker {
    fn default() -> Self {
        Self::new(512, 64)
    }
}

impl Chunker for SlidingWindowChunker {
    fn chunk(&self, document: &Document) -> Vec<TextChunk> {
        let chars: Vec<char> = document.content.chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut index = 0usize;
        while start < chars.len() {
            let mut end = (start + self.chunk_size).min(chars.len());
            // Prefer a whitespace boundary near the window end
            if end < chars.len() {
                if let Some(back) = chars[start..end]
                    .iter()
                    .rposition(|c| c.is_whitespace())
                {
                    if back > self.chunk_size / 2 {
                        end = start + back;
                    }
                }
            }
            let content: String = chars[start..end].iter().collect();
            let content = content.trim().to_string();
            if !content.is_empty() {
                chunks.push(TextChunk::new(
                    format!("{}_{index}", document.id),
                    content,
                    document.id.clone(),
                ));
                index += 1;
            }
            if end >= chars.len() {
                break;
            }
            start = end.saturating_sub(self.chunk_overlap).max(start + 1);
        }
        chunks
    }
}

/// Capitalized-token entity heuristic.
///
/// A word qualifies when it starts uppercase, is at least 3 characters,
/// and is not sentence-initial noise (single occurrence of a stop-ish
/// word is still accepted — applications needing precision should plug in
/// a real extractor).
pub struct SimpleEntityExtractor {
    min_length: usize,
}

impl SimpleEntityExtractor {
    pub fn new() -> Self {
        Self { min_length: 3 }
    }
}

impl Default for SimpleEntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityExtractor for SimpleEntityExtractor {
    fn extract(&self, content: &str) -> Vec<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();
        for word in content.split(|c: char| !c.is_alphanumeric() && c != '-') {
            if word.chars().count() < self.min_length {
                continue;
            }
            let mut chars = word.chars();
            let first_is_upper = chars.next().is_some_and(|c| c.is_uppercase());
            if !first_is_upper {
                continue;
            }
            if seen.insert(word.to_lowercase()) {
                out.push(word.to_string());
            }
        }
        out
    }
}

/// Wires chunks, entities, relations, and embeddings into the stores.
pub struct IndexBuilder {
    chunk_store: Arc<dyn ChunkStore>,
    entity_store: Arc<dyn EntityStore>,
    relation_store: Arc<dyn RelationStore>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    chunker: Box<dyn Chunker>,
    extractor: Box<dyn EntityExtractor>,
}

impl IndexBuilder {
    pub fn new(
        chunk_store: Arc<dyn ChunkStore>,
        entity_store: Arc<dyn EntityStore>,
        relation_store: Arc<dyn RelationStore>,
    ) -> Self {
        Self {
            chunk_store,
            entity_store,
            relation_store,
            embedding_provider: None,
            chunker: Box::new(SlidingWindowChunker::default()),
            extractor: Box::new(SimpleEntityExtractor::default()),
        }
    }

    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    pub fn with_chunker(mut self, chunker: Box<dyn Chunker>) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_extractor(mut self, extractor: Box<dyn EntityExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Chunk, embed, extract, and store a batch of documents.
    pub async fn add_documents(
        &self,
        documents: Vec<Document>,
        extract_entities: bool,
    ) -> Result<(), KnowledgeError> {
        for document in documents {
            self.add_document(document, extract_entities).await?;
        }
        Ok(())
    }

    pub async fn add_document(
        &self,
        document: Document,
        extract_entities: bool,
    ) -> Result<(), KnowledgeError> {
        let mut chunks = self.chunker.chunk(&document);
        debug!(document = %document.id, chunks = chunks.len(), "indexing document");

        for chunk in &mut chunks {
            if let Some(provider) = &self.embedding_provider {
                match provider.embed(&chunk.content).await {
                    Ok(embedding) => chunk.embedding = Some(embedding),
                    Err(e) => debug!(error = %e, "chunk embedding failed"),
                }
            }

            if extract_entities {
                self.index_entities(chunk).await?;
            }

            self.chunk_store
                .add(chunk.clone())
                .await
                .map_err(|e| KnowledgeError::IndexFailed(e.to_string()))?;
        }
        Ok(())
    }

    /// Extract entities from a chunk, merging with existing ones, and add
    /// co-occurrence relations between entities of the same chunk.
    async fn index_entities(&self, chunk: &mut TextChunk) -> Result<(), KnowledgeError> {
        let names = self.extractor.extract(&chunk.content);
        let mut entity_ids: Vec<String> = Vec::new();

        for name in names {
            let entity = match self.entity_store.get_by_text(&name).await? {
                Some(mut existing) => {
                    existing.frequency += 1;
                    if !existing.chunk_ids.contains(&chunk.id) {
                        existing.chunk_ids.push(chunk.id.clone());
                    }
                    existing
                }
                None => {
                    let mut entity = Entity::new(
                        format!("ent_{}", Uuid::new_v4().simple()),
                        name,
                        "CONCEPT",
                    );
                    entity.chunk_ids.push(chunk.id.clone());
                    entity
                }
            };
            entity_ids.push(entity.id.clone());
            self.entity_store.add(entity).await?;
        }

        // Co-occurrence relations between consecutive entities
        for pair in entity_ids.windows(2) {
            let mut relation = Relation::new(
                format!("rel_{}", Uuid::new_v4().simple()),
                pair[0].clone(),
                pair[1].clone(),
                "co_occurs",
            );
            relation.chunk_id = Some(chunk.id.clone());
            self.relation_store.add(relation).await?;
        }

        chunk.entity_ids = entity_ids;
        Ok(())
    }
}
