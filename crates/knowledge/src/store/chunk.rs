//! Text chunk storage with vector and keyword search.

use async_trait::async_trait;
use mnemo_core::error::KnowledgeError;
use mnemo_core::similarity::cosine_similarity;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::model::TextChunk;

/// Chunk storage interface.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn add(&self, chunk: TextChunk) -> Result<(), KnowledgeError>;

    async fn add_batch(&self, chunks: Vec<TextChunk>) -> Result<(), KnowledgeError> {
        for chunk in chunks {
            self.add(chunk).await?;
        }
        Ok(())
    }

    async fn get(&self, chunk_id: &str) -> Result<Option<TextChunk>, KnowledgeError>;

    async fn get_by_ids(&self, chunk_ids: &[String]) -> Result<Vec<TextChunk>, KnowledgeError>;

    async fn delete(&self, chunk_id: &str) -> Result<bool, KnowledgeError>;

    async fn clear(&self) -> Result<(), KnowledgeError>;

    /// Cosine-similarity search over stored embeddings.
    async fn search_by_vector(
        &self,
        embedding: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<(TextChunk, f32)>, KnowledgeError>;

    /// Substring match over content or keywords, insertion order.
    async fn search_by_keyword(
        &self,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<TextChunk>, KnowledgeError>;

    /// Chunks associated with an entity.
    async fn get_by_entity(&self, entity_id: &str) -> Result<Vec<TextChunk>, KnowledgeError>;
}

struct ChunkState {
    chunks: Vec<TextChunk>,
    by_id: HashMap<String, usize>,
    entity_index: HashMap<String, HashSet<String>>,
}

/// In-memory chunk store.
pub struct InMemoryChunkStore {
    state: Arc<RwLock<ChunkState>>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ChunkState {
                chunks: Vec::new(),
                by_id: HashMap::new(),
                entity_index: HashMap::new(),
            })),
        }
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.chunks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.chunks.is_empty()
    }
}

impl Default for InMemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn add(&self, chunk: TextChunk) -> Result<(), KnowledgeError> {
        let mut state = self.state.write().await;
        for entity_id in &chunk.entity_ids {
            state
                .entity_index
                .entry(entity_id.clone())
                .or_default()
                .insert(chunk.id.clone());
        }
        if let Some(&idx) = state.by_id.get(&chunk.id) {
            state.chunks[idx] = chunk;
        } else {
            let next = state.chunks.len();
            state.by_id.insert(chunk.id.clone(), next);
            state.chunks.push(chunk);
        }
        Ok(())
    }

    async fn get(&self, chunk_id: &str) -> Result<Option<TextChunk>, KnowledgeError> {
        let state = self.state.read().await;
        Ok(state.by_id.get(chunk_id).map(|&idx| state.chunks[idx].clone()))
    }

    async fn get_by_ids(&self, chunk_ids: &[String]) -> Result<Vec<TextChunk>, KnowledgeError> {
        let state = self.state.read().await;
        Ok(chunk_ids
            .iter()
            .filter_map(|id| state.by_id.get(id).map(|&idx| state.chunks[idx].clone()))
            .collect())
    }

    async fn delete(&self, chunk_id: &str) -> Result<bool, KnowledgeError> {
        let mut state = self.state.write().await;
        let Some(idx) = state.by_id.remove(chunk_id) else {
            return Ok(false);
        };
        let chunk = state.chunks.remove(idx);
        // Rebuild positional index after removal
        let rebuilt: HashMap<String, usize> = state
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
        state.by_id = rebuilt;
        for entity_id in &chunk.entity_ids {
            if let Some(set) = state.entity_index.get_mut(entity_id) {
                set.remove(chunk_id);
            }
        }
        Ok(true)
    }

    async fn clear(&self) -> Result<(), KnowledgeError> {
        let mut state = self.state.write().await;
        state.chunks.clear();
        state.by_id.clear();
        state.entity_index.clear();
        Ok(())
    }

    async fn search_by_vector(
        &self,
        embedding: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<(TextChunk, f32)>, KnowledgeError> {
        let state = self.state.read().await;
        let mut results: Vec<(TextChunk, f32)> = state
            .chunks
            .iter()
            .filter_map(|chunk| {
                let chunk_embedding = chunk.embedding.as_ref()?;
                let score = cosine_similarity(embedding, chunk_embedding);
                (score >= threshold).then(|| (chunk.clone(), score))
            })
            .collect();
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }

    async fn search_by_keyword(
        &self,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<TextChunk>, KnowledgeError> {
        let keyword_lower = keyword.to_lowercase();
        let state = self.state.read().await;
        Ok(state
            .chunks
            .iter()
            .filter(|chunk| {
                chunk.content.to_lowercase().contains(&keyword_lower)
                    || chunk
                        .keywords
                        .iter()
                        .any(|kw| kw.to_lowercase().contains(&keyword_lower))
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_by_entity(&self, entity_id: &str) -> Result<Vec<TextChunk>, KnowledgeError> {
        let ids: Vec<String> = {
            let state = self.state.read().await;
            state
                .entity_index
                .get(entity_id)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default()
        };
        self.get_by_ids(&ids).await
    }
}
