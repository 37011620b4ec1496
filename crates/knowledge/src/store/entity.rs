//! Entity storage with text and chunk indexes.

use async_trait::async_trait;
use mnemo_core::error::KnowledgeError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::model::Entity;

/// Entity storage interface.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn add(&self, entity: Entity) -> Result<(), KnowledgeError>;

    async fn add_batch(&self, entities: Vec<Entity>) -> Result<(), KnowledgeError> {
        for entity in entities {
            self.add(entity).await?;
        }
        Ok(())
    }

    async fn get(&self, entity_id: &str) -> Result<Option<Entity>, KnowledgeError>;

    async fn get_by_ids(&self, entity_ids: &[String]) -> Result<Vec<Entity>, KnowledgeError>;

    /// Exact-name lookup (case-insensitive).
    async fn get_by_text(&self, text: &str) -> Result<Option<Entity>, KnowledgeError>;

    /// Case-insensitive substring search, ordered by frequency descending.
    async fn search(
        &self,
        query: &str,
        entity_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Entity>, KnowledgeError>;

    /// Entities appearing in a chunk.
    async fn get_by_chunk(&self, chunk_id: &str) -> Result<Vec<Entity>, KnowledgeError>;

    async fn delete(&self, entity_id: &str) -> Result<bool, KnowledgeError>;

    async fn clear(&self) -> Result<(), KnowledgeError>;
}

struct EntityState {
    entities: HashMap<String, Entity>,
    text_index: HashMap<String, String>,
    chunk_index: HashMap<String, HashSet<String>>,
}

/// In-memory entity store.
pub struct InMemoryEntityStore {
    state: Arc<RwLock<EntityState>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(EntityState {
                entities: HashMap::new(),
                text_index: HashMap::new(),
                chunk_index: HashMap::new(),
            })),
        }
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entities.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entities.is_empty()
    }
}

impl Default for InMemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn add(&self, entity: Entity) -> Result<(), KnowledgeError> {
        let mut state = self.state.write().await;
        state
            .text_index
            .insert(entity.text.to_lowercase(), entity.id.clone());
        for chunk_id in &entity.chunk_ids {
            state
                .chunk_index
                .entry(chunk_id.clone())
                .or_default()
                .insert(entity.id.clone());
        }
        state.entities.insert(entity.id.clone(), entity);
        Ok(())
    }

    async fn get(&self, entity_id: &str) -> Result<Option<Entity>, KnowledgeError> {
        Ok(self.state.read().await.entities.get(entity_id).cloned())
    }

    async fn get_by_ids(&self, entity_ids: &[String]) -> Result<Vec<Entity>, KnowledgeError> {
        let state = self.state.read().await;
        Ok(entity_ids
            .iter()
            .filter_map(|id| state.entities.get(id).cloned())
            .collect())
    }

    async fn get_by_text(&self, text: &str) -> Result<Option<Entity>, KnowledgeError> {
        let state = self.state.read().await;
        Ok(state
            .text_index
            .get(&text.to_lowercase())
            .and_then(|id| state.entities.get(id))
            .cloned())
    }

    async fn search(
        &self,
        query: &str,
        entity_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Entity>, KnowledgeError> {
        let query_lower = query.to_lowercase();
        let state = self.state.read().await;
        let mut matches: Vec<Entity> = state
            .entities
            .values()
            .filter(|e| {
                if let Some(t) = entity_type {
                    if e.entity_type != t {
                        return false;
                    }
                }
                query_lower.contains(&e.text.to_lowercase())
                    || e.text.to_lowercase().contains(&query_lower)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.frequency.cmp(&a.frequency).then(a.id.cmp(&b.id)));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn get_by_chunk(&self, chunk_id: &str) -> Result<Vec<Entity>, KnowledgeError> {
        let state = self.state.read().await;
        Ok(state
            .chunk_index
            .get(chunk_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.entities.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, entity_id: &str) -> Result<bool, KnowledgeError> {
        let mut state = self.state.write().await;
        let Some(entity) = state.entities.remove(entity_id) else {
            return Ok(false);
        };
        state.text_index.remove(&entity.text.to_lowercase());
        for chunk_id in &entity.chunk_ids {
            if let Some(set) = state.chunk_index.get_mut(chunk_id) {
                set.remove(entity_id);
            }
        }
        Ok(true)
    }

    async fn clear(&self) -> Result<(), KnowledgeError> {
        let mut state = self.state.write().await;
        state.entities.clear();
        state.text_index.clear();
        state.chunk_index.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: &str, text: &str, frequency: u64) -> Entity {
        let mut e = Entity::new(id, text, "CONCEPT");
        e.frequency = frequency;
        e
    }

    #[tokio::test]
    async fn lookup_by_text_is_case_insensitive() {
        let store = InMemoryEntityStore::new();
        store.add(entity("e1", "Borrow Checker", 1)).await.unwrap();

        let hit = store.get_by_text("borrow checker").await.unwrap();
        assert_eq!(hit.unwrap().id, "e1");
    }

    #[tokio::test]
    async fn search_matches_query_containing_entity_name() {
        let store = InMemoryEntityStore::new();
        store.add(entity("e1", "rust", 5)).await.unwrap();
        store.add(entity("e2", "tokio", 2)).await.unwrap();

        // The entity name appears inside the longer query
        let hits = store
            .search("how does rust handle ownership", None, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "e1");
    }

    #[tokio::test]
    async fn search_orders_by_frequency() {
        let store = InMemoryEntityStore::new();
        store.add(entity("e1", "async runtime", 2)).await.unwrap();
        store.add(entity("e2", "async", 9)).await.unwrap();

        let hits = store.search("async", None, 10).await.unwrap();
        assert_eq!(hits[0].id, "e2");
    }

    #[tokio::test]
    async fn type_filter_applies() {
        let store = InMemoryEntityStore::new();
        store.add(Entity::new("e1", "ferris", "PERSON")).await.unwrap();
        store.add(Entity::new("e2", "ferris wheel", "CONCEPT")).await.unwrap();

        let hits = store.search("ferris", Some("PERSON"), 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "e1");
    }

    #[tokio::test]
    async fn chunk_index_roundtrip() {
        let store = InMemoryEntityStore::new();
        let mut e = entity("e1", "rust", 1);
        e.chunk_ids.push("c1".into());
        store.add(e).await.unwrap();

        let hits = store.get_by_chunk("c1").await.unwrap();
        assert_eq!(hits.len(), 1);

        store.delete("e1").await.unwrap();
        assert!(store.get_by_chunk("c1").await.unwrap().is_empty());
    }
}
