//! Relation storage with adjacency indexes and bounded BFS traversal.

use async_trait::async_trait;
use mnemo_core::error::KnowledgeError;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::model::Relation;

/// Traversal direction over the adjacency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelationDirection {
    Outgoing,
    Incoming,
    #[default]
    Both,
}

/// Relation storage interface.
#[async_trait]
pub trait RelationStore: Send + Sync {
    async fn add(&self, relation: Relation) -> Result<(), KnowledgeError>;

    async fn add_batch(&self, relations: Vec<Relation>) -> Result<(), KnowledgeError> {
        for relation in relations {
            self.add(relation).await?;
        }
        Ok(())
    }

    async fn get(&self, relation_id: &str) -> Result<Option<Relation>, KnowledgeError>;

    async fn get_by_ids(&self, relation_ids: &[String]) -> Result<Vec<Relation>, KnowledgeError>;

    /// Relations touching an entity.
    async fn get_by_entity(
        &self,
        entity_id: &str,
        direction: RelationDirection,
    ) -> Result<Vec<Relation>, KnowledgeError>;

    /// All relations within `n` hops of the entity (BFS, cycle-safe).
    async fn get_n_hop(
        &self,
        entity_id: &str,
        n: usize,
        direction: RelationDirection,
    ) -> Result<Vec<Relation>, KnowledgeError>;

    async fn delete(&self, relation_id: &str) -> Result<bool, KnowledgeError>;

    async fn clear(&self) -> Result<(), KnowledgeError>;
}

struct RelationState {
    relations: HashMap<String, Relation>,
    outgoing: HashMap<String, HashSet<String>>,
    incoming: HashMap<String, HashSet<String>>,
}

/// In-memory relation store.
pub struct InMemoryRelationStore {
    state: Arc<RwLock<RelationState>>,
}

impl InMemoryRelationStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(RelationState {
                relations: HashMap::new(),
                outgoing: HashMap::new(),
                incoming: HashMap::new(),
            })),
        }
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.relations.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.relations.is_empty()
    }
}

impl Default for InMemoryRelationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RelationState {
    fn neighbors(&self, entity_id: &str, direction: RelationDirection) -> Vec<&Relation> {
        let mut ids: HashSet<&String> = HashSet::new();
        if matches!(direction, RelationDirection::Outgoing | RelationDirection::Both) {
            if let Some(set) = self.outgoing.get(entity_id) {
                ids.extend(set.iter());
            }
        }
        if matches!(direction, RelationDirection::Incoming | RelationDirection::Both) {
            if let Some(set) = self.incoming.get(entity_id) {
                ids.extend(set.iter());
            }
        }
        ids.into_iter().filter_map(|id| self.relations.get(id)).collect()
    }
}

#[async_trait]
impl RelationStore for InMemoryRelationStore {
    async fn add(&self, relation: Relation) -> Result<(), KnowledgeError> {
        let mut state = self.state.write().await;
        state
            .outgoing
            .entry(relation.source_id.clone())
            .or_default()
            .insert(relation.id.clone());
        state
            .incoming
            .entry(relation.target_id.clone())
            .or_default()
            .insert(relation.id.clone());
        state.relations.insert(relation.id.clone(), relation);
        Ok(())
    }

    async fn get(&self, relation_id: &str) -> Result<Option<Relation>, KnowledgeError> {
        Ok(self.state.read().await.relations.get(relation_id).cloned())
    }

    async fn get_by_ids(&self, relation_ids: &[String]) -> Result<Vec<Relation>, KnowledgeError> {
        let state = self.state.read().await;
        Ok(relation_ids
            .iter()
            .filter_map(|id| state.relations.get(id).cloned())
            .collect())
    }

    async fn get_by_entity(
        &self,
        entity_id: &str,
        direction: RelationDirection,
    ) -> Result<Vec<Relation>, KnowledgeError> {
        let state = self.state.read().await;
        Ok(state
            .neighbors(entity_id, direction)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn get_n_hop(
        &self,
        entity_id: &str,
        n: usize,
        direction: RelationDirection,
    ) -> Result<Vec<Relation>, KnowledgeError> {
        let state = self.state.read().await;

        let mut visited_entities: HashSet<String> = HashSet::new();
        let mut visited_relations: HashSet<String> = HashSet::new();
        let mut collected: Vec<Relation> = Vec::new();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        queue.push_back((entity_id.to_string(), 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= n || visited_entities.contains(&current) {
                continue;
            }
            visited_entities.insert(current.clone());

            for relation in state.neighbors(&current, direction) {
                // Cycles are normal; self-loops carry no traversal value.
                if relation.is_self_loop() {
                    continue;
                }
                if visited_relations.insert(relation.id.clone()) {
                    collected.push(relation.clone());
                    let next = if relation.source_id == current {
                        relation.target_id.clone()
                    } else {
                        relation.source_id.clone()
                    };
                    if !visited_entities.contains(&next) {
                        queue.push_back((next, depth + 1));
                    }
                }
            }
        }

        Ok(collected)
    }

    async fn delete(&self, relation_id: &str) -> Result<bool, KnowledgeError> {
        let mut state = self.state.write().await;
        let Some(relation) = state.relations.remove(relation_id) else {
            return Ok(false);
        };
        if let Some(set) = state.outgoing.get_mut(&relation.source_id) {
            set.remove(relation_id);
        }
        if let Some(set) = state.incoming.get_mut(&relation.target_id) {
            set.remove(relation_id);
        }
        Ok(true)
    }

    async fn clear(&self) -> Result<(), KnowledgeError> {
        let mut state = self.state.write().await;
        state.relations.clear();
        state.outgoing.clear();
        state.incoming.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relation(id: &str, source: &str, target: &str) -> Relation {
        Relation::new(id, source, target, "related_to")
    }

    async fn chain_store() -> InMemoryRelationStore {
        // a → b → c → d
        let store = InMemoryRelationStore::new();
        store.add(relation("r1", "a", "b")).await.unwrap();
        store.add(relation("r2", "b", "c")).await.unwrap();
        store.add(relation("r3", "c", "d")).await.unwrap();
        store
    }

    #[tokio::test]
    async fn one_hop_sees_direct_neighbors_only() {
        let store = chain_store().await;
        let relations = store.get_n_hop("a", 1, RelationDirection::Both).await.unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].id, "r1");
    }

    #[tokio::test]
    async fn two_hops_reach_further() {
        let store = chain_store().await;
        let relations = store.get_n_hop("a", 2, RelationDirection::Both).await.unwrap();
        let ids: HashSet<String> = relations.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, HashSet::from(["r1".to_string(), "r2".to_string()]));
    }

    #[tokio::test]
    async fn traversal_is_bidirectional() {
        let store = chain_store().await;
        // Starting from "c", one hop sees both r2 (incoming) and r3 (outgoing)
        let relations = store.get_n_hop("c", 1, RelationDirection::Both).await.unwrap();
        assert_eq!(relations.len(), 2);
    }

    #[tokio::test]
    async fn cycles_terminate() {
        let store = InMemoryRelationStore::new();
        store.add(relation("r1", "a", "b")).await.unwrap();
        store.add(relation("r2", "b", "c")).await.unwrap();
        store.add(relation("r3", "c", "a")).await.unwrap();

        let relations = store.get_n_hop("a", 10, RelationDirection::Both).await.unwrap();
        assert_eq!(relations.len(), 3);
    }

    #[tokio::test]
    async fn self_loops_are_ignored() {
        let store = InMemoryRelationStore::new();
        store.add(relation("loop", "a", "a")).await.unwrap();
        store.add(relation("r1", "a", "b")).await.unwrap();

        let relations = store.get_n_hop("a", 2, RelationDirection::Both).await.unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].id, "r1");
    }

    #[tokio::test]
    async fn direction_filter() {
        let store = chain_store().await;
        let outgoing = store
            .get_by_entity("b", RelationDirection::Outgoing)
            .await
            .unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].id, "r2");

        let incoming = store
            .get_by_entity("b", RelationDirection::Incoming)
            .await
            .unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].id, "r1");
    }

    #[tokio::test]
    async fn zero_hops_collects_nothing() {
        let store = chain_store().await;
        let relations = store.get_n_hop("a", 0, RelationDirection::Both).await.unwrap();
        assert!(relations.is_empty());
    }
}
