//! Graph retriever — structural retrieval over the knowledge graph.
//!
//! Pipeline: seed entities matched from the query → bounded BFS over the
//! relation adjacency → fetch visited entities → collect their chunks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use mnemo_core::error::RetrievalError;
use tracing::debug;

use crate::model::{Entity, Relation, TextChunk};
use crate::store::{ChunkStore, EntityStore, RelationDirection, RelationStore};

/// Structural retriever over entities and relations.
pub struct GraphRetriever {
    entity_store: Arc<dyn EntityStore>,
    relation_store: Arc<dyn RelationStore>,
    chunk_store: Arc<dyn ChunkStore>,
    seed_limit: usize,
}

impl GraphRetriever {
    pub fn new(
        entity_store: Arc<dyn EntityStore>,
        relation_store: Arc<dyn RelationStore>,
        chunk_store: Arc<dyn ChunkStore>,
    ) -> Self {
        Self {
            entity_store,
            relation_store,
            chunk_store,
            seed_limit: 5,
        }
    }

    /// How many seed entities to match from the query.
    pub fn with_seed_limit(mut self, seed_limit: usize) -> Self {
        self.seed_limit = seed_limit;
        self
    }

    /// Retrieve `(entities, relations, chunks)` within `n_hop` of the
    /// query's seed entities. Empty when no seeds match.
    pub async fn retrieve(
        &self,
        query: &str,
        n_hop: usize,
        limit: usize,
    ) -> Result<(Vec<Entity>, Vec<Relation>, Vec<TextChunk>), RetrievalError> {
        let backend_err = |reason: String| RetrievalError::Backend {
            backend: "graph".into(),
            reason,
        };

        // 1. Seed entities from the query
        let seeds = self
            .entity_store
            .search(query, None, self.seed_limit)
            .await
            .map_err(|e| backend_err(e.to_string()))?;
        if seeds.is_empty() {
            debug!(query, "graph retrieval: no seed entities");
            return Ok((Vec::new(), Vec::new(), Vec::new()));
        }

        // 2. N-hop traversal from each seed
        let mut relations_by_id: HashMap<String, Relation> = HashMap::new();
        let mut visited_entity_ids: HashSet<String> = HashSet::new();
        for seed in &seeds {
            visited_entity_ids.insert(seed.id.clone());
            let relations = self
                .relation_store
                .get_n_hop(&seed.id, n_hop, RelationDirection::Both)
                .await
                .map_err(|e| backend_err(e.to_string()))?;
            for relation in relations {
                visited_entity_ids.insert(relation.source_id.clone());
                visited_entity_ids.insert(relation.target_id.clone());
                relations_by_id.entry(relation.id.clone()).or_insert(relation);
            }
        }

        // 3. Fetch all visited entities (sorted so output order never
        // depends on hash iteration)
        let mut entity_ids: Vec<String> = visited_entity_ids.into_iter().collect();
        entity_ids.sort();
        let entities = self
            .entity_store
            .get_by_ids(&entity_ids)
            .await
            .map_err(|e| backend_err(e.to_string()))?;

        // 4. Collect chunks via entity back-references
        let mut chunk_ids: Vec<String> = Vec::new();
        let mut seen_chunks: HashSet<String> = HashSet::new();
        for entity in &entities {
            for chunk_id in &entity.chunk_ids {
                if seen_chunks.insert(chunk_id.clone()) {
                    chunk_ids.push(chunk_id.clone());
                }
            }
        }
        chunk_ids.truncate(limit);
        let chunks = self
            .chunk_store
            .get_by_ids(&chunk_ids)
            .await
            .map_err(|e| backend_err(e.to_string()))?;

        debug!(
            seeds = seeds.len(),
            entities = entities.len(),
            relations = relations_by_id.len(),
            chunks = chunks.len(),
            "graph retrieval"
        );

        Ok((entities, relations_by_id.into_values().collect(), chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryChunkStore, InMemoryEntityStore, InMemoryRelationStore};

    struct Fixture {
        retriever: GraphRetriever,
    }

    /// Graph: rust —r1→ tokio —r2→ runtime, with one chunk per entity.
    async fn fixture() -> Fixture {
        let chunks = Arc::new(InMemoryChunkStore::new());
        let entities = Arc::new(InMemoryEntityStore::new());
        let relations = Arc::new(InMemoryRelationStore::new());

        for (eid, name, cid, content) in [
            ("e-rust", "rust", "c-rust", "rust is a systems language"),
            ("e-tokio", "tokio", "c-tokio", "tokio is an async runtime"),
            ("e-runtime", "runtime", "c-runtime", "a runtime schedules tasks"),
        ] {
            let mut entity = Entity::new(eid, name, "CONCEPT");
            entity.chunk_ids.push(cid.into());
            entities.add(entity).await.unwrap();

            let mut chunk = TextChunk::new(cid, content, "doc1");
            chunk.entity_ids.push(eid.into());
            chunks.add(chunk).await.unwrap();
        }
        relations
            .add(Relation::new("r1", "e-rust", "e-tokio", "uses"))
            .await
            .unwrap();
        relations
            .add(Relation::new("r2", "e-tokio", "e-runtime", "is_a"))
            .await
            .unwrap();

        Fixture {
            retriever: GraphRetriever::new(entities, relations, chunks),
        }
    }

    #[tokio::test]
    async fn no_seeds_yields_empty() {
        let f = fixture().await;
        let (entities, relations, chunks) =
            f.retriever.retrieve("quantum physics", 2, 10).await.unwrap();
        assert!(entities.is_empty());
        assert!(relations.is_empty());
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn one_hop_reaches_direct_neighbors() {
        let f = fixture().await;
        let (entities, relations, chunks) =
            f.retriever.retrieve("tell me about rust", 1, 10).await.unwrap();

        let entity_ids: HashSet<String> = entities.iter().map(|e| e.id.clone()).collect();
        assert!(entity_ids.contains("e-rust"));
        assert!(entity_ids.contains("e-tokio"));
        assert!(!entity_ids.contains("e-runtime"));

        assert_eq!(relations.len(), 1);
        assert_eq!(chunks.len(), 2);
    }

    #[tokio::test]
    async fn two_hops_reach_whole_chain() {
        let f = fixture().await;
        let (entities, relations, chunks) =
            f.retriever.retrieve("tell me about rust", 2, 10).await.unwrap();

        assert_eq!(entities.len(), 3);
        assert_eq!(relations.len(), 2);
        assert_eq!(chunks.len(), 3);
    }

    #[tokio::test]
    async fn chunk_limit_caps_results() {
        let f = fixture().await;
        let (_, _, chunks) = f.retriever.retrieve("rust", 2, 1).await.unwrap();
        assert_eq!(chunks.len(), 1);
    }
}
