//! Hybrid strategy: parallel graph + vector fan-out, weighted score
//! merge, and one-hop graph expansion from vector hits.
//!
//! Score composition per chunk:
//! - graph side contributes `graph_weight × (1 − rank/count)`
//! - vector side contributes `vector_weight × raw_similarity`
//! - expansion chunks get `expansion_weight × (1 − rank/count)`
//!
//! A missing side contributes 0. Expansion walks one relation step from
//! the entities of vector-returned chunks to surface chunks neither
//! backend found, capped per query.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use mnemo_core::error::RetrievalError;
use tracing::debug;

use crate::model::{Entity, RetrievalResult, TextChunk};
use crate::retriever::{GraphRetriever, VectorRetriever};
use crate::store::{ChunkStore, EntityStore, RelationDirection, RelationStore};
use crate::strategy::{RetrievalStrategy, StrategyKind};

pub struct HybridStrategy {
    graph_retriever: Arc<GraphRetriever>,
    vector_retriever: Arc<VectorRetriever>,
    entity_store: Arc<dyn EntityStore>,
    relation_store: Arc<dyn RelationStore>,
    chunk_store: Arc<dyn ChunkStore>,
    n_hop: usize,
    graph_weight: f32,
    vector_weight: f32,
    expansion_weight: f32,
    max_expansion: usize,
}

impl HybridStrategy {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        graph_retriever: Arc<GraphRetriever>,
        vector_retriever: Arc<VectorRetriever>,
        entity_store: Arc<dyn EntityStore>,
        relation_store: Arc<dyn RelationStore>,
        chunk_store: Arc<dyn ChunkStore>,
        n_hop: usize,
        graph_weight: f32,
        vector_weight: f32,
        expansion_weight: f32,
    ) -> Self {
        Self {
            graph_retriever,
            vector_retriever,
            entity_store,
            relation_store,
            chunk_store,
            n_hop,
            graph_weight,
            vector_weight,
            expansion_weight,
            max_expansion: 10,
        }
    }

    /// Cap on expansion chunks discovered per query.
    pub fn with_max_expansion(mut self, max_expansion: usize) -> Self {
        self.max_expansion = max_expansion;
        self
    }

    /// One relation step from the entities of vector hits, collecting
    /// chunks not already present. Returns `(chunks, entities)` in
    /// discovery order.
    async fn expand_from_vector_hits(
        &self,
        vector_chunks: &[TextChunk],
        known_chunk_ids: &HashSet<String>,
    ) -> (Vec<TextChunk>, Vec<Entity>) {
        let mut discovered: Vec<TextChunk> = Vec::new();
        let mut discovered_entities: Vec<Entity> = Vec::new();
        let mut seen_chunks: HashSet<String> = known_chunk_ids.clone();
        let mut seen_entities: HashSet<String> = HashSet::new();

        'outer: for chunk in vector_chunks {
            for entity_id in &chunk.entity_ids {
                let relations = match self
                    .relation_store
                    .get_by_entity(entity_id, RelationDirection::Both)
                    .await
                {
                    Ok(relations) => relations,
                    Err(e) => {
                        debug!(error = %e, "expansion adjacency lookup failed");
                        continue;
                    }
                };
                for relation in relations {
                    if relation.is_self_loop() {
                        continue;
                    }
                    let neighbor_id = if &relation.source_id == entity_id {
                        &relation.target_id
                    } else {
                        &relation.source_id
                    };
                    if !seen_entities.insert(neighbor_id.clone()) {
                        continue;
                    }
                    let Ok(Some(neighbor)) = self.entity_store.get(neighbor_id).await else {
                        continue;
                    };
                    let mut cap_reached = false;
                    for chunk_id in &neighbor.chunk_ids {
                        if !seen_chunks.insert(chunk_id.clone()) {
                            continue;
                        }
                        if let Ok(Some(found)) = self.chunk_store.get(chunk_id).await {
                            discovered.push(found);
                            if discovered.len() >= self.max_expansion {
                                cap_reached = true;
                                break;
                            }
                        }
                    }
                    discovered_entities.push(neighbor);
                    if cap_reached {
                        break 'outer;
                    }
                }
            }
        }

        (discovered, discovered_entities)
    }
}

#[async_trait]
impl RetrievalStrategy for HybridStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Hybrid
    }

    async fn retrieve(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<RetrievalResult, RetrievalError> {
        // 1. Parallel fan-out; each failing side degrades to empty.
        let (graph_outcome, vector_outcome) = tokio::join!(
            self.graph_retriever.retrieve(query, self.n_hop, limit),
            self.vector_retriever.retrieve(query, limit, 0.0),
        );
        let (mut entities, relations, graph_chunks) = graph_outcome.unwrap_or_else(|e| {
            debug!(error = %e, "graph side failed");
            (Vec::new(), Vec::new(), Vec::new())
        });
        let vector_results = vector_outcome.unwrap_or_else(|e| {
            debug!(error = %e, "vector side failed");
            Vec::new()
        });

        // 2. Weighted score merge
        let mut scores: HashMap<String, f32> = HashMap::new();
        let mut chunks_by_id: HashMap<String, TextChunk> = HashMap::new();

        let graph_count = graph_chunks.len();
        for (rank, chunk) in graph_chunks.into_iter().enumerate() {
            let base = 1.0 - rank as f32 / graph_count as f32;
            scores.insert(chunk.id.clone(), base * self.graph_weight);
            chunks_by_id.insert(chunk.id.clone(), chunk);
        }
        for (chunk, similarity) in &vector_results {
            *scores.entry(chunk.id.clone()).or_insert(0.0) += similarity * self.vector_weight;
            chunks_by_id
                .entry(chunk.id.clone())
                .or_insert_with(|| chunk.clone());
        }

        // 3. Graph expansion from vector hits
        let vector_chunks: Vec<TextChunk> =
            vector_results.into_iter().map(|(c, _)| c).collect();
        let known: HashSet<String> = chunks_by_id.keys().cloned().collect();
        let (expansion_chunks, expansion_entities) =
            self.expand_from_vector_hits(&vector_chunks, &known).await;

        let expansion_count = expansion_chunks.len();
        for (rank, chunk) in expansion_chunks.into_iter().enumerate() {
            let score = self.expansion_weight * (1.0 - rank as f32 / expansion_count as f32);
            scores.insert(chunk.id.clone(), score);
            chunks_by_id.insert(chunk.id.clone(), chunk);
        }
        let existing: HashSet<String> = entities.iter().map(|e| e.id.clone()).collect();
        for entity in expansion_entities {
            if !existing.contains(&entity.id) {
                entities.push(entity);
            }
        }

        // 4. Sort by composite score, take top-k
        let mut ranked: Vec<(String, f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        ranked.truncate(limit);

        let mut result = RetrievalResult {
            entities,
            relations,
            ..RetrievalResult::default()
        };
        for (chunk_id, score) in ranked {
            if let Some(chunk) = chunks_by_id.remove(&chunk_id) {
                result.scores.insert(chunk_id, score);
                result.chunks.push(chunk);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Relation;
    use crate::store::{InMemoryChunkStore, InMemoryEntityStore, InMemoryRelationStore};
    use async_trait::async_trait;
    use mnemo_core::error::MemoryError;
    use mnemo_core::provider::EmbeddingProvider;

    struct ClassEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ClassEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
            let mut v = vec![0.0f32; 8];
            for c in text.to_lowercase().chars().filter(|c| c.is_alphanumeric()) {
                v[(c as usize) % 8] += 1.0;
            }
            Ok(v)
        }
    }

    struct Fixture {
        chunks: Arc<InMemoryChunkStore>,
        entities: Arc<InMemoryEntityStore>,
        relations: Arc<InMemoryRelationStore>,
    }

    impl Fixture {
        fn strategy(&self, weights: (f32, f32, f32)) -> HybridStrategy {
            let embedder = Arc::new(ClassEmbedder);
            HybridStrategy::new(
                Arc::new(GraphRetriever::new(
                    self.entities.clone(),
                    self.relations.clone(),
                    self.chunks.clone(),
                )),
                Arc::new(VectorRetriever::new(self.chunks.clone(), embedder)),
                self.entities.clone(),
                self.relations.clone(),
                self.chunks.clone(),
                2,
                weights.0,
                weights.1,
                weights.2,
            )
        }
    }

    async fn empty_fixture() -> Fixture {
        Fixture {
            chunks: Arc::new(InMemoryChunkStore::new()),
            entities: Arc::new(InMemoryEntityStore::new()),
            relations: Arc::new(InMemoryRelationStore::new()),
        }
    }

    #[tokio::test]
    async fn expansion_discovers_linked_chunk() {
        // Graph returns no chunks (no entity matches the query text).
        // Vector returns C1 whose entity E1 links to E2, whose chunk C2 is
        // not in the vector results.
        let f = empty_fixture().await;
        let embedder = ClassEmbedder;

        let query = "qqq zzz";
        let mut c1 = TextChunk::new("C1", "qqq zzz qqq", "d");
        c1.embedding = Some(embedder.embed("qqq zzz qqq").await.unwrap());
        c1.entity_ids.push("E1".into());
        f.chunks.add(c1).await.unwrap();

        // C2 has no embedding, so vector search can never return it.
        let mut c2 = TextChunk::new("C2", "totally different words", "d");
        c2.entity_ids.push("E2".into());
        f.chunks.add(c2).await.unwrap();

        // Entity names deliberately don't appear in the query → no seeds.
        let mut e1 = Entity::new("E1", "alpha-node", "CONCEPT");
        e1.chunk_ids.push("C1".into());
        f.entities.add(e1).await.unwrap();
        let mut e2 = Entity::new("E2", "beta-node", "CONCEPT");
        e2.chunk_ids.push("C2".into());
        f.entities.add(e2).await.unwrap();
        f.relations
            .add(Relation::new("r1", "E1", "E2", "linked"))
            .await
            .unwrap();

        let strategy = f.strategy((0.5, 0.5, 0.3));
        let result = strategy.retrieve(query, 10).await.unwrap();

        let ids: Vec<&str> = result.chunks.iter().map(|c| c.id.as_str()).collect();
        assert!(ids.contains(&"C1"));
        assert!(ids.contains(&"C2"));
        // Expansion score is bounded by the expansion weight
        assert!(result.scores["C2"] <= 0.3 + 1e-6);
        // C1 (direct vector hit) outranks the expansion discovery
        assert!(result.scores["C1"] > result.scores["C2"]);
        // E2 was merged into the entity list
        assert!(result.entities.iter().any(|e| e.id == "E2"));
    }

    #[tokio::test]
    async fn both_sides_contribute_to_shared_chunk() {
        let f = empty_fixture().await;
        let embedder = ClassEmbedder;

        // Entity "shared" matches the query, and its chunk is also the
        // best vector hit → both sides score it.
        let mut entity = Entity::new("E1", "shared", "CONCEPT");
        entity.chunk_ids.push("C1".into());
        f.entities.add(entity).await.unwrap();
        let mut c1 = TextChunk::new("C1", "shared topic text", "d");
        c1.embedding = Some(embedder.embed("shared topic text").await.unwrap());
        c1.entity_ids.push("E1".into());
        f.chunks.add(c1).await.unwrap();

        let strategy = f.strategy((0.5, 0.5, 0.3));
        let result = strategy.retrieve("shared topic text", 10).await.unwrap();

        assert_eq!(result.chunks.len(), 1);
        // graph contributes 0.5 × 1.0, vector ~0.5 × 1.0
        assert!(result.scores["C1"] > 0.9);
    }

    #[tokio::test]
    async fn expansion_is_capped() {
        let f = empty_fixture().await;
        let embedder = ClassEmbedder;

        let query = "qqq zzz";
        let mut seed_chunk = TextChunk::new("C-seed", "qqq zzz", "d");
        seed_chunk.embedding = Some(embedder.embed("qqq zzz").await.unwrap());
        seed_chunk.entity_ids.push("E-seed".into());
        f.chunks.add(seed_chunk).await.unwrap();
        let mut seed_entity = Entity::new("E-seed", "seed-node", "CONCEPT");
        seed_entity.chunk_ids.push("C-seed".into());
        f.entities.add(seed_entity).await.unwrap();

        // Five neighbors, each with its own chunk
        for i in 0..5 {
            let eid = format!("E{i}");
            let cid = format!("C{i}");
            let mut entity = Entity::new(&eid, format!("node-{i}"), "CONCEPT");
            entity.chunk_ids.push(cid.clone());
            f.entities.add(entity).await.unwrap();
            f.chunks
                .add(TextChunk::new(&cid, "far away words", "d"))
                .await
                .unwrap();
            f.relations
                .add(Relation::new(format!("r{i}"), "E-seed", &eid, "linked"))
                .await
                .unwrap();
        }

        let strategy = f.strategy((0.5, 0.5, 0.3)).with_max_expansion(2);
        let result = strategy.retrieve(query, 20).await.unwrap();
        // seed + at most 2 expansion chunks
        assert_eq!(result.chunks.len(), 3);
    }

    #[tokio::test]
    async fn empty_everything_is_valid() {
        let f = empty_fixture().await;
        let strategy = f.strategy((0.5, 0.5, 0.3));
        let result = strategy.retrieve("anything", 10).await.unwrap();
        assert!(result.is_empty());
    }
}
