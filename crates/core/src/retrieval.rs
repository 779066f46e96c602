use std::collections::HashSet;

use mnemo_shared::{EngineError, EntityKey, EntityRef, FactId, RelationRef, VectorId};
use mnemo_stores::{GraphStore, RecordStore, VectorStore};
use serde::Serialize;
use utoipa::ToSchema;

use crate::Embedder;
use crate::engine::MemoryEngine;
use crate::extraction::GraphExtractor;

/// At most this many direct-hit entities get a one-hop expansion.
const EXPANSION_ENTITY_CAP: usize = 10;

/// Neighbors fetched per expanded entity.
const NEIGHBORS_PER_ENTITY: u64 = 5;

/// Upper bound on entity names returned to the caller.
const ENTITY_RESULT_CAP: usize = 20;

/// One memory in a composed context.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MemoryItem {
  #[schema(value_type = uuid::Uuid)]
  pub id: VectorId,
  pub memory: String,
  /// Cosine score for direct hits; 0.0 for structurally related ones.
  pub score: f32,
  #[schema(value_type = Option<i64>)]
  pub fact_id: Option<FactId>,
  pub category: String,
  pub importance: String,
  #[schema(value_type = Vec<Object>)]
  pub entities: Vec<EntityRef>,
  #[schema(value_type = Vec<Object>)]
  pub relations: Vec<RelationRef>,
}

/// Fused retrieval result: semantic hits plus graph-adjacent memories.
#[derive(Debug, Serialize, ToSchema)]
pub struct ContextResult {
  pub vector_memories: Vec<MemoryItem>,
  pub related_memories: Vec<MemoryItem>,
  pub extracted_entities: Vec<String>,
}

impl<V, G, R, X, E> MemoryEngine<V, G, R, X, E>
where
  V: VectorStore,
  G: GraphStore,
  R: RecordStore,
  X: GraphExtractor,
  E: Embedder,
{
  /// Compose a ranked context for a query: vector recall, enriched from
  /// the relational rows, expanded one hop through the graph.
  pub async fn compose_context(
    &self,
    owner_id: &str,
    query: &str,
    limit: u64,
  ) -> Result<ContextResult, EngineError> {
    if query.trim().is_empty() {
      return Err(EngineError::PermanentReject("query is empty".to_owned()));
    }

    let embedding = self.embedder.embed(query).await?;
    // No score floor on the retrieval path: the caller asked for the
    // `limit` best, however weak.
    let hits = self.vector.query(owner_id, embedding, limit, None).await?;

    let hit_ids: Vec<VectorId> = hits.iter().map(|h| h.id).collect();
    let fact_rows = self.record.facts_by_vector_ids(owner_id, &hit_ids).await?;

    let mut vector_memories = Vec::with_capacity(hits.len());
    let mut direct_fact_ids: HashSet<i64> = HashSet::new();
    let mut direct_entities: Vec<String> = Vec::new();

    for hit in hits {
      let row = fact_rows.iter().find(|f| f.vector_id == hit.id.as_uuid());

      let (fact_id, entities, relations) = match row {
        Some(f) => {
          direct_fact_ids.insert(f.id);
          (
            Some(FactId::new(f.id)),
            serde_json::from_value::<Vec<EntityRef>>(f.entities.clone()).unwrap_or_default(),
            serde_json::from_value::<Vec<RelationRef>>(f.relations.clone()).unwrap_or_default(),
          )
        }
        None => (
          hit.fact_id,
          hit
            .entity_names
            .iter()
            .map(|n| EntityRef::new(n.clone(), "entity"))
            .collect(),
          hit
            .relations
            .iter()
            .filter_map(|s| RelationRef::from_payload_string(s))
            .collect(),
        ),
      };

      for entity in &entities {
        if !direct_entities.contains(&entity.name) {
          direct_entities.push(entity.name.clone());
        }
      }

      vector_memories.push(MemoryItem {
        id: hit.id,
        memory: hit.content,
        score: hit.score,
        fact_id,
        category: hit.category,
        importance: hit.importance,
        entities,
        relations,
      });
    }

    // One-hop neighborhood expansion, capped so a hub entity cannot
    // fan the query out across the whole graph.
    let mut all_entities: Vec<String> = direct_entities.clone();
    for name in direct_entities.iter().take(EXPANSION_ENTITY_CAP) {
      let neighbors = self
        .graph
        .neighbors(
          &EntityKey::new(owner_id, name.clone()),
          NEIGHBORS_PER_ENTITY,
        )
        .await?;
      for neighbor in neighbors {
        if !all_entities.contains(&neighbor) {
          all_entities.push(neighbor);
        }
      }
    }

    // Any owner fact touching the expanded entity set, minus the direct
    // hits, is structurally related.
    let mut related_memories = Vec::new();
    if !all_entities.is_empty() {
      let entity_set: HashSet<&str> = all_entities.iter().map(String::as_str).collect();
      for fact in self.record.facts_by_owner(owner_id).await? {
        if direct_fact_ids.contains(&fact.id) {
          continue;
        }
        let entities: Vec<EntityRef> =
          serde_json::from_value(fact.entities.clone()).unwrap_or_default();
        if !entities.iter().any(|e| entity_set.contains(e.name.as_str())) {
          continue;
        }
        let relations: Vec<RelationRef> =
          serde_json::from_value(fact.relations.clone()).unwrap_or_default();
        related_memories.push(MemoryItem {
          id: VectorId::from_uuid(fact.vector_id),
          memory: fact.content,
          score: 0.0,
          fact_id: Some(FactId::new(fact.id)),
          category: fact.category,
          importance: fact.importance,
          entities,
          relations,
        });
      }
    }

    all_entities.truncate(ENTITY_RESULT_CAP);

    tracing::debug!(
      owner_id,
      direct = vector_memories.len(),
      related = related_memories.len(),
      entities = all_entities.len(),
      "context composed"
    );

    Ok(ContextResult {
      vector_memories,
      related_memories,
      extracted_entities: all_entities,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ExtractedGraph;
  use crate::engine::MemoryEngine;
  use crate::fakes::{
    FakeEmbedder, FakeExtractor, FakeGraphStore, FakeRecordStore, FakeVectorStore,
  };
  use crate::judgment::Operation;

  const OWNER: &str = "owner-1";

  #[tokio::test]
  async fn context_fuses_vector_hits_with_graph_neighborhood() {
    let direct_text = "Zhang San works at Alibaba";
    let graph = ExtractedGraph {
      entities: vec![
        EntityRef::new("Zhang San", "person"),
        EntityRef::new("Alibaba", "organization"),
      ],
      relations: vec![RelationRef::new("Zhang San", "works_at", "Alibaba")],
    };
    let engine = MemoryEngine::with_parts(
      FakeVectorStore::default(),
      FakeGraphStore::default(),
      FakeRecordStore::default(),
      FakeExtractor::default().with_graph(direct_text, graph),
      FakeEmbedder,
    );

    // The direct hit goes through the full ADD path.
    engine
      .apply_operations(
        OWNER,
        &[Operation::Add {
          id: "0".to_owned(),
          text: direct_text.to_owned(),
        }],
        &[],
        &[],
        &serde_json::json!({}),
        None,
      )
      .await
      .unwrap();

    // A second fact shares the Alibaba entity but has no vector point,
    // so only the graph walk can surface it.
    let related_entities = serde_json::json!([
      {"name": "Alibaba", "type": "organization"},
      {"name": "Hangzhou", "type": "location"}
    ]);
    let related_relations = serde_json::json!([
      {"source": "Alibaba", "relation": "headquartered_in", "target": "Hangzhou"}
    ]);
    let related_id = mnemo_shared::VectorId::generate();
    engine.record.seed_fact(
      OWNER,
      "Alibaba is headquartered in Hangzhou",
      related_id,
      related_entities,
      related_relations,
    );
    engine
      .graph
      .upsert_entity(&EntityKey::new(OWNER, "Hangzhou"), "location", None)
      .await
      .unwrap();
    engine
      .graph
      .upsert_edge(OWNER, "Alibaba", "Hangzhou", "headquartered_in")
      .await
      .unwrap();

    // A foreign owner's fact naming the same entity must never leak.
    engine.record.seed_fact(
      "owner-2",
      "Alibaba runs my favourite store",
      mnemo_shared::VectorId::generate(),
      serde_json::json!([{"name": "Alibaba", "type": "organization"}]),
      serde_json::json!([]),
    );

    let context = engine.compose_context(OWNER, direct_text, 10).await.unwrap();

    assert_eq!(context.vector_memories.len(), 1);
    let top = &context.vector_memories[0];
    assert_eq!(top.memory, direct_text);
    assert!(top.score > 0.99);
    assert_eq!(top.entities[0].entity_type, "person");

    assert_eq!(context.related_memories.len(), 1);
    let related = &context.related_memories[0];
    assert_eq!(related.memory, "Alibaba is headquartered in Hangzhou");
    assert_eq!(related.score, 0.0);
    assert_eq!(related.id.as_uuid(), related_id.as_uuid());

    // One-hop expansion pulled the neighbor in.
    assert!(context.extracted_entities.contains(&"Hangzhou".to_owned()));
    assert!(context.extracted_entities.len() <= 20);
  }

  #[tokio::test]
  async fn empty_query_is_rejected() {
    let engine = MemoryEngine::with_parts(
      FakeVectorStore::default(),
      FakeGraphStore::default(),
      FakeRecordStore::default(),
      FakeExtractor::default(),
      FakeEmbedder,
    );
    let err = engine.compose_context(OWNER, "  ", 10).await.unwrap_err();
    assert_eq!(err.kind(), "PermanentReject");
  }
}
