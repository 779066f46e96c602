use mnemo_shared::{EngineError, EntityKey, EntityRef, FactId, RelationRef, VectorId};
use mnemo_stores::{GraphStore, NewFact, RecordStore, VectorPayload, VectorRecord, VectorStore};
use serde::Serialize;
use utoipa::ToSchema;

use crate::Embedder;
use crate::engine::MemoryEngine;
use crate::extraction::{ExtractedGraph, FactDraft, GraphExtractor};
use crate::judgment::{CandidateMemory, Operation};

// ──────────────────────────────────────────────────
// Summary types
// ──────────────────────────────────────────────────

/// One fact the executor wrote (or removed), as recorded in the audit
/// row's executed-operations summary.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ExecutedItem {
  #[schema(value_type = uuid::Uuid)]
  pub vector_id: VectorId,
  #[schema(value_type = Option<i64>)]
  pub fact_id: Option<FactId>,
  pub content: String,
  #[schema(value_type = Vec<Object>)]
  pub entities: Vec<EntityRef>,
  #[schema(value_type = Vec<Object>)]
  pub relations: Vec<RelationRef>,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ExecutionStats {
  pub added_count: usize,
  pub updated_count: usize,
  pub deleted_count: usize,
  pub none_count: usize,
  pub failed_count: usize,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct ExecutionSummary {
  pub added: Vec<ExecutedItem>,
  pub updated: Vec<ExecutedItem>,
  pub deleted: Vec<ExecutedItem>,
  pub failures: Vec<String>,
  pub stats: ExecutionStats,
}

/// Tri-store deletion report, one flag per store.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct DeleteOutcome {
  pub qdrant: bool,
  pub postgres: bool,
  pub neo4j: bool,
}

// ──────────────────────────────────────────────────
// Graph diff
// ──────────────────────────────────────────────────

#[derive(Debug, Default, PartialEq)]
pub struct GraphDiff {
  pub removed_entities: Vec<String>,
  pub removed_edges: Vec<RelationRef>,
  pub added_edges: Vec<RelationRef>,
}

/// Set difference between a fact's old and new graph shape. All new
/// entities are upserted unconditionally (MERGE is idempotent), so the
/// diff only has to name what disappears and which edges are new.
#[must_use]
pub fn diff_graphs(
  old_entities: &[EntityRef],
  new_entities: &[EntityRef],
  old_relations: &[RelationRef],
  new_relations: &[RelationRef],
) -> GraphDiff {
  let old_names: std::collections::HashSet<&str> =
    old_entities.iter().map(|e| e.name.as_str()).collect();
  let new_names: std::collections::HashSet<&str> =
    new_entities.iter().map(|e| e.name.as_str()).collect();

  let removed_entities = old_names
    .difference(&new_names)
    .map(|name| (*name).to_owned())
    .collect();

  let old_set: std::collections::HashSet<&RelationRef> = old_relations.iter().collect();
  let new_set: std::collections::HashSet<&RelationRef> = new_relations.iter().collect();

  let removed_edges = old_relations
    .iter()
    .filter(|r| !new_set.contains(r))
    .cloned()
    .collect();
  let added_edges = new_relations
    .iter()
    .filter(|r| !old_set.contains(r))
    .cloned()
    .collect();

  GraphDiff {
    removed_entities,
    removed_edges,
    added_edges,
  }
}

// ──────────────────────────────────────────────────
// Execution
// ──────────────────────────────────────────────────

impl<V, G, R, X, E> MemoryEngine<V, G, R, X, E>
where
  V: VectorStore,
  G: GraphStore,
  R: RecordStore,
  X: GraphExtractor,
  E: Embedder,
{
  /// Apply a judgment's operations across the three stores.
  ///
  /// Write order per operation is fixed so that a partial failure
  /// always leaves the relational store authoritative: ADD writes the
  /// fact row before the point and graph, DELETE removes the point and
  /// graph before the row. Per-operation failures are collected and do
  /// not abort the remaining operations.
  pub async fn apply_operations(
    &self,
    owner_id: &str,
    operations: &[Operation],
    candidates: &[CandidateMemory],
    drafts: &[FactDraft],
    metadata: &serde_json::Value,
    memory_id: Option<i64>,
  ) -> Result<ExecutionSummary, EngineError> {
    let mut summary = ExecutionSummary::default();

    for operation in operations {
      match operation {
        Operation::Add { text, .. } => {
          match self
            .execute_add(owner_id, text, drafts, metadata, memory_id)
            .await
          {
            Ok(item) => {
              summary.stats.added_count += 1;
              summary.added.push(item);
            }
            Err(EngineError::StoreConflict(msg)) => {
              // The point already exists; the earlier write won.
              tracing::warn!(owner_id, %msg, "duplicate vector id on ADD, keeping existing");
            }
            Err(err) => {
              summary.stats.failed_count += 1;
              summary.failures.push(format!("ADD \"{text}\": {err}"));
            }
          }
        }

        Operation::Update { id, text, .. } => {
          let Some(candidate) = candidates.iter().find(|c| c.display_id == *id) else {
            summary.stats.failed_count += 1;
            summary
              .failures
              .push(format!("UPDATE {id}: no matching candidate"));
            continue;
          };
          match self
            .execute_update(owner_id, candidate, text, metadata)
            .await
          {
            Ok(item) => {
              summary.stats.updated_count += 1;
              summary.updated.push(item);
            }
            Err(err) => {
              summary.stats.failed_count += 1;
              summary.failures.push(format!("UPDATE {id}: {err}"));
            }
          }
        }

        Operation::Delete { id } => {
          let Some(candidate) = candidates.iter().find(|c| c.display_id == *id) else {
            summary.stats.failed_count += 1;
            summary
              .failures
              .push(format!("DELETE {id}: no matching candidate"));
            continue;
          };
          match self.execute_delete(owner_id, candidate).await {
            Ok(item) => {
              summary.stats.deleted_count += 1;
              summary.deleted.push(item);
            }
            Err(err) => {
              summary.stats.failed_count += 1;
              summary.failures.push(format!("DELETE {id}: {err}"));
            }
          }
        }

        Operation::None { .. } => {
          summary.stats.none_count += 1;
        }
      }
    }

    Ok(summary)
  }

  /// ADD: extract → fact row → vector point → graph. A failure after
  /// the row insert leaves the row for a background re-drive.
  async fn execute_add(
    &self,
    owner_id: &str,
    text: &str,
    drafts: &[FactDraft],
    metadata: &serde_json::Value,
    memory_id: Option<i64>,
  ) -> Result<ExecutedItem, EngineError> {
    let graph = self.extractor.extract(owner_id, text).await?;

    // Judged text may be a rewrite; recover the draft's classification
    // only on an exact match.
    let draft = drafts.iter().find(|d| d.content == text);
    let category = draft.map_or_else(|| "fact".to_owned(), |d| d.category.to_string());
    let importance = draft.map_or_else(|| "medium".to_owned(), |d| d.importance.to_string());

    let vector_id = VectorId::generate();
    let fact = self
      .record
      .insert_fact(NewFact {
        memory_id,
        owner_id: owner_id.to_owned(),
        content: text.to_owned(),
        category: category.clone(),
        importance: importance.clone(),
        vector_id,
        entities: serde_json::to_value(&graph.entities).unwrap_or_default(),
        relations: serde_json::to_value(&graph.relations).unwrap_or_default(),
      })
      .await?;

    let embedding = self.embedder.embed(text).await?;
    self
      .vector
      .upsert(
        owner_id,
        vec![VectorRecord {
          id: vector_id,
          vector: embedding,
          payload: VectorPayload {
            owner_id: owner_id.to_owned(),
            content: text.to_owned(),
            metadata: metadata.clone(),
            entity_names: graph.entities.iter().map(|e| e.name.clone()).collect(),
            relations: graph
              .relations
              .iter()
              .map(RelationRef::to_payload_string)
              .collect(),
            category,
            importance,
            fact_id: Some(fact.id),
          },
        }],
      )
      .await?;

    self.write_graph(owner_id, &graph).await?;

    Ok(ExecutedItem {
      vector_id,
      fact_id: Some(FactId::new(fact.id)),
      content: text.to_owned(),
      entities: graph.entities,
      relations: graph.relations,
    })
  }

  /// UPDATE: re-extract → overwrite the point in place → graph diff →
  /// fact row. Keeps both ids.
  async fn execute_update(
    &self,
    owner_id: &str,
    candidate: &CandidateMemory,
    text: &str,
    metadata: &serde_json::Value,
  ) -> Result<ExecutedItem, EngineError> {
    let fact_id = match candidate.fact_id {
      Some(id) => id,
      None => self
        .record
        .fact_by_vector_id(owner_id, candidate.vector_id)
        .await?
        .map(|f| FactId::new(f.id))
        .ok_or_else(|| {
          EngineError::NotFound(format!("no fact for vector id {}", candidate.vector_id))
        })?,
    };

    let new_graph = self.extractor.extract(owner_id, text).await?;

    let embedding = self.embedder.embed(text).await?;
    self
      .vector
      .upsert(
        owner_id,
        vec![VectorRecord {
          id: candidate.vector_id,
          vector: embedding,
          payload: VectorPayload {
            owner_id: owner_id.to_owned(),
            content: text.to_owned(),
            metadata: metadata.clone(),
            entity_names: new_graph.entities.iter().map(|e| e.name.clone()).collect(),
            relations: new_graph
              .relations
              .iter()
              .map(RelationRef::to_payload_string)
              .collect(),
            category: candidate.category.clone(),
            importance: candidate.importance.clone(),
            fact_id: Some(fact_id.get()),
          },
        }],
      )
      .await?;

    let diff = diff_graphs(
      &candidate.entities,
      &new_graph.entities,
      &candidate.relations,
      &new_graph.relations,
    );

    for edge in &diff.removed_edges {
      self
        .graph
        .delete_edge(owner_id, &edge.source, &edge.target, &edge.relation)
        .await?;
    }
    for name in &diff.removed_entities {
      let key = EntityKey::new(owner_id, name.clone());
      if self.graph.count_incident(&key).await? == 0 {
        self.graph.delete_entity_total(&key).await?;
      }
    }
    self.write_graph(owner_id, &new_graph).await?;

    self
      .record
      .update_fact(
        fact_id,
        text,
        serde_json::to_value(&new_graph.entities).unwrap_or_default(),
        serde_json::to_value(&new_graph.relations).unwrap_or_default(),
      )
      .await?;

    Ok(ExecutedItem {
      vector_id: candidate.vector_id,
      fact_id: Some(fact_id),
      content: text.to_owned(),
      entities: new_graph.entities,
      relations: new_graph.relations,
    })
  }

  /// DELETE: fact lookup → point → graph edges and orphaned entities →
  /// fact row last.
  async fn execute_delete(
    &self,
    owner_id: &str,
    candidate: &CandidateMemory,
  ) -> Result<ExecutedItem, EngineError> {
    // The relational row is authoritative for the graph shape; fall
    // back to the candidate's payload-derived shape if the row is gone.
    let fact = self
      .record
      .fact_by_vector_id(owner_id, candidate.vector_id)
      .await?;

    let (fact_id, entities, relations) = match &fact {
      Some(model) => (
        Some(FactId::new(model.id)),
        serde_json::from_value(model.entities.clone()).unwrap_or_default(),
        serde_json::from_value(model.relations.clone()).unwrap_or_default(),
      ),
      None => (
        candidate.fact_id,
        candidate.entities.clone(),
        candidate.relations.clone(),
      ),
    };

    self.vector.delete(owner_id, &[candidate.vector_id]).await?;

    self
      .delete_graph_shape(owner_id, &entities, &relations)
      .await?;

    if let Some(id) = fact_id {
      self.record.delete_fact(id).await?;
    }

    Ok(ExecutedItem {
      vector_id: candidate.vector_id,
      fact_id,
      content: candidate.text.clone(),
      entities,
      relations,
    })
  }

  /// Complete deletion keyed by vector id, for the synchronous
  /// path. Re-deleting an already-deleted fact reports all-false.
  pub async fn delete_memory_complete(
    &self,
    owner_id: &str,
    vector_id: VectorId,
  ) -> Result<DeleteOutcome, EngineError> {
    let Some(fact) = self.record.fact_by_vector_id(owner_id, vector_id).await? else {
      tracing::warn!(owner_id, %vector_id, "delete requested for unknown fact");
      // Best effort on the point in case the row was lost first.
      let _ = self.vector.delete(owner_id, &[vector_id]).await;
      return Ok(DeleteOutcome {
        qdrant: false,
        postgres: false,
        neo4j: false,
      });
    };

    let entities: Vec<EntityRef> =
      serde_json::from_value(fact.entities.clone()).unwrap_or_default();
    let relations: Vec<RelationRef> =
      serde_json::from_value(fact.relations.clone()).unwrap_or_default();

    let qdrant = match self.vector.delete(owner_id, &[vector_id]).await {
      Ok(()) => true,
      Err(err) => {
        tracing::error!(owner_id, %vector_id, error = %err, "vector delete failed");
        false
      }
    };

    let neo4j = if entities.is_empty() && relations.is_empty() {
      false
    } else {
      match self.delete_graph_shape(owner_id, &entities, &relations).await {
        Ok(()) => true,
        Err(err) => {
          tracing::error!(owner_id, %vector_id, error = %err, "graph delete failed");
          false
        }
      }
    };

    // The row goes last so a partial failure can be retried from it.
    let postgres = match self.record.delete_fact(FactId::new(fact.id)).await {
      Ok(deleted) => deleted,
      Err(err) => {
        tracing::error!(owner_id, %vector_id, error = %err, "fact delete failed");
        false
      }
    };

    tracing::info!(owner_id, %vector_id, qdrant, postgres, neo4j, "memory deleted");

    Ok(DeleteOutcome {
      qdrant,
      postgres,
      neo4j,
    })
  }

  async fn write_graph(&self, owner_id: &str, graph: &ExtractedGraph) -> Result<(), EngineError> {
    for entity in &graph.entities {
      self
        .graph
        .upsert_entity(
          &EntityKey::new(owner_id, entity.name.clone()),
          &entity.entity_type,
          entity.properties.as_ref(),
        )
        .await?;
    }
    for relation in &graph.relations {
      self
        .graph
        .upsert_edge(owner_id, &relation.source, &relation.target, &relation.relation)
        .await?;
    }
    Ok(())
  }

  /// Remove a fact's edges, then any of its entities left without
  /// incident edges. Entities shared with other facts survive.
  async fn delete_graph_shape(
    &self,
    owner_id: &str,
    entities: &[EntityRef],
    relations: &[RelationRef],
  ) -> Result<(), EngineError> {
    for relation in relations {
      self
        .graph
        .delete_edge(owner_id, &relation.source, &relation.target, &relation.relation)
        .await?;
    }
    for entity in entities {
      let key = EntityKey::new(owner_id, entity.name.clone());
      if self.graph.count_incident(&key).await? == 0 {
        self.graph.delete_entity_total(&key).await?;
      }
    }
    Ok(())
  }
}
