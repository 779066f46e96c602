use std::sync::Arc;

use futures::future::try_join_all;
use mnemo_shared::{EngineError, EntityRef, RelationRef, VectorId};
use mnemo_stores::{
  GraphStore, NewAudit, Neo4jStore, PgRecordStore, QdrantStore, RecordStore, VectorPayload,
  VectorRecord, VectorStore,
};
use serde::Serialize;
use tokio::sync::Semaphore;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::executor::{ExecutedItem, ExecutionStats, ExecutionSummary};
use crate::extraction::{GraphExtractor, LlmGraphExtractor, extract_facts};
use crate::judgment::{CandidateMemory, JUDGE_SCORE_FLOOR, JUDGE_TOP_K, Operation, judge};
use crate::{Embedder, GatewayEmbedder};

/// Extraction fan-out ceiling on the batch path.
const BATCH_EXTRACTION_CONCURRENCY: usize = 3;

/// Everything the pipeline needs, wired once at startup and passed into
/// workers and request handlers.
#[derive(Clone)]
pub struct MemoryEngine<V, G, R, X = LlmGraphExtractor, E = GatewayEmbedder> {
  pub(crate) vector: V,
  pub(crate) graph: G,
  pub(crate) record: R,
  pub(crate) extractor: X,
  pub(crate) embedder: E,
}

/// The production wiring: qdrant + neo4j + postgres with the gateway
/// extractor and embedder.
pub type ProdEngine = MemoryEngine<QdrantStore, Neo4jStore, PgRecordStore>;

impl<V, G, R> MemoryEngine<V, G, R>
where
  V: VectorStore,
  G: GraphStore,
  R: RecordStore,
{
  pub fn new(vector: V, graph: G, record: R) -> Self {
    Self {
      vector,
      graph,
      record,
      extractor: LlmGraphExtractor,
      embedder: GatewayEmbedder,
    }
  }
}

impl<V, G, R, X, E> MemoryEngine<V, G, R, X, E>
where
  V: VectorStore,
  G: GraphStore,
  R: RecordStore,
  X: GraphExtractor,
  E: Embedder,
{
  pub fn with_parts(vector: V, graph: G, record: R, extractor: X, embedder: E) -> Self {
    Self {
      vector,
      graph,
      record,
      extractor,
      embedder,
    }
  }

  /// Full memory-write pipeline for one piece of content.
  ///
  /// `skip_judge` bypasses retrieval and judgment entirely: every
  /// extracted fact is ADDed (trusted bulk imports).
  pub async fn add_memory(
    &self,
    owner_id: &str,
    content: &str,
    metadata: serde_json::Value,
    skip_judge: bool,
    api_key_id: Option<i64>,
  ) -> Result<AddMemoryOutcome, EngineError> {
    if content.trim().is_empty() {
      return Err(EngineError::PermanentReject("content is empty".to_owned()));
    }

    // The raw memory is persisted before extraction so a failed task can
    // always be re-driven from it.
    let memory_id = self
      .record
      .insert_memory(owner_id, content, metadata.clone())
      .await?;

    let drafts = extract_facts(content).await?;
    if drafts.is_empty() {
      tracing::info!(owner_id, memory_id, "no facts extracted");
      return Ok(AddMemoryOutcome {
        event: "NONE".to_owned(),
        trace_id: None,
        memory_id: Some(memory_id),
        facts_count: 0,
        summary: ExecutionSummary::default(),
      });
    }

    let fact_texts: Vec<String> = drafts.iter().map(|d| d.content.clone()).collect();

    if skip_judge {
      let operations: Vec<Operation> = fact_texts
        .iter()
        .enumerate()
        .map(|(i, text)| Operation::Add {
          id: i.to_string(),
          text: text.clone(),
        })
        .collect();

      let summary = self
        .apply_operations(owner_id, &operations, &[], &drafts, &metadata, Some(memory_id))
        .await?;

      return Ok(AddMemoryOutcome {
        event: "ADD".to_owned(),
        trace_id: None,
        memory_id: Some(memory_id),
        facts_count: drafts.len(),
        summary,
      });
    }

    let candidates = self.search_related_memories(owner_id, &fact_texts).await?;
    let judgment = judge(&fact_texts, &candidates).await?;

    // One audit row per judgment invocation, parse failures included.
    self
      .record
      .insert_audit(NewAudit {
        trace_id: judgment.trace_id,
        owner_id: owner_id.to_owned(),
        api_key_id,
        operation_type: "MEMORY_UPDATE".to_owned(),
        input_content: content.to_owned(),
        extracted_facts: serde_json::to_value(&fact_texts).unwrap_or_default(),
        existing_memories: serde_json::to_value(&candidates).unwrap_or_default(),
        llm_response: judgment.raw_response.clone(),
        parsed_operations: judgment.parsed_operations.clone(),
        reasoning: judgment.reasoning.clone(),
        execution_success: judgment.success,
        error_message: judgment.error.clone(),
        model_name: judgment.model_name.clone(),
        latency_ms: judgment.latency_ms,
      })
      .await?;

    let summary = self
      .apply_operations(
        owner_id,
        &judgment.operations,
        &candidates,
        &drafts,
        &metadata,
        Some(memory_id),
      )
      .await?;

    // NONE-only judgments still record their (all-zero) execution
    // summary; audit coverage is unconditional.
    self
      .record
      .update_audit_executed(
        judgment.trace_id,
        serde_json::to_value(&summary).unwrap_or_default(),
      )
      .await?;

    Ok(AddMemoryOutcome {
      event: "PROCESSED".to_owned(),
      trace_id: Some(judgment.trace_id),
      memory_id: Some(memory_id),
      facts_count: drafts.len(),
      summary,
    })
  }

  /// Nearest existing facts for a batch of new fact texts, deduplicated
  /// across per-fact queries and ordered by descending score.
  pub async fn search_related_memories(
    &self,
    owner_id: &str,
    fact_texts: &[String],
  ) -> Result<Vec<CandidateMemory>, EngineError> {
    if fact_texts.is_empty() {
      return Ok(vec![]);
    }

    let embeddings = self.embedder.embed_many(fact_texts).await?;

    let mut seen: Vec<CandidateMemory> = Vec::new();
    for embedding in embeddings {
      let hits = self
        .vector
        .query(owner_id, embedding, JUDGE_TOP_K, Some(JUDGE_SCORE_FLOOR))
        .await?;

      for hit in hits {
        if seen.iter().any(|c| c.vector_id == hit.id) {
          continue;
        }
        seen.push(CandidateMemory {
          display_id: String::new(),
          text: hit.content,
          vector_id: hit.id,
          fact_id: hit.fact_id,
          category: hit.category,
          importance: hit.importance,
          entities: hit
            .entity_names
            .iter()
            .map(|name| EntityRef::new(name.clone(), "entity"))
            .collect(),
          relations: hit
            .relations
            .iter()
            .filter_map(|s| RelationRef::from_payload_string(s))
            .collect(),
          score: hit.score,
        });
      }
    }

    seen.sort_by(|a, b| b.score.total_cmp(&a.score));
    for (i, candidate) in seen.iter_mut().enumerate() {
      candidate.display_id = i.to_string();
    }

    tracing::info!(
      owner_id,
      candidates = seen.len(),
      score_floor = JUDGE_SCORE_FLOOR,
      "related memories retrieved"
    );

    Ok(seen)
  }

  /// Bulk ingest: extraction fans out under a semaphore, embeddings go
  /// through one batch call, then graph and vector writes land before
  /// the relational rows. A failed relational insert compensates by
  /// deleting that item's already-written vector point.
  pub async fn add_memories_batch(
    &self,
    owner_id: &str,
    contents: &[String],
    metadatas: &[serde_json::Value],
    api_key_id: Option<i64>,
  ) -> Result<BatchOutcome, EngineError> {
    if contents.is_empty() {
      return Err(EngineError::PermanentReject("batch is empty".to_owned()));
    }
    if let [single] = contents {
      let metadata = metadatas.first().cloned().unwrap_or(serde_json::json!({}));
      let outcome = self
        .add_memory(owner_id, single, metadata, false, api_key_id)
        .await?;
      return Ok(BatchOutcome {
        stored: outcome.summary.added,
        failures: vec![],
        stats: outcome.summary.stats,
      });
    }

    let semaphore = Arc::new(Semaphore::new(BATCH_EXTRACTION_CONCURRENCY));
    let extractions: Vec<crate::ExtractedGraph> = try_join_all(contents.iter().map(|content| {
      let semaphore = Arc::clone(&semaphore);
      async move {
        let _permit = semaphore
          .acquire()
          .await
          .map_err(EngineError::transient)?;
        self.extractor.extract(owner_id, content).await
      }
    }))
    .await?;

    for graph in &extractions {
      for entity in &graph.entities {
        self
          .graph
          .upsert_entity(
            &mnemo_shared::EntityKey::new(owner_id, entity.name.clone()),
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
    }

    let embeddings = self.embedder.embed_many(contents).await?;
    let vector_ids: Vec<VectorId> = contents.iter().map(|_| VectorId::generate()).collect();

    let records: Vec<VectorRecord> = contents
      .iter()
      .zip(embeddings)
      .zip(&vector_ids)
      .enumerate()
      .map(|(i, ((content, vector), id))| VectorRecord {
        id: *id,
        vector,
        payload: VectorPayload {
          owner_id: owner_id.to_owned(),
          content: content.clone(),
          metadata: metadatas.get(i).cloned().unwrap_or(serde_json::json!({})),
          entity_names: extractions[i].entities.iter().map(|e| e.name.clone()).collect(),
          relations: extractions[i]
            .relations
            .iter()
            .map(RelationRef::to_payload_string)
            .collect(),
          category: "fact".to_owned(),
          importance: "medium".to_owned(),
          fact_id: None,
        },
      })
      .collect();

    self.vector.upsert(owner_id, records).await?;

    let mut stored = Vec::new();
    let mut failures = Vec::new();
    for (i, content) in contents.iter().enumerate() {
      let inserted = self
        .record
        .insert_fact(mnemo_stores::NewFact {
          memory_id: None,
          owner_id: owner_id.to_owned(),
          content: content.clone(),
          category: "fact".to_owned(),
          importance: "medium".to_owned(),
          vector_id: vector_ids[i],
          entities: serde_json::to_value(&extractions[i].entities).unwrap_or_default(),
          relations: serde_json::to_value(&extractions[i].relations).unwrap_or_default(),
        })
        .await;

      match inserted {
        Ok(model) => {
          stored.push(ExecutedItem {
            vector_id: vector_ids[i],
            fact_id: Some(mnemo_shared::FactId::new(model.id)),
            content: content.clone(),
            entities: extractions[i].entities.clone(),
            relations: extractions[i].relations.clone(),
          });
          tracing::info!(
            owner_id,
            item = i + 1,
            total = contents.len(),
            "batch item persisted"
          );
        }
        Err(err) => {
          // The point landed before the row failed; remove it so the
          // index never references a fact that does not exist.
          if let Err(cleanup) = self.vector.delete(owner_id, &[vector_ids[i]]).await {
            tracing::error!(owner_id, item = i + 1, error = %cleanup, "vector compensation failed");
          } else {
            tracing::warn!(owner_id, item = i + 1, "compensated vector write");
          }
          tracing::error!(owner_id, item = i + 1, error = %err, "batch item failed");
          failures.push(BatchItemFailure {
            index: i,
            error: err.to_string(),
          });
        }
      }
    }

    if stored.is_empty() {
      return Err(EngineError::fatal(anyhow::anyhow!(
        "all {} batch items failed",
        contents.len()
      )));
    }

    let stats = ExecutionStats {
      added_count: stored.len(),
      updated_count: 0,
      deleted_count: 0,
      none_count: 0,
      failed_count: failures.len(),
    };

    Ok(BatchOutcome {
      stored,
      failures,
      stats,
    })
  }
}

/// Result of the single-content pipeline.
#[derive(Debug, Serialize, ToSchema)]
pub struct AddMemoryOutcome {
  /// NONE (no facts), ADD (skip-judge) or PROCESSED (judged).
  pub event: String,
  pub trace_id: Option<Uuid>,
  pub memory_id: Option<i64>,
  pub facts_count: usize,
  pub summary: ExecutionSummary,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchItemFailure {
  pub index: usize,
  pub error: String,
}

/// Result of the bulk-ingest pipeline.
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchOutcome {
  pub stored: Vec<ExecutedItem>,
  pub failures: Vec<BatchItemFailure>,
  pub stats: ExecutionStats,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ExtractedGraph;
  use crate::fakes::{
    FakeEmbedder, FakeExtractor, FakeGraphStore, FakeRecordStore, FakeVectorStore,
  };

  const OWNER: &str = "owner-1";

  fn engine_with(
    extractor: FakeExtractor,
  ) -> MemoryEngine<FakeVectorStore, FakeGraphStore, FakeRecordStore, FakeExtractor, FakeEmbedder>
  {
    MemoryEngine::with_parts(
      FakeVectorStore::default(),
      FakeGraphStore::default(),
      FakeRecordStore::default(),
      extractor,
      FakeEmbedder,
    )
  }

  fn contents(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
  }

  #[tokio::test]
  async fn batch_persists_all_items_and_links_graph() {
    let graph = ExtractedGraph {
      entities: vec![
        EntityRef::new("USER", "person"),
        EntityRef::new("Rust", "skill"),
      ],
      relations: vec![RelationRef::new("USER", "learns", "Rust")],
    };
    let engine = engine_with(FakeExtractor::default().with_graph("Learning Rust", graph));
    let batch = contents(&["Learning Rust", "Enjoys hiking", "Lives in Lyon"]);

    let outcome = engine
      .add_memories_batch(OWNER, &batch, &[], None)
      .await
      .unwrap();

    assert_eq!(outcome.stored.len(), 3);
    assert!(outcome.failures.is_empty());
    assert_eq!(engine.record.fact_count(), 3);
    assert_eq!(engine.vector.point_count(OWNER), 3);
    assert!(engine.graph.has_edge(OWNER, "USER", "Rust", "learns"));
    for item in &outcome.stored {
      assert!(item.fact_id.is_some());
    }
  }

  #[tokio::test]
  async fn batch_compensates_vector_writes_for_failed_rows() {
    let engine = engine_with(FakeExtractor::default());
    // Two rows land, the third relational insert fails.
    *engine.record.fail_fact_inserts_after.lock().unwrap() = Some(2);

    let batch = contents(&["item one", "item two", "item three"]);
    let outcome = engine
      .add_memories_batch(OWNER, &batch, &[], None)
      .await
      .unwrap();

    assert_eq!(outcome.stored.len(), 2);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.stats.failed_count, 1);
    assert!(outcome.stats.added_count <= 2);
    // The failed item's point was rolled back; the index never points
    // at a fact that does not exist.
    assert_eq!(engine.vector.point_count(OWNER), 2);
    assert_eq!(engine.record.fact_count(), 2);
  }

  #[tokio::test]
  async fn batch_of_only_failures_is_an_error() {
    let engine = engine_with(FakeExtractor::default());
    *engine.record.fail_fact_inserts_after.lock().unwrap() = Some(0);

    let batch = contents(&["a", "b"]);
    let result = engine.add_memories_batch(OWNER, &batch, &[], None).await;
    assert!(result.is_err());
    assert_eq!(engine.vector.point_count(OWNER), 0);
  }

  #[tokio::test]
  async fn empty_batch_is_rejected_synchronously() {
    let engine = engine_with(FakeExtractor::default());
    let err = engine
      .add_memories_batch(OWNER, &[], &[], None)
      .await
      .unwrap_err();
    assert_eq!(err.kind(), "PermanentReject");
  }

  #[tokio::test]
  async fn related_memories_dedupe_and_rank_by_score() {
    use mnemo_stores::{VectorPayload, VectorRecord};

    let engine = engine_with(FakeExtractor::default());
    let text = "User likes green tea";
    let matching = VectorId::generate();
    let unrelated = VectorId::generate();

    let payload = |content: &str, fact_id: i64| VectorPayload {
      owner_id: OWNER.to_owned(),
      content: content.to_owned(),
      metadata: serde_json::json!({}),
      entity_names: vec!["USER".to_owned(), "green tea".to_owned()],
      relations: vec!["USER-likes-green tea".to_owned()],
      category: "preference".to_owned(),
      importance: "medium".to_owned(),
      fact_id: Some(fact_id),
    };

    engine
      .vector
      .upsert(
        OWNER,
        vec![
          VectorRecord {
            id: matching,
            vector: FakeEmbedder::vector_for(text),
            payload: payload(text, 1),
          },
          VectorRecord {
            id: unrelated,
            // Opposite direction: cosine -1, safely under the floor.
            vector: FakeEmbedder::vector_for(text)
              .into_iter()
              .map(|x| -x)
              .collect(),
            payload: payload("something else entirely", 2),
          },
        ],
      )
      .await
      .unwrap();

    // The same fact queried twice must surface one candidate.
    let facts = contents(&[text, text]);
    let candidates = engine.search_related_memories(OWNER, &facts).await.unwrap();

    assert_eq!(candidates.len(), 1);
    let top = &candidates[0];
    assert_eq!(top.display_id, "0");
    assert_eq!(top.vector_id, matching);
    assert!(top.score > 0.99);
    assert_eq!(top.relations[0].target, "green tea");
    assert_eq!(top.entities.len(), 2);
  }
}
