//! In-memory store and gateway doubles for exercising the executor and
//! retrieval composer without live services.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::Utc;
use mnemo_entities::{fact, judgment_audit, memory};
use mnemo_shared::{EngineError, EntityKey, FactId, VectorId};
use mnemo_stores::{
  GraphStore, NewAudit, NewFact, RecordStore, VectorHit, VectorRecord, VectorStore,
  sanitize_relation_type,
};
use uuid::Uuid;

use crate::extraction::{ExtractedGraph, GraphExtractor};
use crate::Embedder;

fn cosine(a: &[f32], b: &[f32]) -> f32 {
  let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
  let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
  let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
  if na < 1e-9 || nb < 1e-9 { 0.0 } else { dot / (na * nb) }
}

// ──────────────────────────────────────────────────
// Vector store
// ──────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeVectorStore {
  points: Mutex<HashMap<String, HashMap<Uuid, VectorRecord>>>,
}

impl FakeVectorStore {
  pub fn point_count(&self, owner_id: &str) -> usize {
    self
      .points
      .lock()
      .unwrap()
      .get(owner_id)
      .map_or(0, HashMap::len)
  }

  pub fn has_point(&self, owner_id: &str, id: VectorId) -> bool {
    self
      .points
      .lock()
      .unwrap()
      .get(owner_id)
      .is_some_and(|m| m.contains_key(&id.as_uuid()))
  }

  pub fn content_of(&self, owner_id: &str, id: VectorId) -> Option<String> {
    self
      .points
      .lock()
      .unwrap()
      .get(owner_id)
      .and_then(|m| m.get(&id.as_uuid()))
      .map(|r| r.payload.content.clone())
  }
}

impl VectorStore for FakeVectorStore {
  async fn ensure_collection(&self, owner_id: &str) -> Result<(), EngineError> {
    self
      .points
      .lock()
      .unwrap()
      .entry(owner_id.to_owned())
      .or_default();
    Ok(())
  }

  async fn upsert(&self, owner_id: &str, records: Vec<VectorRecord>) -> Result<(), EngineError> {
    let mut points = self.points.lock().unwrap();
    let collection = points.entry(owner_id.to_owned()).or_default();
    for record in records {
      collection.insert(record.id.as_uuid(), record);
    }
    Ok(())
  }

  async fn delete(&self, owner_id: &str, ids: &[VectorId]) -> Result<(), EngineError> {
    let mut points = self.points.lock().unwrap();
    if let Some(collection) = points.get_mut(owner_id) {
      for id in ids {
        collection.remove(&id.as_uuid());
      }
    }
    Ok(())
  }

  async fn query(
    &self,
    owner_id: &str,
    vector: Vec<f32>,
    k: u64,
    score_floor: Option<f32>,
  ) -> Result<Vec<VectorHit>, EngineError> {
    let points = self.points.lock().unwrap();
    let mut hits: Vec<VectorHit> = points
      .get(owner_id)
      .map(|collection| {
        collection
          .values()
          .filter(|r| r.payload.owner_id == owner_id)
          .map(|r| VectorHit {
            id: r.id,
            score: cosine(&vector, &r.vector),
            content: r.payload.content.clone(),
            entity_names: r.payload.entity_names.clone(),
            relations: r.payload.relations.clone(),
            category: r.payload.category.clone(),
            importance: r.payload.importance.clone(),
            fact_id: r.payload.fact_id.map(FactId::new),
          })
          .collect()
      })
      .unwrap_or_default();

    if let Some(floor) = score_floor {
      hits.retain(|h| h.score >= floor);
    }
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(k as usize);
    Ok(hits)
  }
}

// ──────────────────────────────────────────────────
// Graph store
// ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
struct Edge {
  owner_id: String,
  source: String,
  target: String,
  rel_type: String,
}

#[derive(Default)]
pub struct FakeGraphStore {
  nodes: Mutex<HashSet<(String, String)>>,
  edges: Mutex<Vec<Edge>>,
}

impl FakeGraphStore {
  pub fn has_node(&self, owner_id: &str, name: &str) -> bool {
    self
      .nodes
      .lock()
      .unwrap()
      .contains(&(owner_id.to_owned(), name.to_owned()))
  }

  pub fn has_edge(&self, owner_id: &str, source: &str, target: &str, relation: &str) -> bool {
    let rel_type = sanitize_relation_type(relation);
    self.edges.lock().unwrap().iter().any(|e| {
      e.owner_id == owner_id
        && e.rel_type == rel_type
        && ((e.source == source && e.target == target)
          || (e.source == target && e.target == source))
    })
  }

  pub fn edge_count(&self) -> usize {
    self.edges.lock().unwrap().len()
  }
}

impl GraphStore for FakeGraphStore {
  async fn upsert_entity(
    &self,
    key: &EntityKey,
    _entity_type: &str,
    _properties: Option<&serde_json::Value>,
  ) -> Result<(), EngineError> {
    self
      .nodes
      .lock()
      .unwrap()
      .insert((key.owner_id.clone(), key.name.clone()));
    Ok(())
  }

  async fn upsert_edge(
    &self,
    owner_id: &str,
    source: &str,
    target: &str,
    relation: &str,
  ) -> Result<(), EngineError> {
    // Like the Cypher MATCH, a merge between missing nodes is a no-op.
    let nodes = self.nodes.lock().unwrap();
    let both_exist = nodes.contains(&(owner_id.to_owned(), source.to_owned()))
      && nodes.contains(&(owner_id.to_owned(), target.to_owned()));
    drop(nodes);
    if !both_exist {
      return Ok(());
    }

    let edge = Edge {
      owner_id: owner_id.to_owned(),
      source: source.to_owned(),
      target: target.to_owned(),
      rel_type: sanitize_relation_type(relation),
    };
    let mut edges = self.edges.lock().unwrap();
    if !edges.contains(&edge) {
      edges.push(edge);
    }
    Ok(())
  }

  async fn delete_edge(
    &self,
    owner_id: &str,
    source: &str,
    target: &str,
    relation: &str,
  ) -> Result<(), EngineError> {
    let rel_type = sanitize_relation_type(relation);
    self.edges.lock().unwrap().retain(|e| {
      !(e.owner_id == owner_id
        && e.rel_type == rel_type
        && ((e.source == source && e.target == target)
          || (e.source == target && e.target == source)))
    });
    Ok(())
  }

  async fn delete_entity_total(&self, key: &EntityKey) -> Result<(), EngineError> {
    self
      .edges
      .lock()
      .unwrap()
      .retain(|e| !(e.owner_id == key.owner_id && (e.source == key.name || e.target == key.name)));
    self
      .nodes
      .lock()
      .unwrap()
      .remove(&(key.owner_id.clone(), key.name.clone()));
    Ok(())
  }

  async fn count_incident(&self, key: &EntityKey) -> Result<u64, EngineError> {
    let count = self
      .edges
      .lock()
      .unwrap()
      .iter()
      .filter(|e| e.owner_id == key.owner_id && (e.source == key.name || e.target == key.name))
      .count();
    Ok(count as u64)
  }

  async fn neighbors(&self, key: &EntityKey, limit: u64) -> Result<Vec<String>, EngineError> {
    let mut names: Vec<String> = Vec::new();
    for edge in self.edges.lock().unwrap().iter() {
      if edge.owner_id != key.owner_id {
        continue;
      }
      let other = if edge.source == key.name {
        &edge.target
      } else if edge.target == key.name {
        &edge.source
      } else {
        continue;
      };
      if !names.contains(other) {
        names.push(other.clone());
      }
    }
    names.truncate(limit as usize);
    Ok(names)
  }
}

// ──────────────────────────────────────────────────
// Record store
// ──────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeRecordStore {
  memories: Mutex<Vec<memory::Model>>,
  facts: Mutex<Vec<fact::Model>>,
  audits: Mutex<Vec<judgment_audit::Model>>,
  next_id: Mutex<i64>,
  /// When set to `Some(n)`, the next `n` fact inserts succeed and every
  /// insert after them fails with a transient error.
  pub fail_fact_inserts_after: Mutex<Option<usize>>,
}

impl FakeRecordStore {
  fn bump(&self) -> i64 {
    let mut next = self.next_id.lock().unwrap();
    *next += 1;
    *next
  }

  pub fn fact_count(&self) -> usize {
    self.facts.lock().unwrap().len()
  }

  pub fn audit_count(&self) -> usize {
    self.audits.lock().unwrap().len()
  }

  pub fn audit_by_trace(&self, trace_id: Uuid) -> Option<judgment_audit::Model> {
    self
      .audits
      .lock()
      .unwrap()
      .iter()
      .find(|a| a.trace_id == trace_id)
      .cloned()
  }

  pub fn fact(&self, id: FactId) -> Option<fact::Model> {
    self
      .facts
      .lock()
      .unwrap()
      .iter()
      .find(|f| f.id == id.get())
      .cloned()
  }

  /// Seed a pre-existing fact row, returning its id.
  pub fn seed_fact(
    &self,
    owner_id: &str,
    content: &str,
    vector_id: VectorId,
    entities: serde_json::Value,
    relations: serde_json::Value,
  ) -> FactId {
    let id = self.bump();
    self.facts.lock().unwrap().push(fact::Model {
      id,
      memory_id: None,
      owner_id: owner_id.to_owned(),
      content: content.to_owned(),
      category: "fact".to_owned(),
      importance: "medium".to_owned(),
      vector_id: vector_id.as_uuid(),
      entities,
      relations,
      created_at: Utc::now().into(),
    });
    FactId::new(id)
  }
}

impl RecordStore for FakeRecordStore {
  async fn insert_memory(
    &self,
    owner_id: &str,
    content: &str,
    metadata: serde_json::Value,
  ) -> Result<i64, EngineError> {
    let id = self.bump();
    let now = Utc::now();
    self.memories.lock().unwrap().push(memory::Model {
      id,
      owner_id: owner_id.to_owned(),
      content: content.to_owned(),
      metadata,
      created_at: now.into(),
      updated_at: now.into(),
    });
    Ok(id)
  }

  async fn insert_fact(&self, new: NewFact) -> Result<fact::Model, EngineError> {
    {
      let mut gate = self.fail_fact_inserts_after.lock().unwrap();
      if let Some(remaining) = gate.as_mut() {
        if *remaining == 0 {
          return Err(EngineError::transient(anyhow::anyhow!(
            "injected insert failure"
          )));
        }
        *remaining -= 1;
      }
    }

    let mut facts = self.facts.lock().unwrap();
    if facts.iter().any(|f| f.vector_id == new.vector_id.as_uuid()) {
      return Err(EngineError::StoreConflict(format!(
        "duplicate vector id {}",
        new.vector_id
      )));
    }

    let model = fact::Model {
      id: self.bump(),
      memory_id: new.memory_id,
      owner_id: new.owner_id,
      content: new.content,
      category: new.category,
      importance: new.importance,
      vector_id: new.vector_id.as_uuid(),
      entities: new.entities,
      relations: new.relations,
      created_at: Utc::now().into(),
    };
    facts.push(model.clone());
    Ok(model)
  }

  async fn update_fact(
    &self,
    id: FactId,
    content: &str,
    entities: serde_json::Value,
    relations: serde_json::Value,
  ) -> Result<(), EngineError> {
    let mut facts = self.facts.lock().unwrap();
    let Some(fact) = facts.iter_mut().find(|f| f.id == id.get()) else {
      return Err(EngineError::NotFound(format!("fact {id} not found")));
    };
    fact.content = content.to_owned();
    fact.entities = entities;
    fact.relations = relations;
    Ok(())
  }

  async fn delete_fact(&self, id: FactId) -> Result<bool, EngineError> {
    let mut facts = self.facts.lock().unwrap();
    let before = facts.len();
    facts.retain(|f| f.id != id.get());
    Ok(facts.len() < before)
  }

  async fn fact_by_vector_id(
    &self,
    owner_id: &str,
    vector_id: VectorId,
  ) -> Result<Option<fact::Model>, EngineError> {
    Ok(
      self
        .facts
        .lock()
        .unwrap()
        .iter()
        .find(|f| f.owner_id == owner_id && f.vector_id == vector_id.as_uuid())
        .cloned(),
    )
  }

  async fn facts_by_vector_ids(
    &self,
    owner_id: &str,
    ids: &[VectorId],
  ) -> Result<Vec<fact::Model>, EngineError> {
    let wanted: HashSet<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
    Ok(
      self
        .facts
        .lock()
        .unwrap()
        .iter()
        .filter(|f| f.owner_id == owner_id && wanted.contains(&f.vector_id))
        .cloned()
        .collect(),
    )
  }

  async fn facts_by_owner(&self, owner_id: &str) -> Result<Vec<fact::Model>, EngineError> {
    Ok(
      self
        .facts
        .lock()
        .unwrap()
        .iter()
        .filter(|f| f.owner_id == owner_id)
        .cloned()
        .collect(),
    )
  }

  async fn insert_audit(&self, audit: NewAudit) -> Result<(), EngineError> {
    let model = judgment_audit::Model {
      id: self.bump(),
      trace_id: audit.trace_id,
      owner_id: audit.owner_id,
      api_key_id: audit.api_key_id,
      operation_type: audit.operation_type,
      input_content: audit.input_content,
      extracted_facts: audit.extracted_facts,
      existing_memories: audit.existing_memories,
      llm_response: audit.llm_response,
      parsed_operations: audit.parsed_operations,
      reasoning: audit.reasoning,
      executed_operations: serde_json::json!({}),
      execution_success: audit.execution_success,
      error_message: audit.error_message,
      model_name: audit.model_name,
      latency_ms: audit.latency_ms,
      created_at: Utc::now().into(),
      is_verified: false,
    };
    self.audits.lock().unwrap().push(model);
    Ok(())
  }

  async fn update_audit_executed(
    &self,
    trace_id: Uuid,
    executed: serde_json::Value,
  ) -> Result<(), EngineError> {
    let mut audits = self.audits.lock().unwrap();
    let Some(audit) = audits.iter_mut().find(|a| a.trace_id == trace_id) else {
      return Err(EngineError::NotFound(format!("audit {trace_id} not found")));
    };
    audit.executed_operations = executed;
    Ok(())
  }
}

// ──────────────────────────────────────────────────
// Gateway doubles
// ──────────────────────────────────────────────────

/// Returns canned graphs per exact text; anything else extracts empty.
#[derive(Default)]
pub struct FakeExtractor {
  graphs: HashMap<String, ExtractedGraph>,
}

impl FakeExtractor {
  pub fn with_graph(mut self, text: &str, graph: ExtractedGraph) -> Self {
    self.graphs.insert(text.to_owned(), graph);
    self
  }
}

impl GraphExtractor for FakeExtractor {
  async fn extract(&self, _owner_id: &str, text: &str) -> Result<ExtractedGraph, EngineError> {
    Ok(self.graphs.get(text).cloned().unwrap_or_default())
  }
}

/// Deterministic embeddings: identical text embeds identically, and
/// distinct text lands (almost surely) far apart.
#[derive(Default)]
pub struct FakeEmbedder;

impl FakeEmbedder {
  pub fn vector_for(text: &str) -> Vec<f32> {
    let mut state: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.bytes() {
      state ^= u64::from(byte);
      state = state.wrapping_mul(0x0000_0100_0000_01b3);
    }
    let mut vector = Vec::with_capacity(8);
    for _ in 0..8 {
      state ^= state << 13;
      state ^= state >> 7;
      state ^= state << 17;
      vector.push(((state % 2000) as f32 / 1000.0) - 1.0);
    }
    vector
  }
}

impl Embedder for FakeEmbedder {
  async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError> {
    Ok(Self::vector_for(text))
  }

  async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
    Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
  }
}
