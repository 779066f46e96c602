use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use mnemo_shared::{APP_ENV, EngineError, FactId, VectorId};
use qdrant_client::Payload;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
  Condition, CreateCollection, DeletePoints, Distance, Filter, PointStruct, PointsIdsList,
  PointsSelector, ScoredPoint, SearchPoints, UpsertPoints, VectorParams, VectorsConfig,
  WithPayloadSelector, point_id::PointIdOptions, points_selector::PointsSelectorOneOf,
  vectors_config::Config, with_payload_selector::SelectorOptions,
};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::with_store_timeout;

/// Dimensionality of every collection; must match the embedder output.
const VECTOR_SIZE: u64 = 1024;

/// Derive the per-owner collection name. The full sha256 of the owner id
/// keeps names deterministic and collision-free regardless of how owner
/// ids are shaped.
#[must_use]
pub fn collection_for_owner(prefix: &str, owner_id: &str) -> String {
  let digest = Sha256::digest(owner_id.as_bytes());
  format!("{prefix}_{digest:x}")
}

/// Denormalized point payload. The relational fact row stays
/// authoritative; this exists so queries can filter and so judgment
/// candidates carry their old graph shape without a second lookup.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VectorPayload {
  pub owner_id: String,
  pub content: String,
  pub metadata: serde_json::Value,
  pub entity_names: Vec<String>,
  pub relations: Vec<String>,
  pub category: String,
  pub importance: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub fact_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct VectorRecord {
  pub id: VectorId,
  pub vector: Vec<f32>,
  pub payload: VectorPayload,
}

/// One query hit, payload already parsed.
#[derive(Debug, Clone)]
pub struct VectorHit {
  pub id: VectorId,
  pub score: f32,
  pub content: String,
  pub entity_names: Vec<String>,
  pub relations: Vec<String>,
  pub category: String,
  pub importance: String,
  pub fact_id: Option<FactId>,
}

/// Contract over the semantic index. Implementations must scope every
/// operation to the owner's collection.
pub trait VectorStore: Send + Sync {
  fn ensure_collection(
    &self,
    owner_id: &str,
  ) -> impl Future<Output = Result<(), EngineError>> + Send;

  fn upsert(
    &self,
    owner_id: &str,
    records: Vec<VectorRecord>,
  ) -> impl Future<Output = Result<(), EngineError>> + Send;

  fn delete(
    &self,
    owner_id: &str,
    ids: &[VectorId],
  ) -> impl Future<Output = Result<(), EngineError>> + Send;

  fn query(
    &self,
    owner_id: &str,
    vector: Vec<f32>,
    k: u64,
    score_floor: Option<f32>,
  ) -> impl Future<Output = Result<Vec<VectorHit>, EngineError>> + Send;
}

/// Qdrant-backed vector store with lazily created per-owner collections.
#[derive(Clone)]
pub struct QdrantStore {
  client: Arc<Qdrant>,
  prefix: String,
  known_collections: Arc<RwLock<HashSet<String>>>,
}

impl QdrantStore {
  pub fn connect() -> Result<Self, EngineError> {
    let client = Qdrant::from_url(&APP_ENV.qdrant_url)
      .build()
      .map_err(EngineError::fatal)?;

    Ok(Self {
      client: Arc::new(client),
      prefix: APP_ENV.collection_prefix.clone(),
      known_collections: Arc::new(RwLock::new(HashSet::new())),
    })
  }

  fn collection(&self, owner_id: &str) -> String {
    collection_for_owner(&self.prefix, owner_id)
  }

  fn owner_filter(owner_id: &str) -> Filter {
    Filter::must([Condition::matches("owner_id", owner_id.to_owned())])
  }
}

impl VectorStore for QdrantStore {
  /// Idempotent: concurrent creation attempts for the same owner race on
  /// the server-side create, which both treat as success.
  async fn ensure_collection(&self, owner_id: &str) -> Result<(), EngineError> {
    let name = self.collection(owner_id);

    if self.known_collections.read().await.contains(&name) {
      return Ok(());
    }

    let exists = with_store_timeout("qdrant list_collections", async {
      self
        .client
        .list_collections()
        .await
        .map_err(EngineError::transient)
    })
    .await?
    .collections
    .iter()
    .any(|c| c.name == name);

    if !exists {
      let create = CreateCollection {
        collection_name: name.clone(),
        vectors_config: Some(VectorsConfig {
          config: Some(Config::Params(VectorParams {
            size: VECTOR_SIZE,
            distance: Distance::Cosine.into(),
            ..Default::default()
          })),
        }),
        ..Default::default()
      };

      let created = with_store_timeout("qdrant create_collection", async {
        self
          .client
          .create_collection(create)
          .await
          .map_err(EngineError::transient)
      })
      .await;

      match created {
        Ok(_) => {
          tracing::info!(collection = %name, vector_size = VECTOR_SIZE, "created collection");
        }
        // A concurrent worker may have created it between list and create.
        Err(err) if err.to_string().contains("already exists") => {}
        Err(err) => return Err(err),
      }
    }

    self.known_collections.write().await.insert(name);
    Ok(())
  }

  async fn upsert(&self, owner_id: &str, records: Vec<VectorRecord>) -> Result<(), EngineError> {
    if records.is_empty() {
      return Ok(());
    }

    self.ensure_collection(owner_id).await?;
    let name = self.collection(owner_id);

    let mut points = Vec::with_capacity(records.len());
    for record in records {
      let payload_value =
        serde_json::to_value(&record.payload).map_err(EngineError::transient)?;
      let payload = Payload::try_from(payload_value)
        .map_err(|err| EngineError::transient(anyhow!("payload conversion: {err}")))?;
      points.push(PointStruct::new(
        record.id.to_string(),
        record.vector,
        payload,
      ));
    }

    let count = points.len();
    with_store_timeout("qdrant upsert", async {
      self
        .client
        .upsert_points(UpsertPoints {
          collection_name: name.clone(),
          points,
          ..Default::default()
        })
        .await
        .map_err(EngineError::transient)
    })
    .await?;

    tracing::debug!(collection = %name, points = count, "upserted points");
    Ok(())
  }

  async fn delete(&self, owner_id: &str, ids: &[VectorId]) -> Result<(), EngineError> {
    if ids.is_empty() {
      return Ok(());
    }

    let name = self.collection(owner_id);
    let selector = PointsSelector {
      points_selector_one_of: Some(PointsSelectorOneOf::Points(PointsIdsList {
        ids: ids.iter().map(|id| id.to_string().into()).collect(),
      })),
    };

    with_store_timeout("qdrant delete", async {
      self
        .client
        .delete_points(DeletePoints {
          collection_name: name.clone(),
          points: Some(selector),
          ..Default::default()
        })
        .await
        .map_err(EngineError::transient)
    })
    .await?;

    tracing::debug!(collection = %name, points = ids.len(), "deleted points");
    Ok(())
  }

  async fn query(
    &self,
    owner_id: &str,
    vector: Vec<f32>,
    k: u64,
    score_floor: Option<f32>,
  ) -> Result<Vec<VectorHit>, EngineError> {
    self.ensure_collection(owner_id).await?;

    let search = SearchPoints {
      collection_name: self.collection(owner_id),
      vector,
      limit: k,
      score_threshold: score_floor,
      filter: Some(Self::owner_filter(owner_id)),
      with_payload: Some(WithPayloadSelector {
        selector_options: Some(SelectorOptions::Enable(true)),
      }),
      ..Default::default()
    };

    let response = with_store_timeout("qdrant query", async {
      self
        .client
        .search_points(search)
        .await
        .map_err(EngineError::transient)
    })
    .await?;

    Ok(response.result.into_iter().filter_map(parse_hit).collect())
  }
}

fn parse_hit(point: ScoredPoint) -> Option<VectorHit> {
  let id = match point.id?.point_id_options? {
    PointIdOptions::Uuid(uuid) => VectorId::from_uuid(uuid.parse().ok()?),
    PointIdOptions::Num(_) => return None,
  };

  let payload = point.payload;
  let get_str = |key: &str| -> Option<String> {
    payload.get(key).and_then(|v| match &v.kind {
      Some(qdrant_client::qdrant::value::Kind::StringValue(s)) => Some(s.clone()),
      _ => None,
    })
  };
  let get_list = |key: &str| -> Vec<String> {
    payload
      .get(key)
      .and_then(|v| match &v.kind {
        Some(qdrant_client::qdrant::value::Kind::ListValue(list)) => Some(
          list
            .values
            .iter()
            .filter_map(|item| match &item.kind {
              Some(qdrant_client::qdrant::value::Kind::StringValue(s)) => Some(s.clone()),
              _ => None,
            })
            .collect(),
        ),
        _ => None,
      })
      .unwrap_or_default()
  };
  let fact_id = payload.get("fact_id").and_then(|v| match &v.kind {
    Some(qdrant_client::qdrant::value::Kind::IntegerValue(n)) => Some(FactId::new(*n)),
    _ => None,
  });

  Some(VectorHit {
    id,
    score: point.score,
    content: get_str("content").unwrap_or_default(),
    entity_names: get_list("entity_names"),
    relations: get_list("relations"),
    category: get_str("category").unwrap_or_else(|| "fact".to_owned()),
    importance: get_str("importance").unwrap_or_else(|| "medium".to_owned()),
    fact_id,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn collection_name_is_deterministic() {
    let a = collection_for_owner("mem", "user-42");
    let b = collection_for_owner("mem", "user-42");
    assert_eq!(a, b);
    assert!(a.starts_with("mem_"));
  }

  #[test]
  fn collection_name_distinguishes_similar_owners() {
    // The original short-prefix scheme collided on long ids sharing a
    // head; the full hash must not.
    let a = collection_for_owner("mem", "aaaaaaaa-0001");
    let b = collection_for_owner("mem", "aaaaaaaa-0002");
    assert_ne!(a, b);
  }
}
