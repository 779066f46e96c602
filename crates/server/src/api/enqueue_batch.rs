use apalis::prelude::TaskSink;
use axum::{Json, extract::State};
use mnemo_shared::{AppError, EngineError};
use mnemo_worker::{BatchAddMemoryJob, MemoryJob, SubscriptionTier};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::utils::AppState;

/// Hard cap on batch size; larger submissions must be split by the
/// caller.
pub const MAX_BATCH_SIZE: usize = 200;

#[derive(Debug, Deserialize, ToSchema)]
pub struct EnqueueBatch {
  pub owner_id: String,
  pub items: Vec<String>,
  #[serde(default)]
  #[schema(value_type = Object)]
  pub shared_metadata: Option<serde_json::Value>,
  #[serde(default)]
  pub api_key_id: Option<i64>,
  #[serde(default)]
  #[schema(value_type = String)]
  pub tier: SubscriptionTier,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EnqueuedBatch {
  pub task_id: Uuid,
  pub queued_count: usize,
}

/// Enqueue a batch of memories for bulk ingestion
#[utoipa::path(
  post,
  path = "/api/v0/memories/batch",
  request_body = EnqueueBatch,
  responses(
    (status = 200, description = "Batch task enqueued", body = EnqueuedBatch),
    (status = 400, description = "Batch empty, over the 200-item cap, or an item is empty")
  )
)]
#[axum::debug_handler]
#[tracing::instrument(skip(state, payload), fields(owner_id = %payload.owner_id, items = payload.items.len()))]
pub async fn batch_add_memory(
  State(state): State<AppState>,
  Json(payload): Json<EnqueueBatch>,
) -> Result<Json<EnqueuedBatch>, AppError> {
  if payload.items.is_empty() {
    return Err(AppError::engine(EngineError::PermanentReject(
      "batch cannot be empty".to_owned(),
    )));
  }
  if payload.items.len() > MAX_BATCH_SIZE {
    return Err(AppError::engine(EngineError::PermanentReject(format!(
      "batch of {} exceeds the {MAX_BATCH_SIZE}-item cap; split the submission",
      payload.items.len()
    ))));
  }
  if payload.items.iter().any(|item| item.trim().is_empty()) {
    return Err(AppError::engine(EngineError::PermanentReject(
      "batch items cannot be empty".to_owned(),
    )));
  }

  let queued_count = payload.items.len();
  let metadata = payload.shared_metadata.unwrap_or(serde_json::json!({}));
  let metadatas = vec![metadata; queued_count];

  let task_id = Uuid::new_v4();
  let job = MemoryJob::BatchAdd(BatchAddMemoryJob {
    task_id,
    owner_id: payload.owner_id,
    contents: payload.items,
    metadatas,
    api_key_id: payload.api_key_id,
  });

  let mut storage = state.storage_for(payload.tier);
  storage.push(job).await?;

  Ok(Json(EnqueuedBatch {
    task_id,
    queued_count,
  }))
}
