use apalis::prelude::TaskSink;
use axum::{Json, extract::State};
use mnemo_shared::{AppError, EngineError};
use mnemo_worker::{AddMemoryJob, MemoryJob, SubscriptionTier};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::utils::AppState;

fn default_metadata() -> serde_json::Value {
  serde_json::json!({})
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EnqueueMemory {
  pub owner_id: String,
  pub content: String,
  #[serde(default = "default_metadata")]
  #[schema(value_type = Object)]
  pub metadata: serde_json::Value,
  /// Trusted import: every extracted fact is ADDed without judgment.
  #[serde(default)]
  pub skip_judge: bool,
  #[serde(default)]
  pub api_key_id: Option<i64>,
  #[serde(default)]
  #[schema(value_type = String)]
  pub tier: SubscriptionTier,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EnqueuedTask {
  pub task_id: Uuid,
}

pub(super) async fn enqueue_add(
  state: &AppState,
  payload: EnqueueMemory,
) -> Result<EnqueuedTask, AppError> {
  if payload.content.trim().is_empty() {
    return Err(AppError::engine(EngineError::PermanentReject(
      "content cannot be empty".to_owned(),
    )));
  }

  let task_id = Uuid::new_v4();
  let job = MemoryJob::Add(AddMemoryJob {
    task_id,
    owner_id: payload.owner_id,
    content: payload.content,
    metadata: payload.metadata,
    skip_judge: payload.skip_judge,
    api_key_id: payload.api_key_id,
  });

  let mut storage = state.storage_for(payload.tier);
  storage.push(job).await?;

  Ok(EnqueuedTask { task_id })
}

/// Enqueue a memory for ingestion
#[utoipa::path(
  post,
  path = "/api/v0/memories",
  request_body = EnqueueMemory,
  responses(
    (status = 200, description = "Task enqueued", body = EnqueuedTask),
    (status = 400, description = "Content cannot be empty")
  )
)]
#[axum::debug_handler]
#[tracing::instrument(skip(state, payload), fields(owner_id = %payload.owner_id))]
pub async fn add_memory(
  State(state): State<AppState>,
  Json(payload): Json<EnqueueMemory>,
) -> Result<Json<EnqueuedTask>, AppError> {
  Ok(Json(enqueue_add(&state, payload).await?))
}

/// Submit new content that refines existing memories.
///
/// A thin wrapper over the add pipeline: the judgment model decides
/// which memories the content updates.
#[utoipa::path(
  put,
  path = "/api/v0/memories",
  request_body = EnqueueMemory,
  responses(
    (status = 200, description = "Task enqueued", body = EnqueuedTask),
    (status = 400, description = "Content cannot be empty")
  )
)]
#[axum::debug_handler]
#[tracing::instrument(skip(state, payload), fields(owner_id = %payload.owner_id))]
pub async fn update_memory(
  State(state): State<AppState>,
  Json(payload): Json<EnqueueMemory>,
) -> Result<Json<EnqueuedTask>, AppError> {
  Ok(Json(enqueue_add(&state, payload).await?))
}

/// Submit contradicting content so the judgment model deletes what it
/// disproves.
#[utoipa::path(
  post,
  path = "/api/v0/memories/forget",
  request_body = EnqueueMemory,
  responses(
    (status = 200, description = "Task enqueued", body = EnqueuedTask),
    (status = 400, description = "Content cannot be empty")
  )
)]
#[axum::debug_handler]
#[tracing::instrument(skip(state, payload), fields(owner_id = %payload.owner_id))]
pub async fn forget_memory(
  State(state): State<AppState>,
  Json(payload): Json<EnqueueMemory>,
) -> Result<Json<EnqueuedTask>, AppError> {
  Ok(Json(enqueue_add(&state, payload).await?))
}
