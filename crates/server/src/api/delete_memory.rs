use axum::{
  Json,
  extract::{Path, Query, State},
};
use mnemo_core::DeleteOutcome;
use mnemo_shared::{AppError, VectorId};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::utils::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteMemoryQuery {
  pub owner_id: String,
}

/// Delete one memory from all three stores by its vector id
#[utoipa::path(
  delete,
  path = "/api/v0/memories/{vector_id}",
  params(
    ("vector_id" = Uuid, Path, description = "Cross-store key of the fact"),
    ("owner_id" = String, Query, description = "Owner the fact belongs to")
  ),
  responses(
    (status = 200, description = "Per-store deletion flags", body = DeleteOutcome)
  )
)]
#[axum::debug_handler]
#[tracing::instrument(skip(state, query), fields(owner_id = %query.owner_id, %vector_id))]
pub async fn delete_memory(
  State(state): State<AppState>,
  Path(vector_id): Path<Uuid>,
  Query(query): Query<DeleteMemoryQuery>,
) -> Result<Json<DeleteOutcome>, AppError> {
  let outcome = state
    .engine
    .delete_memory_complete(&query.owner_id, VectorId::from_uuid(vector_id))
    .await
    .map_err(AppError::engine)?;

  Ok(Json(outcome))
}
