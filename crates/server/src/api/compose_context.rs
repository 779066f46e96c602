use axum::{Json, extract::State};
use mnemo_core::ContextResult;
use mnemo_shared::AppError;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::utils::AppState;

const fn default_limit() -> u64 {
  10
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchMemory {
  pub owner_id: String,
  /// Search query text
  pub query: String,
  /// Maximum direct hits to return
  #[serde(default = "default_limit")]
  pub limit: u64,
}

/// Compose a ranked memory context for a query
#[utoipa::path(
  post,
  path = "/api/v0/memories/search",
  request_body = SearchMemory,
  responses(
    (status = 200, description = "Vector hits, related memories and entities", body = ContextResult),
    (status = 400, description = "Query cannot be empty")
  )
)]
#[axum::debug_handler]
#[tracing::instrument(skip(state, payload), fields(owner_id = %payload.owner_id))]
pub async fn search_memory(
  State(state): State<AppState>,
  Json(payload): Json<SearchMemory>,
) -> Result<Json<ContextResult>, AppError> {
  let context = state
    .engine
    .compose_context(&payload.owner_id, &payload.query, payload.limit)
    .await
    .map_err(AppError::engine)?;

  Ok(Json(context))
}
