use axum::{
  Json,
  extract::{Path, State},
};
use mnemo_shared::{AppError, EngineError};
use sea_orm::{ConnectionTrait, DbBackend, FromQueryResult, Statement};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::utils::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskStatusResponse {
  /// PENDING, STARTED, SUCCESS, FAILURE or RETRY
  pub status: String,
  pub attempts: i32,
  pub error: Option<String>,
}

#[derive(Debug, FromQueryResult)]
struct JobRow {
  status: String,
  attempts: i32,
  last_error: Option<String>,
}

/// Map the broker's task states onto the status contract.
fn map_status(broker_status: &str) -> &'static str {
  match broker_status {
    "Running" => "STARTED",
    "Done" => "SUCCESS",
    "Failed" | "Killed" => "FAILURE",
    "Retry" => "RETRY",
    _ => "PENDING",
  }
}

/// Poll the status of an enqueued memory task
#[utoipa::path(
  get,
  path = "/api/v0/tasks/{task_id}",
  params(("task_id" = Uuid, Path, description = "Task id returned by an ingest seam")),
  responses(
    (status = 200, description = "Current task state", body = TaskStatusResponse),
    (status = 404, description = "Unknown task id")
  )
)]
#[axum::debug_handler]
pub async fn task_status(
  State(state): State<AppState>,
  Path(task_id): Path<Uuid>,
) -> Result<Json<TaskStatusResponse>, AppError> {
  // Tasks carry their id inside the payload, so the broker table is
  // queried by payload field rather than broker-assigned row id.
  let stmt = Statement::from_sql_and_values(
    DbBackend::Postgres,
    "SELECT status::text AS status, attempts, last_error \
     FROM apalis.jobs WHERE job->>'task_id' = $1 LIMIT 1",
    [task_id.to_string().into()],
  );

  let row = state
    .db
    .query_one_raw(stmt)
    .await
    .map_err(|err| AppError::engine(EngineError::transient(err)))?;

  let Some(row) = row else {
    return Err(AppError::engine(EngineError::NotFound(format!(
      "task {task_id} not found"
    ))));
  };

  let job = JobRow::from_query_result(&row, "")?;

  Ok(Json(TaskStatusResponse {
    status: map_status(&job.status).to_owned(),
    attempts: job.attempts,
    error: job.last_error,
  }))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn broker_states_map_onto_the_status_contract() {
    assert_eq!(map_status("Pending"), "PENDING");
    assert_eq!(map_status("Running"), "STARTED");
    assert_eq!(map_status("Done"), "SUCCESS");
    assert_eq!(map_status("Failed"), "FAILURE");
    assert_eq!(map_status("Killed"), "FAILURE");
    assert_eq!(map_status("Retry"), "RETRY");
    assert_eq!(map_status("whatever"), "PENDING");
  }
}
