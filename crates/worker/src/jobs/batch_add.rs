use mnemo_core::ProdEngine;
use mnemo_shared::EngineError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bulk ingest of up to 200 contents in one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAddMemoryJob {
  pub task_id: Uuid,
  pub owner_id: String,
  pub contents: Vec<String>,
  #[serde(default)]
  pub metadatas: Vec<serde_json::Value>,
  #[serde(default)]
  pub api_key_id: Option<i64>,
}

pub(super) async fn handle_batch(
  job: &BatchAddMemoryJob,
  engine: &ProdEngine,
) -> Result<(), EngineError> {
  let outcome = engine
    .add_memories_batch(&job.owner_id, &job.contents, &job.metadatas, job.api_key_id)
    .await?;

  tracing::info!(
    task_id = %job.task_id,
    owner_id = %job.owner_id,
    stored = outcome.stored.len(),
    failed = outcome.failures.len(),
    "batch task applied"
  );

  Ok(())
}
