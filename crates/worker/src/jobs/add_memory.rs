use mnemo_core::{ProdEngine, prepare_conversation_content};
use mnemo_shared::EngineError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Full-pipeline ingest of one piece of content. `skip_judge` bypasses
/// judgment for trusted bulk imports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddMemoryJob {
  pub task_id: Uuid,
  pub owner_id: String,
  pub content: String,
  #[serde(default)]
  pub metadata: serde_json::Value,
  #[serde(default)]
  pub skip_judge: bool,
  #[serde(default)]
  pub api_key_id: Option<i64>,
}

pub(super) async fn handle_add(job: &AddMemoryJob, engine: &ProdEngine) -> Result<(), EngineError> {
  let mut metadata = job.metadata.clone();
  let mut content = job.content.clone();

  // Conversation pre-stage: summarize, then scrub sensitive spans.
  let needs_summary = metadata
    .get("needs_summary")
    .and_then(serde_json::Value::as_bool)
    .unwrap_or(false);

  if needs_summary {
    let prepared = prepare_conversation_content(&content).await;
    tracing::info!(
      task_id = %job.task_id,
      original_len = prepared.original_length,
      summary_len = prepared.summary_length,
      redacted = prepared.redacted_count,
      "conversation pre-stage complete"
    );

    content = prepared.content;
    if let Some(map) = metadata.as_object_mut() {
      map.remove("needs_summary");
      map.insert("summarized".to_owned(), serde_json::json!(true));
      map.insert(
        "original_length".to_owned(),
        serde_json::json!(prepared.original_length),
      );
      map.insert(
        "summary_length".to_owned(),
        serde_json::json!(prepared.summary_length),
      );
    }
  }

  let outcome = engine
    .add_memory(
      &job.owner_id,
      &content,
      metadata,
      job.skip_judge,
      job.api_key_id,
    )
    .await?;

  tracing::info!(
    task_id = %job.task_id,
    owner_id = %job.owner_id,
    event = %outcome.event,
    trace_id = ?outcome.trace_id,
    added = outcome.summary.stats.added_count,
    updated = outcome.summary.stats.updated_count,
    deleted = outcome.summary.stats.deleted_count,
    "memory task applied"
  );

  Ok(())
}
