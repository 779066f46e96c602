use std::time::Duration;

use apalis::prelude::Data;
use mnemo_core::ProdEngine;
use mnemo_shared::{APP_ENV, EngineError};
use serde::{Deserialize, Serialize};

mod add_memory;
pub use add_memory::AddMemoryJob;

mod batch_add;
pub use batch_add::BatchAddMemoryJob;

/// A task whose pipeline work exceeds this bound is treated as a
/// transient failure and retried.
const SOFT_TIME_LIMIT: Duration = Duration::from_secs(240);

/// Forcible-termination deadline for one attempt. Bounds the whole
/// handler, soft-timeout handling included; must stay above
/// [`SOFT_TIME_LIMIT`].
const HARD_TIME_LIMIT: Duration = Duration::from_secs(300);

/// Error type for the apalis job boundary.
/// Jobs internally use `EngineError`; this wrapper converts at the
/// worker boundary.
#[derive(Debug)]
pub struct WorkerError(pub EngineError);

impl std::fmt::Display for WorkerError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    self.0.fmt(f)
  }
}

impl std::error::Error for WorkerError {}

impl From<EngineError> for WorkerError {
  fn from(err: EngineError) -> Self {
    Self(err)
  }
}

// Enable `?` on anyhow errors inside job functions
impl From<anyhow::Error> for WorkerError {
  fn from(err: anyhow::Error) -> Self {
    Self(EngineError::fatal(err))
  }
}

/// Caller subscription class. The runtime is agnostic to what a tier
/// means; it only maps tiers onto queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
  #[default]
  Free,
  Pro,
}

#[must_use]
pub fn queue_for_tier(tier: SubscriptionTier) -> &'static str {
  match tier {
    SubscriptionTier::Pro => &APP_ENV.queue_pro,
    SubscriptionTier::Free => &APP_ENV.queue_free,
  }
}

/// The memory task payload. `task_id` is minted at enqueue time and is
/// what the status seam keys on, so it lives at the top level of the
/// serialized payload for every kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum MemoryJob {
  Add(AddMemoryJob),
  BatchAdd(BatchAddMemoryJob),
}

impl MemoryJob {
  #[must_use]
  pub fn task_id(&self) -> uuid::Uuid {
    match self {
      Self::Add(job) => job.task_id,
      Self::BatchAdd(job) => job.task_id,
    }
  }

  #[must_use]
  pub fn owner_id(&self) -> &str {
    match self {
      Self::Add(job) => &job.owner_id,
      Self::BatchAdd(job) => &job.owner_id,
    }
  }

  const fn kind_name(&self) -> &'static str {
    match self {
      Self::Add(_) => "memory.add",
      Self::BatchAdd(_) => "memory.batch_add",
    }
  }
}

/// Entry point for both tier workers.
pub async fn process_memory_job(
  job: MemoryJob,
  engine: Data<ProdEngine>,
) -> Result<(), WorkerError> {
  let engine = &*engine;
  let task_id = job.task_id();
  let owner_id = job.owner_id().to_owned();
  let start = std::time::Instant::now();

  tracing::info!(%task_id, %owner_id, kind = job.kind_name(), "START");

  let work = async {
    match &job {
      MemoryJob::Add(add) => add_memory::handle_add(add, engine).await,
      MemoryJob::BatchAdd(batch) => batch_add::handle_batch(batch, engine).await,
    }
  };

  // The soft limit races the pipeline work and surfaces as a retryable
  // failure; the hard limit drops the whole attempt if even that path
  // stalls. Retries remain with the broker either way.
  let soft_bounded = async {
    tokio::time::timeout(SOFT_TIME_LIMIT, work)
      .await
      .unwrap_or_else(|_| {
        Err(EngineError::transient(anyhow::anyhow!(
          "task exceeded soft time limit of {}s",
          SOFT_TIME_LIMIT.as_secs()
        )))
      })
  };

  let result = tokio::time::timeout(HARD_TIME_LIMIT, soft_bounded)
    .await
    .unwrap_or_else(|_| {
      Err(EngineError::transient(anyhow::anyhow!(
        "task forcibly terminated at hard time limit of {}s",
        HARD_TIME_LIMIT.as_secs()
      )))
    });

  let duration_ms = start.elapsed().as_millis() as u64;
  match result {
    Ok(()) => {
      tracing::info!(%task_id, %owner_id, duration_ms, "SUCCESS");
      Ok(())
    }
    Err(err) => {
      tracing::error!(
        %task_id,
        %owner_id,
        duration_ms,
        kind = err.kind(),
        error = %err,
        "FAILED"
      );
      Err(WorkerError(err))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tier_parses_from_lowercase_wire_form() {
    assert_eq!(
      serde_json::from_str::<SubscriptionTier>("\"pro\"").unwrap(),
      SubscriptionTier::Pro
    );
    assert_eq!(
      serde_json::from_str::<SubscriptionTier>("\"free\"").unwrap(),
      SubscriptionTier::Free
    );
    assert_eq!(SubscriptionTier::default(), SubscriptionTier::Free);
  }

  #[test]
  fn task_id_is_a_top_level_payload_field() {
    let job = MemoryJob::Add(AddMemoryJob {
      task_id: uuid::Uuid::new_v4(),
      owner_id: "owner-1".to_owned(),
      content: "hello".to_owned(),
      metadata: serde_json::json!({}),
      skip_judge: false,
      api_key_id: None,
    });

    let value = serde_json::to_value(&job).unwrap();
    assert!(value.get("task_id").is_some());
    assert_eq!(value["kind"], "Add");
  }
}
