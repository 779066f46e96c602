use std::time::Duration;

use apalis::layers::WorkerBuilderExt;
use apalis::layers::retry::RetryPolicy;
use apalis::prelude::{Monitor, WorkerBuilder};
use apalis_postgres::PostgresStorage;
use mnemo_core::ProdEngine;
use mnemo_shared::{APP_ENV, AppError};

mod jobs;
pub use jobs::{
  AddMemoryJob, BatchAddMemoryJob, MemoryJob, SubscriptionTier, WorkerError, process_memory_job,
  queue_for_tier,
};

/// Concurrency per worker, sized to the model gateway's safe
/// parallelism.
const WORKER_CONCURRENCY: usize = 2;

/// Attempts per task before it dead-letters.
const MAX_RETRIES: usize = 3;

/// Run both tier workers until shutdown.
///
/// Each queue gets its own worker with prefetch 1, so in-flight model
/// calls are bounded by worker count × per-worker concurrency rather
/// than broker buffering.
pub async fn worker(
  engine: ProdEngine,
  free_storage: PostgresStorage<MemoryJob>,
  pro_storage: PostgresStorage<MemoryJob>,
) -> Result<(), AppError> {
  let free_engine = engine.clone();
  let pro_engine = engine;

  Monitor::new()
    .register(move |_run_id| {
      WorkerBuilder::new(format!("mnemo-{}", APP_ENV.queue_free))
        .backend(free_storage.clone())
        .concurrency(WORKER_CONCURRENCY)
        .retry(RetryPolicy::retries(MAX_RETRIES))
        .data(free_engine.clone())
        .build(process_memory_job)
    })
    .register(move |_run_id| {
      WorkerBuilder::new(format!("mnemo-{}", APP_ENV.queue_pro))
        .backend(pro_storage.clone())
        .concurrency(WORKER_CONCURRENCY)
        .retry(RetryPolicy::retries(MAX_RETRIES))
        .data(pro_engine.clone())
        .build(process_memory_job)
    })
    .shutdown_timeout(Duration::from_secs(5))
    .run_with_signal(tokio::signal::ctrl_c())
    .await
    .map_err(|err| AppError::from(anyhow::Error::new(err)))?;

  Ok(())
}
