use std::future::Future;
use std::time::Duration;

use anyhow::anyhow;
use mnemo_shared::{APP_ENV, EngineError};

mod graph;
pub use graph::{GraphStore, Neo4jStore, sanitize_entity_label, sanitize_relation_type};

mod record;
pub use record::{NewAudit, NewFact, PgRecordStore, RecordStore};

mod vector;
pub use vector::{QdrantStore, VectorHit, VectorPayload, VectorRecord, VectorStore, collection_for_owner};

/// Deadline guard shared by all store adapters. Store calls that hang
/// are indistinguishable from a dead backend, so an elapsed deadline is
/// a transient failure like any other transport error.
pub(crate) async fn with_store_timeout<T, F>(what: &'static str, fut: F) -> Result<T, EngineError>
where
  F: Future<Output = Result<T, EngineError>>,
{
  let secs = APP_ENV.store_timeout_secs;
  tokio::time::timeout(Duration::from_secs(secs), fut)
    .await
    .map_err(|_| EngineError::transient(anyhow!("{what} timed out after {secs}s")))?
}
