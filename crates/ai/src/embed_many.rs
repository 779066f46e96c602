use anyhow::anyhow;
use async_openai::types::embeddings::CreateEmbeddingRequestArgs;
use mnemo_shared::{APP_ENV, EngineError};

use crate::embed::embed;
use crate::embed_shared::{EMBEDDING_DIM, process_embedding};
use crate::{gateway_client, with_timeout};

/// Embed multiple texts in a single API call.
///
/// Returns one vector per input, in the same order.
pub async fn embed_many(inputs: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
  if inputs.is_empty() {
    return Ok(vec![]);
  }
  if let [single] = inputs {
    return Ok(vec![embed(single).await?]);
  }

  let client = gateway_client();

  let request = CreateEmbeddingRequestArgs::default()
    .model(&APP_ENV.openai_embedding_model)
    .input(inputs.to_vec())
    .dimensions(EMBEDDING_DIM as u32)
    .build()
    .map_err(EngineError::transient)?;

  let start = std::time::Instant::now();
  let response = with_timeout(APP_ENV.embed_timeout_secs, "embed_many", async {
    client.embeddings().create(request).await
  })
  .await?;

  // Sort by index to ensure ordering matches input
  let mut data = response.data;
  data.sort_by_key(|e| e.index);

  if data.len() != inputs.len() {
    return Err(EngineError::transient(anyhow!(
      "embedding count mismatch: expected {}, got {}",
      inputs.len(),
      data.len()
    )));
  }

  tracing::debug!(
    duration_ms = start.elapsed().as_millis() as u64,
    count = data.len(),
    "embed_many"
  );

  data
    .into_iter()
    .map(|e| process_embedding(e.embedding))
    .collect()
}
