use anyhow::anyhow;
use async_openai::types::embeddings::CreateEmbeddingRequestArgs;
use mnemo_shared::{APP_ENV, EngineError};

use crate::embed_shared::{EMBEDDING_DIM, process_embedding};
use crate::{gateway_client, with_timeout};

pub async fn embed(input: &str) -> Result<Vec<f32>, EngineError> {
  let client = gateway_client();

  let request = CreateEmbeddingRequestArgs::default()
    .model(&APP_ENV.openai_embedding_model)
    .input(input)
    .dimensions(EMBEDDING_DIM as u32)
    .build()
    .map_err(EngineError::transient)?;

  let start = std::time::Instant::now();
  let embedding = with_timeout(APP_ENV.embed_timeout_secs, "embed", async {
    client.embeddings().create(request).await
  })
  .await?
  .data
  .into_iter()
  .map(|e| e.embedding)
  .next_back()
  .ok_or_else(|| EngineError::transient(anyhow!("empty embedding")))?;

  tracing::debug!(
    duration_ms = start.elapsed().as_millis() as u64,
    dim = embedding.len(),
    "embed"
  );

  process_embedding(embedding)
}
