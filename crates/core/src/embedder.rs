use std::future::Future;

use mnemo_shared::EngineError;

/// Seam over the embedding gateway so write paths can be exercised with
/// deterministic vectors in tests.
pub trait Embedder: Send + Sync {
  fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, EngineError>> + Send;

  fn embed_many(
    &self,
    texts: &[String],
  ) -> impl Future<Output = Result<Vec<Vec<f32>>, EngineError>> + Send;
}

/// Production embedder backed by the model gateway.
#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayEmbedder;

impl Embedder for GatewayEmbedder {
  async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError> {
    mnemo_ai::embed(text).await
  }

  async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
    mnemo_ai::embed_many(texts).await
  }
}
