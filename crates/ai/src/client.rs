use std::future::Future;
use std::time::Duration;

use anyhow::anyhow;
use async_openai::{Client, config::OpenAIConfig};
use mnemo_shared::{APP_ENV, EngineError};

pub(crate) fn gateway_client() -> Client<OpenAIConfig> {
  let config = OpenAIConfig::new()
    .with_api_key(&APP_ENV.openai_api_key)
    .with_api_base(&APP_ENV.openai_base_url);

  Client::with_config(config)
}

/// Run a gateway call under a deadline. Elapsed deadlines are transient:
/// the task runtime retries them like any other network failure.
pub(crate) async fn with_timeout<T, E, F>(
  secs: u64,
  what: &'static str,
  fut: F,
) -> Result<T, EngineError>
where
  E: Into<anyhow::Error>,
  F: Future<Output = Result<T, E>>,
{
  tokio::time::timeout(Duration::from_secs(secs), fut)
    .await
    .map_err(|_| EngineError::transient(anyhow!("{what} timed out after {secs}s")))?
    .map_err(EngineError::transient)
}
