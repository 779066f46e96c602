use anyhow::anyhow;
use async_openai::types::chat::{
  ChatCompletionRequestMessage, CreateChatCompletionRequestArgs,
};
use mnemo_shared::{APP_ENV, EngineError};

use crate::{gateway_client, with_timeout};

/// Plain chat completion against the configured gateway.
///
/// Returns the raw assistant text; callers that expect JSON do their own
/// defensive parsing so a malformed response can still be audited.
pub async fn generate_text(
  model: &str,
  messages: Vec<ChatCompletionRequestMessage>,
  temperature: f32,
) -> Result<String, EngineError> {
  let client = gateway_client();

  let request = CreateChatCompletionRequestArgs::default()
    .model(model)
    .messages(messages)
    .temperature(temperature)
    .build()
    .map_err(EngineError::transient)?;

  let start = std::time::Instant::now();
  let response = with_timeout(APP_ENV.chat_timeout_secs, "chat", async {
    client.chat().create(request).await
  })
  .await?;

  let content = response
    .choices
    .into_iter()
    .filter_map(|c| c.message.content)
    .next_back()
    .ok_or_else(|| EngineError::transient(anyhow!("empty message content")))?;

  tracing::debug!(
    model,
    duration_ms = start.elapsed().as_millis() as u64,
    response_len = content.len(),
    "chat"
  );

  Ok(content)
}
