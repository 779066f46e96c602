use apalis::prelude::TaskSink;
use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use mnemo_core::flatten_transcript;
use mnemo_shared::{AppError, EngineError, Message, MessageRole};
use mnemo_worker::{AddMemoryJob, MemoryJob, SubscriptionTier};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::utils::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConversationMessage {
  pub role: MessageRole,
  pub content: String,
  #[serde(default)]
  pub tokens: Option<u32>,
  #[serde(default)]
  pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EnqueueConversation {
  pub owner_id: String,
  pub conversation_id: Uuid,
  pub messages: Vec<ConversationMessage>,
  #[serde(default)]
  pub api_key_id: Option<i64>,
  #[serde(default)]
  #[schema(value_type = String)]
  pub tier: SubscriptionTier,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EnqueuedConversation {
  pub task_id: Uuid,
  pub message_count: usize,
}

/// Enqueue a multi-turn conversation for summarized, redacted ingestion
#[utoipa::path(
  post,
  path = "/api/v0/conversations",
  request_body = EnqueueConversation,
  responses(
    (status = 200, description = "Conversation task enqueued", body = EnqueuedConversation),
    (status = 400, description = "Messages cannot be empty")
  )
)]
#[axum::debug_handler]
#[tracing::instrument(
  skip(state, payload),
  fields(owner_id = %payload.owner_id, conversation_id = %payload.conversation_id)
)]
pub async fn add_conversation(
  State(state): State<AppState>,
  Json(payload): Json<EnqueueConversation>,
) -> Result<Json<EnqueuedConversation>, AppError> {
  if payload.messages.is_empty() {
    return Err(AppError::engine(EngineError::PermanentReject(
      "messages cannot be empty".to_owned(),
    )));
  }
  if payload.messages.iter().all(|m| m.content.trim().is_empty()) {
    return Err(AppError::engine(EngineError::PermanentReject(
      "messages carry no content".to_owned(),
    )));
  }

  let message_count = payload.messages.len();
  let messages: Vec<Message> = payload
    .messages
    .into_iter()
    .map(|m| Message {
      role: m.role,
      content: m.content,
      tokens: m.tokens,
      timestamp: m.timestamp.unwrap_or_else(Utc::now),
    })
    .collect();

  // The pre-stage flag routes the worker through summarization and
  // redaction before extraction.
  let metadata = serde_json::json!({
    "needs_summary": true,
    "conversation_id": payload.conversation_id,
    "message_count": message_count,
  });

  let task_id = Uuid::new_v4();
  let job = MemoryJob::Add(AddMemoryJob {
    task_id,
    owner_id: payload.owner_id,
    content: flatten_transcript(&messages),
    metadata,
    skip_judge: false,
    api_key_id: payload.api_key_id,
  });

  let mut storage = state.storage_for(payload.tier);
  storage.push(job).await?;

  Ok(Json(EnqueuedConversation {
    task_id,
    message_count,
  }))
}
