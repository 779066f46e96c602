use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
  User,
  Assistant,
}

impl std::fmt::Display for MessageRole {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::User => write!(f, "user"),
      Self::Assistant => write!(f, "assistant"),
    }
  }
}

/// One turn of a conversation submitted for ingestion.
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct Message {
  pub role: MessageRole,
  pub content: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tokens: Option<u32>,
  pub timestamp: DateTime<Utc>,
}
