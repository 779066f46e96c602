use mnemo_ai::{
  ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
  ChatCompletionRequestUserMessage, generate_object, generate_text,
};
use mnemo_shared::{APP_ENV, Message};
use schemars::JsonSchema;
use serde::Deserialize;

/// Replacement token for spans the redaction model flags.
pub const REDACTION_SENTINEL: &str = "[REDACTED]";

const SUMMARY_TEMPERATURE: f32 = 0.3;

const SUMMARY_SYSTEM: &str = "\
You are a conversation summarizer. Summarize concisely, keep every \
important fact, and drop everything irrelevant.";

const SUMMARY_PROMPT: &str = r#"Summarize the following content.

Requirements:
1. Keep all important factual information (preferences, personal details, work, plans).
2. Keep concrete times, places, people, and events.
3. Drop small talk, repetition, and irrelevant chatter.
4. Preserve chronological order and describe it plainly.
5. Do not add commentary or analysis; only summarize.

Content:
{content}

Return the summary text directly, nothing else."#;

const REDACTION_SYSTEM: &str = "\
You are a sensitive-information auditor. Identify and replace every \
sensitive span, returning only the JSON result.";

const REDACTION_PROMPT: &str = r#"Replace sensitive information in the content below with "[REDACTED]".

Replace these kinds of spans, whatever their length or format:
1. Bank card numbers
2. Passwords (the value after "password is", etc.)
3. National identity numbers
4. Social security numbers
5. Passport numbers
6. Driver's license numbers

Do NOT replace: names, addresses, phone numbers, email addresses.

Content:
{content}"#;

/// Strict-JSON output of the redaction call.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RedactionOutput {
  pub has_sensitive: bool,
  pub filtered_content: String,
  pub sensitive_count: u32,
}

/// What the pre-stage produced, with the figures the task stamps into
/// its metadata.
#[derive(Debug)]
pub struct PreparedContent {
  pub content: String,
  pub original_length: usize,
  pub summary_length: usize,
  pub redacted_count: u32,
}

/// Render a conversation as `role: content` lines for the summarizer.
#[must_use]
pub fn flatten_transcript(messages: &[Message]) -> String {
  messages
    .iter()
    .map(|m| format!("{}: {}", m.role, m.content))
    .collect::<Vec<_>>()
    .join("\n")
}

/// Factual-preserving summary; degrades to the input on any failure.
async fn summarize(content: &str) -> String {
  let user = SUMMARY_PROMPT.replace("{content}", content);
  let result = generate_text(
    &APP_ENV.openai_chat_model,
    vec![
      ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage::from(
        SUMMARY_SYSTEM,
      )),
      ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage::from(user)),
    ],
    SUMMARY_TEMPERATURE,
  )
  .await;

  match result {
    Ok(summary) if !summary.trim().is_empty() => {
      tracing::info!(
        original_len = content.len(),
        summary_len = summary.len(),
        "conversation summarized"
      );
      summary
    }
    Ok(_) => content.to_owned(),
    Err(err) => {
      tracing::warn!(error = %err, "summarization failed, keeping original content");
      content.to_owned()
    }
  }
}

/// LLM-based sensitive-span redaction; degrades to the input on any
/// failure.
async fn redact(content: &str) -> (String, u32) {
  let user = REDACTION_PROMPT.replace("{content}", content);
  let result = generate_object::<RedactionOutput>(
    &APP_ENV.openai_chat_model,
    vec![
      ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage::from(
        REDACTION_SYSTEM,
      )),
      ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage::from(user)),
    ],
    "sensitive_redaction".to_owned(),
    Some("Sensitive span detection and replacement".to_owned()),
  )
  .await;

  match result {
    Ok(output) if output.has_sensitive && !output.filtered_content.trim().is_empty() => {
      let count = output
        .sensitive_count
        .max(output.filtered_content.matches(REDACTION_SENTINEL).count() as u32);
      tracing::info!(redacted = count, "sensitive spans filtered");
      (output.filtered_content, count)
    }
    Ok(_) => (content.to_owned(), 0),
    Err(err) => {
      tracing::warn!(error = %err, "redaction failed, keeping content unmodified");
      (content.to_owned(), 0)
    }
  }
}

/// The conversation pre-stage: summarize the transcript, then scrub
/// sensitive spans. Either step failing falls through with the prior
/// content; ingestion never blocks on the pre-stage.
pub async fn prepare_conversation_content(content: &str) -> PreparedContent {
  let summary = summarize(content).await;
  let summary_length = summary.len();
  let (cleaned, redacted_count) = redact(&summary).await;

  PreparedContent {
    content: cleaned,
    original_length: content.len(),
    summary_length,
    redacted_count,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;
  use mnemo_shared::MessageRole;

  #[test]
  fn transcript_renders_role_prefixed_lines() {
    let messages = vec![
      Message {
        role: MessageRole::User,
        content: "I moved to Berlin".to_owned(),
        tokens: None,
        timestamp: Utc::now(),
      },
      Message {
        role: MessageRole::Assistant,
        content: "Noted!".to_owned(),
        tokens: Some(3),
        timestamp: Utc::now(),
      },
    ];

    let transcript = flatten_transcript(&messages);
    assert_eq!(transcript, "user: I moved to Berlin\nassistant: Noted!");
  }

  #[test]
  fn transcript_of_nothing_is_empty() {
    assert_eq!(flatten_transcript(&[]), "");
  }
}
