use mnemo_ai::{
  ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
  ChatCompletionRequestUserMessage, generate_text,
};
use mnemo_shared::{APP_ENV, EngineError, EntityRef, FactId, RelationRef, VectorId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Candidates shown to the judgment model per batch of new facts.
pub const JUDGE_TOP_K: u64 = 5;

/// Cosine floor below which an existing memory is not a candidate.
pub const JUDGE_SCORE_FLOOR: f32 = 0.7;

const JUDGMENT_TEMPERATURE: f32 = 0.1;

// ──────────────────────────────────────────────────
// Types
// ──────────────────────────────────────────────────

/// An existing memory as presented to the judgment model. `display_id`
/// is the position index the model refers to in its response; the
/// cross-store keys ride along so the executor can act without another
/// lookup.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateMemory {
  pub display_id: String,
  pub text: String,
  pub vector_id: VectorId,
  pub fact_id: Option<FactId>,
  pub category: String,
  pub importance: String,
  pub entities: Vec<EntityRef>,
  pub relations: Vec<RelationRef>,
  pub score: f32,
}

/// The judgment decision for one fact. Parsers produce this; the
/// executor switches on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "UPPERCASE")]
pub enum Operation {
  Add { id: String, text: String },
  Update { id: String, text: String, old_memory: String },
  Delete { id: String },
  None { id: String },
}

impl Operation {
  #[must_use]
  pub fn id(&self) -> &str {
    match self {
      Self::Add { id, .. }
      | Self::Update { id, .. }
      | Self::Delete { id }
      | Self::None { id } => id,
    }
  }
}

/// Everything one judgment invocation produced, audit fields included.
#[derive(Debug)]
pub struct JudgmentOutcome {
  pub trace_id: Uuid,
  pub operations: Vec<Operation>,
  pub raw_response: String,
  pub parsed_operations: serde_json::Value,
  pub reasoning: Option<String>,
  pub success: bool,
  pub error: Option<String>,
  pub model_name: String,
  pub latency_ms: i32,
}

// ──────────────────────────────────────────────────
// Prompt
// ──────────────────────────────────────────────────

const JUDGMENT_SYSTEM: &str = "\
You are an intelligent memory manager. Analyze the new facts, decide \
the operation for each, and return only the JSON result.";

const JUDGMENT_RULES: &str = r#"You manage a user's memory system with four operations:
(1) ADD a new memory, (2) UPDATE an existing memory, (3) DELETE a memory, (4) NONE for no action.

Compare the newly extracted facts against the existing memories and decide an operation per fact:

### 1. ADD
The fact carries information no existing memory has. Generate a new id (the next integer).
Example:
- Existing: [{"id": "0", "text": "User is a software engineer"}]
- New facts: ["User's name is Zhang San"]
- Result: {
  "memory": [
    {"id": "0", "text": "User is a software engineer", "event": "NONE", "reason": "Unrelated to the new fact"},
    {"id": "1", "text": "User's name is Zhang San", "event": "ADD", "reason": "New information: the user's name is not in memory"}
  ]
}

### 2. UPDATE
The fact refines or completes an existing memory. Keep that memory's id and include old_memory.
Example:
- Existing: [{"id": "0", "text": "User likes pizza"}]
- New facts: ["Likes chicken pizza specifically"]
- Result: {
  "memory": [
    {"id": "0", "text": "User likes chicken pizza", "event": "UPDATE", "old_memory": "User likes pizza", "reason": "More specific: names the pizza flavour"}
  ]
}

### 3. DELETE
The fact contradicts an existing memory. Keep that memory's id.
Example:
- Existing: [{"id": "0", "text": "Likes cheese pizza"}]
- New facts: ["Does not like cheese pizza"]
- Result: {
  "memory": [
    {"id": "0", "text": "Likes cheese pizza", "event": "DELETE", "reason": "Contradiction: the user now says they dislike cheese pizza"}
  ]
}

### 4. NONE
The fact is identical to or already subsumed by an existing memory.
Example:
- Existing: [{"id": "0", "text": "Name is Zhang San"}]
- New facts: ["My name is Zhang San"]
- Result: {
  "memory": [
    {"id": "0", "text": "Name is Zhang San", "event": "NONE", "reason": "Duplicate of an existing memory"}
  ]
}

## Notes:
- Detect the input language and write memories in that same language.
- ADD generates a new incrementing integer id.
- UPDATE and DELETE must use an existing memory's id.
- Every operation must carry a reason explaining the decision.
- Return JSON only, nothing else."#;

#[derive(Serialize)]
struct DisplayedMemory<'a> {
  id: &'a str,
  text: &'a str,
}

/// Assemble the full judgment prompt for the given candidates and facts.
#[must_use]
pub fn build_judgment_prompt(existing: &[CandidateMemory], new_facts: &[String]) -> String {
  let current = if existing.is_empty() {
    "Current memory is empty.\n".to_owned()
  } else {
    let displayed: Vec<DisplayedMemory<'_>> = existing
      .iter()
      .map(|m| DisplayedMemory {
        id: &m.display_id,
        text: &m.text,
      })
      .collect();
    format!(
      "Current memories:\n```\n{}\n```\n",
      serde_json::to_string_pretty(&displayed).unwrap_or_default()
    )
  };

  let facts = serde_json::to_string_pretty(new_facts).unwrap_or_default();

  format!(
    "{JUDGMENT_RULES}\n\n{current}\nNewly extracted facts:\n```\n{facts}\n```\n\n\
     Analyze the new facts and return the operations in this JSON shape:\n\
     {{\n  \"memory\": [\n    {{\n      \"id\": \"<memory id>\",\n      \
     \"text\": \"<memory text>\",\n      \"event\": \"<ADD/UPDATE/DELETE/NONE>\",\n      \
     \"old_memory\": \"<original text, UPDATE only>\",\n      \
     \"reason\": \"<why this operation>\"\n    }}\n  ]\n}}"
  )
}

// ──────────────────────────────────────────────────
// Response parsing
// ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
struct RawOperation {
  #[serde(default)]
  id: String,
  #[serde(default)]
  text: String,
  #[serde(default)]
  event: String,
  #[serde(default)]
  old_memory: Option<String>,
  #[serde(default)]
  reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JudgmentResponse {
  #[serde(default)]
  memory: Vec<RawOperation>,
}

pub struct ParsedJudgment {
  pub operations: Vec<Operation>,
  pub parsed_operations: serde_json::Value,
  pub reasoning: Option<String>,
  pub success: bool,
  pub error: Option<String>,
}

/// Turn a raw judgment response into typed operations.
///
/// An unparsable response falls back to ADD for every new fact, with
/// ids appended after the existing ones; the caller records
/// `success=false` and keeps the raw response for the audit row.
#[must_use]
pub fn parse_operations(
  response: &str,
  new_facts: &[String],
  existing_count: usize,
) -> ParsedJudgment {
  let parsed = crate::extract_json_slice(response)
    .and_then(|slice| serde_json::from_str::<JudgmentResponse>(slice).ok());

  let Some(parsed) = parsed else {
    let fallback: Vec<RawOperation> = new_facts
      .iter()
      .enumerate()
      .map(|(i, fact)| RawOperation {
        id: (existing_count + i).to_string(),
        text: fact.clone(),
        event: "ADD".to_owned(),
        old_memory: None,
        reason: Some("Defaulted to ADD: judgment response was unparsable".to_owned()),
      })
      .collect();

    let operations = fallback
      .iter()
      .map(|op| Operation::Add {
        id: op.id.clone(),
        text: op.text.clone(),
      })
      .collect();

    return ParsedJudgment {
      operations,
      parsed_operations: serde_json::to_value(&fallback).unwrap_or_default(),
      reasoning: None,
      success: false,
      error: Some("no valid JSON found in judgment response".to_owned()),
    };
  };

  let reasoning: Vec<String> = parsed
    .memory
    .iter()
    .filter_map(|op| op.reason.clone())
    .filter(|r| !r.is_empty())
    .collect();

  let operations = parsed
    .memory
    .iter()
    .filter_map(|op| match op.event.as_str() {
      "ADD" if !op.text.trim().is_empty() => Some(Operation::Add {
        id: op.id.clone(),
        text: op.text.clone(),
      }),
      "UPDATE" if !op.text.trim().is_empty() => Some(Operation::Update {
        id: op.id.clone(),
        text: op.text.clone(),
        old_memory: op.old_memory.clone().unwrap_or_default(),
      }),
      "DELETE" => Some(Operation::Delete { id: op.id.clone() }),
      "NONE" => Some(Operation::None { id: op.id.clone() }),
      _ => None,
    })
    .collect();

  ParsedJudgment {
    operations,
    parsed_operations: serde_json::to_value(&parsed.memory).unwrap_or_default(),
    reasoning: (!reasoning.is_empty()).then(|| reasoning.join("\n")),
    success: true,
    error: None,
  }
}

/// Run the judgment model over the new facts and candidates.
///
/// Transport failures propagate as retryable errors; a response that
/// arrives but cannot be parsed takes the ADD-all fallback and is
/// reported with `success=false`.
pub async fn judge(
  new_facts: &[String],
  candidates: &[CandidateMemory],
) -> Result<JudgmentOutcome, EngineError> {
  let trace_id = Uuid::new_v4();
  let start = std::time::Instant::now();
  let model = APP_ENV.openai_judgment_model.clone();

  tracing::info!(
    %trace_id,
    new_facts = new_facts.len(),
    existing = candidates.len(),
    "judgment start"
  );

  let prompt = build_judgment_prompt(candidates, new_facts);
  let response = generate_text(
    &model,
    vec![
      ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage::from(
        JUDGMENT_SYSTEM,
      )),
      ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage::from(prompt)),
    ],
    JUDGMENT_TEMPERATURE,
  )
  .await?;

  let parsed = parse_operations(&response, new_facts, candidates.len());
  let latency_ms = start.elapsed().as_millis() as i32;

  let (add, update, delete, none) =
    parsed
      .operations
      .iter()
      .fold((0, 0, 0, 0), |(a, u, d, n), op| match op {
        Operation::Add { .. } => (a + 1, u, d, n),
        Operation::Update { .. } => (a, u + 1, d, n),
        Operation::Delete { .. } => (a, u, d + 1, n),
        Operation::None { .. } => (a, u, d, n + 1),
      });

  tracing::info!(
    %trace_id,
    add,
    update,
    delete,
    none,
    success = parsed.success,
    duration_ms = latency_ms,
    "judgment complete"
  );

  Ok(JudgmentOutcome {
    trace_id,
    operations: parsed.operations,
    raw_response: response,
    parsed_operations: parsed.parsed_operations,
    reasoning: parsed.reasoning,
    success: parsed.success,
    error: parsed.error,
    model_name: model,
    latency_ms,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn facts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
  }

  #[test]
  fn parses_all_four_operations() {
    let response = r#"{"memory": [
      {"id": "0", "text": "a", "event": "NONE", "reason": "unrelated"},
      {"id": "1", "text": "b", "event": "ADD", "reason": "new"},
      {"id": "0", "text": "c", "event": "UPDATE", "old_memory": "a", "reason": "refines"},
      {"id": "0", "event": "DELETE", "reason": "contradicts"}
    ]}"#;
    let parsed = parse_operations(response, &facts(&["b"]), 1);

    assert!(parsed.success);
    assert_eq!(parsed.operations.len(), 4);
    assert_eq!(
      parsed.operations[1],
      Operation::Add {
        id: "1".to_owned(),
        text: "b".to_owned()
      }
    );
    assert_eq!(
      parsed.operations[2],
      Operation::Update {
        id: "0".to_owned(),
        text: "c".to_owned(),
        old_memory: "a".to_owned()
      }
    );
    let reasoning = parsed.reasoning.unwrap();
    assert!(reasoning.contains("contradicts"));
  }

  #[test]
  fn unparsable_response_falls_back_to_add_all() {
    let parsed = parse_operations("I refuse to answer.", &facts(&["f1", "f2"]), 3);

    assert!(!parsed.success);
    assert!(parsed.error.is_some());
    assert_eq!(
      parsed.operations,
      vec![
        Operation::Add {
          id: "3".to_owned(),
          text: "f1".to_owned()
        },
        Operation::Add {
          id: "4".to_owned(),
          text: "f2".to_owned()
        },
      ]
    );
  }

  #[test]
  fn unknown_events_and_empty_adds_are_dropped() {
    let response = r#"{"memory": [
      {"id": "0", "text": "", "event": "ADD"},
      {"id": "1", "text": "x", "event": "MERGE"}
    ]}"#;
    let parsed = parse_operations(response, &facts(&["x"]), 0);
    assert!(parsed.success);
    assert!(parsed.operations.is_empty());
  }

  #[test]
  fn prompt_includes_candidates_and_facts() {
    let candidates = vec![CandidateMemory {
      display_id: "0".to_owned(),
      text: "User likes pizza".to_owned(),
      vector_id: VectorId::generate(),
      fact_id: Some(FactId::new(7)),
      category: "preference".to_owned(),
      importance: "medium".to_owned(),
      entities: vec![],
      relations: vec![],
      score: 0.92,
    }];
    let prompt = build_judgment_prompt(&candidates, &facts(&["Likes chicken pizza"]));

    assert!(prompt.contains("User likes pizza"));
    assert!(prompt.contains("Likes chicken pizza"));
    assert!(prompt.contains("\"id\": \"0\""));
  }

  #[test]
  fn empty_candidates_render_empty_memory_note() {
    let prompt = build_judgment_prompt(&[], &facts(&["f"]));
    assert!(prompt.contains("Current memory is empty."));
  }

  #[test]
  fn operation_serializes_with_event_tag() {
    let op = Operation::Delete { id: "9".to_owned() };
    let json = serde_json::to_value(&op).unwrap();
    assert_eq!(json["event"], "DELETE");
    assert_eq!(json["id"], "9");
  }
}
