use std::future::Future;

use mnemo_ai::{
  ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
  ChatCompletionRequestUserMessage, generate_text,
};
use mnemo_shared::{APP_ENV, EngineError, EntityRef, RelationRef};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Sentinel the extraction prompt uses for first-person references; the
/// executor substitutes the owner id before anything reaches the graph.
pub const OWNER_SENTINEL: &str = "OWNER_ID";

const EXTRACTION_TEMPERATURE: f32 = 0.1;

// ──────────────────────────────────────────────────
// Fact extraction
// ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, Default)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FactCategory {
  #[default]
  Fact,
  Preference,
  Plan,
  Experience,
  Opinion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, Default)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FactImportance {
  Low,
  #[default]
  Medium,
  High,
}

/// One atomic claim distilled from raw input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactDraft {
  pub content: String,
  #[serde(default)]
  pub category: FactCategory,
  #[serde(default)]
  pub importance: FactImportance,
}

const FACT_EXTRACTION_SYSTEM: &str = "\
You are a memory extraction assistant. Extract every independent atomic \
fact from the conversation and return only JSON.";

const FACT_EXTRACTION_PROMPT: &str = r#"Extract all independent facts from the following text.

Text:
{text}

## Rules:
1. Split complex sentences into simple, self-contained atomic claims.
2. Each fact must be a complete declarative sentence.
3. Drop greetings, filler, and content with no informational value.
4. Keep what matters: preferences, experiences, relationships, plans, opinions.
5. Classify each fact: fact, preference, plan, experience, opinion.
6. Detect the input language and record facts in that same language.

## Example:
Input: "John works at Google in Mountain View. He loves playing tennis on weekends."
Output: {
  "facts": [
    {"content": "John works at Google", "category": "fact", "importance": "medium"},
    {"content": "John works in Mountain View", "category": "fact", "importance": "medium"},
    {"content": "John loves playing tennis on weekends", "category": "preference", "importance": "medium"}
  ]
}

Input with no usable information (e.g. "Hi, nice weather today.") yields:
{"facts": []}

Return strictly this JSON shape:
{
  "facts": [
    {"content": "...", "category": "...", "importance": "high/medium/low"}
  ]
}"#;

#[derive(Debug, Deserialize)]
struct FactExtractionResponse {
  #[serde(default)]
  facts: Vec<FactDraft>,
}

/// Slice the first `{` … last `}` out of a model response. Models wrap
/// JSON in prose and code fences often enough that strict parsing of
/// the whole string is a losing game.
#[must_use]
pub fn extract_json_slice(response: &str) -> Option<&str> {
  let start = response.find('{')?;
  let end = response.rfind('}')?;
  (end >= start).then(|| &response[start..=end])
}

/// Parse a fact-extraction response. Returns the drafts and whether the
/// conservative fallback (whole input as one fact) was taken.
#[must_use]
pub fn parse_fact_drafts(response: &str, original_text: &str) -> (Vec<FactDraft>, bool) {
  if let Some(slice) = extract_json_slice(response)
    && let Ok(parsed) = serde_json::from_str::<FactExtractionResponse>(slice)
  {
    let facts: Vec<FactDraft> = parsed
      .facts
      .into_iter()
      .filter(|f| !f.content.trim().is_empty())
      .collect();
    return (facts, false);
  }

  (
    vec![FactDraft {
      content: original_text.to_owned(),
      category: FactCategory::Fact,
      importance: FactImportance::Medium,
    }],
    true,
  )
}

/// Extract atomic facts from raw content.
///
/// An unparsable response degrades to a single fact equal to the raw
/// input rather than failing the task.
pub async fn extract_facts(text: &str) -> Result<Vec<FactDraft>, EngineError> {
  let start = std::time::Instant::now();
  let user = FACT_EXTRACTION_PROMPT.replace("{text}", text);

  let response = generate_text(
    &APP_ENV.openai_chat_model,
    vec![
      ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage::from(
        FACT_EXTRACTION_SYSTEM,
      )),
      ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage::from(user)),
    ],
    EXTRACTION_TEMPERATURE,
  )
  .await?;

  let (facts, fallback) = parse_fact_drafts(&response, text);
  if fallback {
    tracing::warn!(
      duration_ms = start.elapsed().as_millis() as u64,
      "fact extraction response unparsable, falling back to raw input"
    );
  } else {
    tracing::info!(
      facts_count = facts.len(),
      duration_ms = start.elapsed().as_millis() as u64,
      "extracted facts"
    );
  }

  Ok(facts)
}

// ──────────────────────────────────────────────────
// Entity / relation extraction
// ──────────────────────────────────────────────────

/// Entities and relations extracted from one fact text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedGraph {
  #[serde(default)]
  pub entities: Vec<EntityRef>,
  #[serde(default)]
  pub relations: Vec<RelationRef>,
}

const ENTITY_EXTRACTION_SYSTEM: &str = "\
You are an entity and relation extraction assistant. Extract entities \
and the relations between them precisely, returning only JSON.";

const ENTITY_EXTRACTION_PROMPT: &str = r#"Analyze the following text and extract all entities and the relations between them.

Text:
{text}

## Rules:
1. Entity types: person, location, organization, skill, hobby, item, event, time.
2. Express relation types as verbs or short phrases (e.g. loves, lives_in, works_at).
3. Detect the input language and record entities and relations in that same language.
4. When the text speaks in the first person ("I", "my", "me"), use "OWNER_ID" as the entity name.

## Example:
Input: "John lives in New York and works at Microsoft. He enjoys playing basketball."
Output: {
  "entities": [
    {"name": "John", "type": "person"},
    {"name": "New York", "type": "location"},
    {"name": "Microsoft", "type": "organization"},
    {"name": "basketball", "type": "hobby"}
  ],
  "relations": [
    {"source": "John", "target": "New York", "relation": "lives_in"},
    {"source": "John", "target": "Microsoft", "relation": "works_at"},
    {"source": "John", "target": "basketball", "relation": "enjoys"}
  ]
}

Return strictly this JSON shape and nothing else:
{
  "entities": [
    {"name": "...", "type": "...", "properties": {"optional": "value"}}
  ],
  "relations": [
    {"source": "...", "relation": "...", "target": "..."}
  ]
}"#;

/// Parse an entity-extraction response; unparsable responses degrade to
/// an empty graph (the fact still lands in the vector and relational
/// stores).
#[must_use]
pub fn parse_extracted_graph(response: &str) -> ExtractedGraph {
  extract_json_slice(response)
    .and_then(|slice| serde_json::from_str::<ExtractedGraph>(slice).ok())
    .map(|mut graph| {
      graph.entities.retain(|e| !e.name.trim().is_empty());
      graph
        .relations
        .retain(|r| !r.source.trim().is_empty() && !r.target.trim().is_empty());
      graph
    })
    .unwrap_or_default()
}

/// Replace the first-person sentinel with the actual owner id.
#[must_use]
pub fn substitute_owner(mut graph: ExtractedGraph, owner_id: &str) -> ExtractedGraph {
  for entity in &mut graph.entities {
    if entity.name == OWNER_SENTINEL {
      entity.name = owner_id.to_owned();
    }
  }
  for relation in &mut graph.relations {
    if relation.source == OWNER_SENTINEL {
      relation.source = owner_id.to_owned();
    }
    if relation.target == OWNER_SENTINEL {
      relation.target = owner_id.to_owned();
    }
  }
  graph
}

/// Seam for the executor: graph extraction is the only model call made
/// per judgment operation, so tests swap in canned graphs.
pub trait GraphExtractor: Send + Sync {
  fn extract(
    &self,
    owner_id: &str,
    text: &str,
  ) -> impl Future<Output = Result<ExtractedGraph, EngineError>> + Send;
}

/// Production extractor backed by the model gateway.
#[derive(Debug, Clone, Copy, Default)]
pub struct LlmGraphExtractor;

impl GraphExtractor for LlmGraphExtractor {
  async fn extract(&self, owner_id: &str, text: &str) -> Result<ExtractedGraph, EngineError> {
    let start = std::time::Instant::now();
    let user = ENTITY_EXTRACTION_PROMPT.replace("{text}", text);

    let response = generate_text(
      &APP_ENV.openai_chat_model,
      vec![
        ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage::from(
          ENTITY_EXTRACTION_SYSTEM,
        )),
        ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage::from(user)),
      ],
      EXTRACTION_TEMPERATURE,
    )
    .await?;

    let graph = substitute_owner(parse_extracted_graph(&response), owner_id);

    tracing::info!(
      entities = graph.entities.len(),
      relations = graph.relations.len(),
      duration_ms = start.elapsed().as_millis() as u64,
      "extracted entities and relations"
    );

    Ok(graph)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn json_slice_survives_code_fences() {
    let response = "Sure, here you go:\n```json\n{\"facts\": []}\n```";
    assert_eq!(extract_json_slice(response), Some("{\"facts\": []}"));
  }

  #[test]
  fn json_slice_rejects_braceless_text() {
    assert_eq!(extract_json_slice("no json here"), None);
  }

  #[test]
  fn fact_drafts_parse_and_drop_empty_content() {
    let response = r#"{"facts": [
      {"content": "Zhang San works at Alibaba", "category": "fact", "importance": "medium"},
      {"content": "  ", "category": "fact", "importance": "low"}
    ]}"#;
    let (facts, fallback) = parse_fact_drafts(response, "ignored");
    assert!(!fallback);
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].category, FactCategory::Fact);
  }

  #[test]
  fn unparsable_extraction_falls_back_to_raw_input() {
    let (facts, fallback) = parse_fact_drafts("total garbage", "I love sushi");
    assert!(fallback);
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].content, "I love sushi");
    assert_eq!(facts[0].importance, FactImportance::Medium);
  }

  #[test]
  fn unknown_category_defaults_via_fallback() {
    // serde rejects unknown enum variants; the whole response degrades
    // to the conservative single-fact path rather than erroring.
    let response = r#"{"facts": [{"content": "x", "category": "nonsense"}]}"#;
    let (facts, fallback) = parse_fact_drafts(response, "raw");
    assert!(fallback);
    assert_eq!(facts[0].content, "raw");
  }

  #[test]
  fn extracted_graph_parses_entities_and_relations() {
    let response = r#"{
      "entities": [{"name": "Beijing", "type": "location"}],
      "relations": [{"source": "OWNER_ID", "relation": "lives_in", "target": "Beijing"}]
    }"#;
    let graph = parse_extracted_graph(response);
    assert_eq!(graph.entities.len(), 1);
    assert_eq!(graph.relations.len(), 1);
  }

  #[test]
  fn owner_sentinel_is_substituted_everywhere() {
    let graph = ExtractedGraph {
      entities: vec![EntityRef::new(OWNER_SENTINEL, "person")],
      relations: vec![RelationRef::new(OWNER_SENTINEL, "likes", "coffee")],
    };
    let graph = substitute_owner(graph, "user-9");
    assert_eq!(graph.entities[0].name, "user-9");
    assert_eq!(graph.relations[0].source, "user-9");
    assert_eq!(graph.relations[0].target, "coffee");
  }

  #[test]
  fn garbage_graph_response_degrades_to_empty() {
    assert_eq!(parse_extracted_graph("not json"), ExtractedGraph::default());
  }
}
