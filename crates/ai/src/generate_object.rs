use anyhow::anyhow;
use async_openai::types::chat::{
  ChatCompletionRequestMessage, CreateChatCompletionRequestArgs, ResponseFormat,
  ResponseFormatJsonSchema,
};
use mnemo_shared::{APP_ENV, EngineError};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::{gateway_client, with_timeout};

/// Make a schemars-generated schema acceptable to OpenAI strict mode:
/// every object needs `additionalProperties: false` and a `required`
/// list covering all of its properties.
fn fix_schema_for_strict(schema: &mut serde_json::Value) {
  let Some(obj) = schema.as_object_mut() else { return };

  if obj.contains_key("properties") {
    let keys: Vec<serde_json::Value> = obj["properties"]
      .as_object()
      .map(|p| p.keys().map(|k| serde_json::Value::String(k.clone())).collect())
      .unwrap_or_default();
    obj.insert("required".to_owned(), serde_json::Value::Array(keys));
    obj.insert("additionalProperties".to_owned(), serde_json::Value::Bool(false));

    if let Some(props) = obj.get_mut("properties").and_then(|p| p.as_object_mut()) {
      for v in props.values_mut() {
        fix_schema_for_strict(v);
      }
    }
  }

  if let Some(items) = obj.get_mut("items") {
    fix_schema_for_strict(items);
  }

  if let Some(defs) = obj.get_mut("$defs").and_then(|d| d.as_object_mut()) {
    for v in defs.values_mut() {
      fix_schema_for_strict(v);
    }
  }
}

/// Chat completion constrained to a JSON schema derived from `T`.
///
/// Used where the pipeline needs a guaranteed shape (the redaction
/// pre-stage); judgment and extraction deliberately stay on
/// [`generate_text`](crate::generate_text) so their raw responses reach
/// the audit row even when parsing fails.
pub async fn generate_object<T>(
  model: &str,
  messages: Vec<ChatCompletionRequestMessage>,
  schema_name: String,
  schema_description: Option<String>,
) -> Result<T, EngineError>
where
  T: DeserializeOwned + JsonSchema,
{
  let client = gateway_client();

  let schema = schemars::schema_for!(T);
  let mut schema = serde_json::to_value(&schema).map_err(EngineError::transient)?;
  fix_schema_for_strict(&mut schema);

  let request = CreateChatCompletionRequestArgs::default()
    .model(model)
    .messages(messages)
    .response_format(ResponseFormat::JsonSchema {
      json_schema: ResponseFormatJsonSchema {
        description: schema_description,
        name: schema_name,
        schema: Some(schema),
        strict: Some(true),
      },
    })
    .build()
    .map_err(EngineError::transient)?;

  let response = with_timeout(APP_ENV.chat_timeout_secs, "chat_object", async {
    client.chat().create(request).await
  })
  .await?
  .choices
  .into_iter()
  .find_map(|c| c.message.content)
  .ok_or_else(|| EngineError::transient(anyhow!("empty message content")))?;

  serde_json::from_str(&response)
    .map_err(|err| EngineError::ModelParse(format!("structured output: {err}")))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn strict_fix_adds_required_and_closes_objects() {
    let mut schema = serde_json::json!({
      "type": "object",
      "properties": {
        "name": { "type": "string" },
        "nested": {
          "type": "object",
          "properties": { "count": { "type": "integer" } }
        }
      }
    });
    fix_schema_for_strict(&mut schema);

    assert_eq!(schema["additionalProperties"], serde_json::json!(false));
    let required = schema["required"].as_array().unwrap();
    assert_eq!(required.len(), 2);
    assert_eq!(
      schema["properties"]["nested"]["additionalProperties"],
      serde_json::json!(false)
    );
  }
}
