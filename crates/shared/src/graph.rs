use serde::{Deserialize, Serialize};

fn default_entity_type() -> String {
  "entity".to_owned()
}

/// An entity named by a fact, as persisted in the fact row and
/// denormalized into the vector payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
  pub name: String,
  #[serde(rename = "type", default = "default_entity_type")]
  pub entity_type: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub properties: Option<serde_json::Value>,
}

impl EntityRef {
  #[must_use]
  pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      entity_type: entity_type.into(),
      properties: None,
    }
  }
}

/// A relation triple named by a fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationRef {
  pub source: String,
  pub relation: String,
  pub target: String,
}

impl RelationRef {
  #[must_use]
  pub fn new(
    source: impl Into<String>,
    relation: impl Into<String>,
    target: impl Into<String>,
  ) -> Self {
    Self {
      source: source.into(),
      relation: relation.into(),
      target: target.into(),
    }
  }

  /// Compact `source-relation-target` form used in vector payloads.
  #[must_use]
  pub fn to_payload_string(&self) -> String {
    format!("{}-{}-{}", self.source, self.relation, self.target)
  }

  /// Parse the payload form back into a triple. Targets may themselves
  /// contain dashes, so only the first two separators split.
  #[must_use]
  pub fn from_payload_string(s: &str) -> Option<Self> {
    let mut parts = s.splitn(3, '-');
    match (parts.next(), parts.next(), parts.next()) {
      (Some(source), Some(relation), Some(target))
        if !source.is_empty() && !relation.is_empty() && !target.is_empty() =>
      {
        Some(Self::new(source, relation, target))
      }
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn payload_string_round_trips() {
    let rel = RelationRef::new("Zhang San", "works_at", "Alibaba");
    let parsed = RelationRef::from_payload_string(&rel.to_payload_string()).unwrap();
    assert_eq!(parsed, rel);
  }

  #[test]
  fn dashed_target_survives_parsing() {
    let parsed = RelationRef::from_payload_string("USER-likes-ice-cream").unwrap();
    assert_eq!(parsed.target, "ice-cream");
  }

  #[test]
  fn malformed_payload_string_is_rejected() {
    assert!(RelationRef::from_payload_string("only-two").is_none());
    assert!(RelationRef::from_payload_string("").is_none());
  }

  #[test]
  fn entity_type_defaults_when_missing() {
    let entity: EntityRef = serde_json::from_str(r#"{"name": "Beijing"}"#).unwrap();
    assert_eq!(entity.entity_type, "entity");
  }
}
