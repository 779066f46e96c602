use std::fmt::Display;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cross-store key linking a fact row to its vector point.
///
/// Minted once on ADD and never reassigned; UPDATE writes under the
/// same id, DELETE removes it everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorId(Uuid);

impl VectorId {
  #[must_use]
  pub fn generate() -> Self {
    Self(Uuid::new_v4())
  }

  #[must_use]
  pub const fn from_uuid(id: Uuid) -> Self {
    Self(id)
  }

  #[must_use]
  pub const fn as_uuid(&self) -> Uuid {
    self.0
  }
}

impl Display for VectorId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    self.0.fmt(f)
  }
}

impl From<VectorId> for Uuid {
  fn from(id: VectorId) -> Self {
    id.0
  }
}

/// Primary key of a fact row in the relational store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactId(i64);

impl FactId {
  #[must_use]
  pub const fn new(id: i64) -> Self {
    Self(id)
  }

  #[must_use]
  pub const fn get(&self) -> i64 {
    self.0
  }
}

impl Display for FactId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    self.0.fmt(f)
  }
}

/// Graph node identity: entities are unique per `(owner, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
  pub owner_id: String,
  pub name: String,
}

impl EntityKey {
  #[must_use]
  pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      owner_id: owner_id.into(),
      name: name.into(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn vector_id_round_trips_through_uuid() {
    let id = VectorId::generate();
    assert_eq!(VectorId::from_uuid(id.as_uuid()), id);
  }

  #[test]
  fn vector_id_serializes_transparently() {
    let id = VectorId::generate();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{id}\""));
  }
}
