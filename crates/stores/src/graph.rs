use std::future::Future;
use std::sync::Arc;

use mnemo_shared::{APP_ENV, EngineError, EntityKey};
use neo4rs::{Graph, query};

use crate::with_store_timeout;

/// Fallback label for relations that sanitize to nothing.
pub const DEFAULT_RELATION: &str = "RELATED_TO";

/// Fallback label for entities with an unusable type.
pub const DEFAULT_ENTITY_LABEL: &str = "Entity";

/// Relation types become Cypher labels and cannot be parameterized, so
/// they are restricted to uppercase alphanumerics and underscores.
#[must_use]
pub fn sanitize_relation_type(relation: &str) -> String {
  let sanitized: String = relation
    .to_uppercase()
    .replace(' ', "_")
    .chars()
    .filter(|c| c.is_alphanumeric() || *c == '_')
    .collect();

  if sanitized.is_empty() {
    DEFAULT_RELATION.to_owned()
  } else {
    sanitized
  }
}

/// Entity types become node labels; same interpolation constraint.
#[must_use]
pub fn sanitize_entity_label(entity_type: &str) -> String {
  let sanitized: String = entity_type
    .chars()
    .filter(|c| c.is_alphanumeric() || *c == '_')
    .collect();

  if sanitized.is_empty() {
    DEFAULT_ENTITY_LABEL.to_owned()
  } else {
    sanitized
  }
}

/// Contract over the labeled property graph. Nodes are unique per
/// `(name, owner_id)`; all matches are owner-qualified.
pub trait GraphStore: Send + Sync {
  fn upsert_entity(
    &self,
    key: &EntityKey,
    entity_type: &str,
    properties: Option<&serde_json::Value>,
  ) -> impl Future<Output = Result<(), EngineError>> + Send;

  fn upsert_edge(
    &self,
    owner_id: &str,
    source: &str,
    target: &str,
    relation: &str,
  ) -> impl Future<Output = Result<(), EngineError>> + Send;

  /// Remove one edge regardless of direction.
  fn delete_edge(
    &self,
    owner_id: &str,
    source: &str,
    target: &str,
    relation: &str,
  ) -> impl Future<Output = Result<(), EngineError>> + Send;

  /// Remove all incident edges, then the node itself. Callers that only
  /// want to reap orphans check [`count_incident`](Self::count_incident)
  /// first.
  fn delete_entity_total(
    &self,
    key: &EntityKey,
  ) -> impl Future<Output = Result<(), EngineError>> + Send;

  fn count_incident(
    &self,
    key: &EntityKey,
  ) -> impl Future<Output = Result<u64, EngineError>> + Send;

  /// Names of one-hop neighbors.
  fn neighbors(
    &self,
    key: &EntityKey,
    limit: u64,
  ) -> impl Future<Output = Result<Vec<String>, EngineError>> + Send;
}

#[derive(Clone)]
pub struct Neo4jStore {
  graph: Arc<Graph>,
}

impl Neo4jStore {
  pub async fn connect() -> Result<Self, EngineError> {
    let graph = Graph::new(
      &APP_ENV.neo4j_uri,
      &APP_ENV.neo4j_user,
      &APP_ENV.neo4j_password,
    )
    .await
    .map_err(EngineError::fatal)?;

    tracing::info!(uri = %APP_ENV.neo4j_uri, "graph store connected");

    Ok(Self {
      graph: Arc::new(graph),
    })
  }
}

impl GraphStore for Neo4jStore {
  async fn upsert_entity(
    &self,
    key: &EntityKey,
    entity_type: &str,
    properties: Option<&serde_json::Value>,
  ) -> Result<(), EngineError> {
    let label = sanitize_entity_label(entity_type);
    let props = properties
      .map(|p| serde_json::to_string(p).unwrap_or_default())
      .unwrap_or_default();

    let cypher = format!(
      "MERGE (e:{label} {{name: $name, owner_id: $owner_id}}) \
       SET e.props = $props"
    );

    with_store_timeout("neo4j upsert_entity", async {
      self
        .graph
        .run(
          query(&cypher)
            .param("name", key.name.as_str())
            .param("owner_id", key.owner_id.as_str())
            .param("props", props),
        )
        .await
        .map_err(EngineError::transient)
    })
    .await
  }

  async fn upsert_edge(
    &self,
    owner_id: &str,
    source: &str,
    target: &str,
    relation: &str,
  ) -> Result<(), EngineError> {
    let rel_type = sanitize_relation_type(relation);
    let cypher = format!(
      "MATCH (s {{name: $source, owner_id: $owner_id}}) \
       MATCH (t {{name: $target, owner_id: $owner_id}}) \
       MERGE (s)-[r:{rel_type}]->(t)"
    );

    with_store_timeout("neo4j upsert_edge", async {
      self
        .graph
        .run(
          query(&cypher)
            .param("source", source)
            .param("target", target)
            .param("owner_id", owner_id),
        )
        .await
        .map_err(EngineError::transient)
    })
    .await
  }

  async fn delete_edge(
    &self,
    owner_id: &str,
    source: &str,
    target: &str,
    relation: &str,
  ) -> Result<(), EngineError> {
    let rel_type = sanitize_relation_type(relation);
    // Undirected match: extraction order of endpoints is not stable.
    let cypher = format!(
      "MATCH (s {{name: $source, owner_id: $owner_id}})-[r:{rel_type}]-\
       (t {{name: $target, owner_id: $owner_id}}) DELETE r"
    );

    with_store_timeout("neo4j delete_edge", async {
      self
        .graph
        .run(
          query(&cypher)
            .param("source", source)
            .param("target", target)
            .param("owner_id", owner_id),
        )
        .await
        .map_err(EngineError::transient)
    })
    .await
  }

  async fn delete_entity_total(&self, key: &EntityKey) -> Result<(), EngineError> {
    // Edges first, then the node; no reliance on cascade semantics.
    with_store_timeout("neo4j delete_entity_edges", async {
      self
        .graph
        .run(
          query("MATCH (e {name: $name, owner_id: $owner_id})-[r]-() DELETE r")
            .param("name", key.name.as_str())
            .param("owner_id", key.owner_id.as_str()),
        )
        .await
        .map_err(EngineError::transient)
    })
    .await?;

    with_store_timeout("neo4j delete_entity_node", async {
      self
        .graph
        .run(
          query("MATCH (e {name: $name, owner_id: $owner_id}) DELETE e")
            .param("name", key.name.as_str())
            .param("owner_id", key.owner_id.as_str()),
        )
        .await
        .map_err(EngineError::transient)
    })
    .await
  }

  async fn count_incident(&self, key: &EntityKey) -> Result<u64, EngineError> {
    with_store_timeout("neo4j count_incident", async {
      let mut rows = self
        .graph
        .execute(
          query(
            "MATCH (e {name: $name, owner_id: $owner_id}) \
             OPTIONAL MATCH (e)-[r]-() \
             RETURN count(r) AS rel_count",
          )
          .param("name", key.name.as_str())
          .param("owner_id", key.owner_id.as_str()),
        )
        .await
        .map_err(EngineError::transient)?;

      match rows.next().await.map_err(EngineError::transient)? {
        Some(row) => {
          let count: i64 = row.get("rel_count").map_err(EngineError::transient)?;
          Ok(count.max(0) as u64)
        }
        None => Ok(0),
      }
    })
    .await
  }

  async fn neighbors(&self, key: &EntityKey, limit: u64) -> Result<Vec<String>, EngineError> {
    with_store_timeout("neo4j neighbors", async {
      let mut rows = self
        .graph
        .execute(
          query(
            "MATCH (e {name: $name, owner_id: $owner_id})--(n) \
             WHERE n.owner_id = $owner_id \
             RETURN DISTINCT n.name AS name LIMIT $limit",
          )
          .param("name", key.name.as_str())
          .param("owner_id", key.owner_id.as_str())
          .param("limit", limit as i64),
        )
        .await
        .map_err(EngineError::transient)?;

      let mut names = Vec::new();
      while let Some(row) = rows.next().await.map_err(EngineError::transient)? {
        if let Ok(name) = row.get::<String>("name") {
          names.push(name);
        }
      }
      Ok(names)
    })
    .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn relation_type_is_uppercased_and_stripped() {
    assert_eq!(sanitize_relation_type("works at"), "WORKS_AT");
    assert_eq!(sanitize_relation_type("lives-in!"), "LIVESIN");
    assert_eq!(sanitize_relation_type("likes"), "LIKES");
  }

  #[test]
  fn empty_relation_falls_back() {
    assert_eq!(sanitize_relation_type("!!!"), DEFAULT_RELATION);
    assert_eq!(sanitize_relation_type(""), DEFAULT_RELATION);
  }

  #[test]
  fn entity_label_keeps_case_but_strips_symbols() {
    assert_eq!(sanitize_entity_label("person"), "person");
    assert_eq!(sanitize_entity_label("org unit"), "orgunit");
    assert_eq!(sanitize_entity_label("---"), DEFAULT_ENTITY_LABEL);
  }
}
