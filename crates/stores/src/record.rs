use std::future::Future;

use chrono::Utc;
use mnemo_entities::{fact, judgment_audit, memory};
use mnemo_shared::{EngineError, FactId, VectorId};
use sea_orm::{
  ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

use crate::with_store_timeout;

pub struct NewFact {
  pub memory_id: Option<i64>,
  pub owner_id: String,
  pub content: String,
  pub category: String,
  pub importance: String,
  pub vector_id: VectorId,
  pub entities: serde_json::Value,
  pub relations: serde_json::Value,
}

pub struct NewAudit {
  pub trace_id: Uuid,
  pub owner_id: String,
  pub api_key_id: Option<i64>,
  pub operation_type: String,
  pub input_content: String,
  pub extracted_facts: serde_json::Value,
  pub existing_memories: serde_json::Value,
  pub llm_response: String,
  pub parsed_operations: serde_json::Value,
  pub reasoning: Option<String>,
  pub execution_success: bool,
  pub error_message: Option<String>,
  pub model_name: String,
  pub latency_ms: i32,
}

/// Contract over the authoritative relational record.
pub trait RecordStore: Send + Sync {
  fn insert_memory(
    &self,
    owner_id: &str,
    content: &str,
    metadata: serde_json::Value,
  ) -> impl Future<Output = Result<i64, EngineError>> + Send;

  fn insert_fact(
    &self,
    fact: NewFact,
  ) -> impl Future<Output = Result<fact::Model, EngineError>> + Send;

  fn update_fact(
    &self,
    id: FactId,
    content: &str,
    entities: serde_json::Value,
    relations: serde_json::Value,
  ) -> impl Future<Output = Result<(), EngineError>> + Send;

  /// Returns false when the row was already gone.
  fn delete_fact(&self, id: FactId) -> impl Future<Output = Result<bool, EngineError>> + Send;

  fn fact_by_vector_id(
    &self,
    owner_id: &str,
    vector_id: VectorId,
  ) -> impl Future<Output = Result<Option<fact::Model>, EngineError>> + Send;

  fn facts_by_vector_ids(
    &self,
    owner_id: &str,
    ids: &[VectorId],
  ) -> impl Future<Output = Result<Vec<fact::Model>, EngineError>> + Send;

  fn facts_by_owner(
    &self,
    owner_id: &str,
  ) -> impl Future<Output = Result<Vec<fact::Model>, EngineError>> + Send;

  fn insert_audit(
    &self,
    audit: NewAudit,
  ) -> impl Future<Output = Result<(), EngineError>> + Send;

  /// Second and final touch of an audit row: the executed-operations
  /// summary after reconciliation.
  fn update_audit_executed(
    &self,
    trace_id: Uuid,
    executed: serde_json::Value,
  ) -> impl Future<Output = Result<(), EngineError>> + Send;
}

fn classify(err: DbErr) -> EngineError {
  match &err {
    DbErr::RecordNotFound(_) => EngineError::NotFound(err.to_string()),
    _ if err.to_string().contains("duplicate key") => EngineError::StoreConflict(err.to_string()),
    _ => EngineError::transient(err),
  }
}

#[derive(Clone)]
pub struct PgRecordStore {
  db: DatabaseConnection,
}

impl PgRecordStore {
  #[must_use]
  pub const fn new(db: DatabaseConnection) -> Self {
    Self { db }
  }
}

impl RecordStore for PgRecordStore {
  async fn insert_memory(
    &self,
    owner_id: &str,
    content: &str,
    metadata: serde_json::Value,
  ) -> Result<i64, EngineError> {
    let now = Utc::now();
    let active = memory::ActiveModel {
      owner_id: Set(owner_id.to_owned()),
      content: Set(content.to_owned()),
      metadata: Set(metadata),
      created_at: Set(now.into()),
      updated_at: Set(now.into()),
      ..Default::default()
    };

    with_store_timeout("insert_memory", async {
      memory::Entity::insert(active)
        .exec(&self.db)
        .await
        .map(|res| res.last_insert_id)
        .map_err(classify)
    })
    .await
  }

  async fn insert_fact(&self, new: NewFact) -> Result<fact::Model, EngineError> {
    let active = fact::ActiveModel {
      memory_id: Set(new.memory_id),
      owner_id: Set(new.owner_id),
      content: Set(new.content),
      category: Set(new.category),
      importance: Set(new.importance),
      vector_id: Set(new.vector_id.as_uuid()),
      entities: Set(new.entities),
      relations: Set(new.relations),
      created_at: Set(Utc::now().into()),
      ..Default::default()
    };

    with_store_timeout("insert_fact", async {
      fact::Entity::insert(active)
        .exec_with_returning(&self.db)
        .await
        .map_err(classify)
    })
    .await
  }

  async fn update_fact(
    &self,
    id: FactId,
    content: &str,
    entities: serde_json::Value,
    relations: serde_json::Value,
  ) -> Result<(), EngineError> {
    with_store_timeout("update_fact", async {
      let Some(model) = fact::Entity::find_by_id(id.get())
        .one(&self.db)
        .await
        .map_err(classify)?
      else {
        return Err(EngineError::NotFound(format!("fact {id} not found")));
      };

      let mut active: fact::ActiveModel = model.into();
      active.content = Set(content.to_owned());
      active.entities = Set(entities);
      active.relations = Set(relations);
      active.update(&self.db).await.map_err(classify)?;
      Ok(())
    })
    .await
  }

  async fn delete_fact(&self, id: FactId) -> Result<bool, EngineError> {
    with_store_timeout("delete_fact", async {
      fact::Entity::delete_by_id(id.get())
        .exec(&self.db)
        .await
        .map(|res| res.rows_affected > 0)
        .map_err(classify)
    })
    .await
  }

  async fn fact_by_vector_id(
    &self,
    owner_id: &str,
    vector_id: VectorId,
  ) -> Result<Option<fact::Model>, EngineError> {
    with_store_timeout("fact_by_vector_id", async {
      fact::Entity::find()
        .filter(fact::Column::OwnerId.eq(owner_id))
        .filter(fact::Column::VectorId.eq(vector_id.as_uuid()))
        .one(&self.db)
        .await
        .map_err(classify)
    })
    .await
  }

  async fn facts_by_vector_ids(
    &self,
    owner_id: &str,
    ids: &[VectorId],
  ) -> Result<Vec<fact::Model>, EngineError> {
    if ids.is_empty() {
      return Ok(vec![]);
    }

    let uuids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
    with_store_timeout("facts_by_vector_ids", async {
      fact::Entity::find()
        .filter(fact::Column::OwnerId.eq(owner_id))
        .filter(fact::Column::VectorId.is_in(uuids))
        .all(&self.db)
        .await
        .map_err(classify)
    })
    .await
  }

  async fn facts_by_owner(&self, owner_id: &str) -> Result<Vec<fact::Model>, EngineError> {
    with_store_timeout("facts_by_owner", async {
      fact::Entity::find()
        .filter(fact::Column::OwnerId.eq(owner_id))
        .all(&self.db)
        .await
        .map_err(classify)
    })
    .await
  }

  async fn insert_audit(&self, audit: NewAudit) -> Result<(), EngineError> {
    let active = judgment_audit::ActiveModel {
      trace_id: Set(audit.trace_id),
      owner_id: Set(audit.owner_id),
      api_key_id: Set(audit.api_key_id),
      operation_type: Set(audit.operation_type),
      input_content: Set(audit.input_content),
      extracted_facts: Set(audit.extracted_facts),
      existing_memories: Set(audit.existing_memories),
      llm_response: Set(audit.llm_response),
      parsed_operations: Set(audit.parsed_operations),
      reasoning: Set(audit.reasoning),
      executed_operations: Set(serde_json::json!({})),
      execution_success: Set(audit.execution_success),
      error_message: Set(audit.error_message),
      model_name: Set(audit.model_name),
      latency_ms: Set(audit.latency_ms),
      created_at: Set(Utc::now().into()),
      is_verified: Set(false),
      ..Default::default()
    };

    with_store_timeout("insert_audit", async {
      judgment_audit::Entity::insert(active)
        .exec(&self.db)
        .await
        .map(|_| ())
        .map_err(classify)
    })
    .await
  }

  async fn update_audit_executed(
    &self,
    trace_id: Uuid,
    executed: serde_json::Value,
  ) -> Result<(), EngineError> {
    with_store_timeout("update_audit_executed", async {
      let Some(model) = judgment_audit::Entity::find()
        .filter(judgment_audit::Column::TraceId.eq(trace_id))
        .one(&self.db)
        .await
        .map_err(classify)?
      else {
        return Err(EngineError::NotFound(format!(
          "judgment audit {trace_id} not found"
        )));
      };

      let mut active: judgment_audit::ActiveModel = model.into();
      active.executed_operations = Set(executed);
      active.update(&self.db).await.map_err(classify)?;
      Ok(())
    })
    .await
  }
}
