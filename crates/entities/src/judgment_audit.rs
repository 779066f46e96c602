use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Durable record of one judgment invocation.
///
/// Written when the judgment call returns (or fails to parse), then
/// updated exactly once with the executed-operations summary after
/// reconciliation. `trace_id` ties the row to task logs and results.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "judgment_audits")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i64,
  #[sea_orm(unique)]
  pub trace_id: Uuid,
  pub owner_id: String,
  pub api_key_id: Option<i64>,
  pub operation_type: String,
  #[sea_orm(column_type = "Text")]
  pub input_content: String,
  pub extracted_facts: Json,
  pub existing_memories: Json,
  #[sea_orm(column_type = "Text")]
  pub llm_response: String,
  pub parsed_operations: Json,
  #[sea_orm(column_type = "Text", nullable)]
  pub reasoning: Option<String>,
  pub executed_operations: Json,
  pub execution_success: bool,
  #[sea_orm(column_type = "Text", nullable)]
  pub error_message: Option<String>,
  pub model_name: String,
  pub latency_ms: i32,
  pub created_at: DateTimeWithTimeZone,
  pub is_verified: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
