use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Atomic distilled claim, the unit of judgment.
///
/// `vector_id` is the cross-store key: it equals the id of the fact's
/// point in the vector index, and the unique index on it guarantees at
/// most one fact per point. `entities` and `relations` hold the
/// authoritative extraction; the vector payload only denormalizes them
/// for filtering.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "facts")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i64,
  pub memory_id: Option<i64>,
  pub owner_id: String,
  #[sea_orm(column_type = "Text")]
  pub content: String,
  pub category: String,
  pub importance: String,
  #[sea_orm(unique)]
  pub vector_id: Uuid,
  pub entities: Json,
  pub relations: Json,
  pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "super::memory::Entity",
    from = "Column::MemoryId",
    to = "super::memory::Column::Id"
  )]
  Memory,
}

impl Related<super::memory::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Memory.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
