use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Raw authored unit of memory. Created once on task intake, before
/// extraction begins; never mutated afterwards.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "memories")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i64,
  pub owner_id: String,
  #[sea_orm(column_type = "Text")]
  pub content: String,
  pub metadata: Json,
  pub created_at: DateTimeWithTimeZone,
  pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(has_many = "super::fact::Entity")]
  Fact,
}

impl Related<super::fact::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Fact.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
