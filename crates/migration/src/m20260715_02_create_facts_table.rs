use sea_orm_migration::{
  prelude::*,
  schema::{
    big_integer_null, big_pk_auto, json_binary, text, timestamp_with_time_zone, uuid,
  },
};

use crate::m20260715_01_create_memories_table::Memory;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Fact::Table)
          .if_not_exists()
          .col(big_pk_auto(Fact::Id))
          .col(big_integer_null(Fact::MemoryId))
          .col(text(Fact::OwnerId))
          .col(text(Fact::Content))
          .col(text(Fact::Category).default("fact"))
          .col(text(Fact::Importance).default("medium"))
          .col(uuid(Fact::VectorId))
          .col(json_binary(Fact::Entities))
          .col(json_binary(Fact::Relations))
          .col(
            timestamp_with_time_zone(Fact::CreatedAt)
              .default(Expr::current_timestamp()),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_facts_memory_id")
              .from(Fact::Table, Fact::MemoryId)
              .to(Memory::Table, Memory::Id)
              .on_delete(ForeignKeyAction::SetNull),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_facts_owner_id")
          .table(Fact::Table)
          .col(Fact::OwnerId)
          .to_owned(),
      )
      .await?;

    // One fact per vector point (cross-store key)
    manager
      .create_index(
        Index::create()
          .name("idx_facts_vector_id")
          .table(Fact::Table)
          .col(Fact::VectorId)
          .unique()
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(Fact::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum Fact {
  #[sea_orm(iden = "facts")]
  Table,
  Id,
  MemoryId,
  OwnerId,
  Content,
  Category,
  Importance,
  VectorId,
  Entities,
  Relations,
  CreatedAt,
}
