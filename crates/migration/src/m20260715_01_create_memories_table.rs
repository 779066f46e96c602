use sea_orm_migration::{
  prelude::*,
  schema::{big_pk_auto, json_binary, text, timestamp_with_time_zone},
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Memory::Table)
          .if_not_exists()
          .col(big_pk_auto(Memory::Id))
          .col(text(Memory::OwnerId))
          .col(text(Memory::Content))
          .col(json_binary(Memory::Metadata))
          .col(
            timestamp_with_time_zone(Memory::CreatedAt)
              .default(Expr::current_timestamp()),
          )
          .col(
            timestamp_with_time_zone(Memory::UpdatedAt)
              .default(Expr::current_timestamp()),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_memories_owner_id")
          .table(Memory::Table)
          .col(Memory::OwnerId)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(Memory::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum Memory {
  #[sea_orm(iden = "memories")]
  Table,
  Id,
  OwnerId,
  Content,
  Metadata,
  CreatedAt,
  UpdatedAt,
}
