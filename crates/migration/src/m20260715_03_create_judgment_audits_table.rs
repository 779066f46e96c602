use sea_orm_migration::{
  prelude::*,
  schema::{
    big_integer_null, big_pk_auto, boolean, integer, json_binary, text, text_null,
    timestamp_with_time_zone, uuid,
  },
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(JudgmentAudit::Table)
          .if_not_exists()
          .col(big_pk_auto(JudgmentAudit::Id))
          .col(uuid(JudgmentAudit::TraceId))
          .col(text(JudgmentAudit::OwnerId))
          .col(big_integer_null(JudgmentAudit::ApiKeyId))
          .col(text(JudgmentAudit::OperationType))
          .col(text(JudgmentAudit::InputContent))
          .col(json_binary(JudgmentAudit::ExtractedFacts))
          .col(json_binary(JudgmentAudit::ExistingMemories))
          .col(text(JudgmentAudit::LlmResponse))
          .col(json_binary(JudgmentAudit::ParsedOperations))
          .col(text_null(JudgmentAudit::Reasoning))
          .col(json_binary(JudgmentAudit::ExecutedOperations))
          .col(boolean(JudgmentAudit::ExecutionSuccess).default(true))
          .col(text_null(JudgmentAudit::ErrorMessage))
          .col(text(JudgmentAudit::ModelName))
          .col(integer(JudgmentAudit::LatencyMs).default(0))
          .col(
            timestamp_with_time_zone(JudgmentAudit::CreatedAt)
              .default(Expr::current_timestamp()),
          )
          .col(boolean(JudgmentAudit::IsVerified).default(false))
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_judgment_audits_trace_id")
          .table(JudgmentAudit::Table)
          .col(JudgmentAudit::TraceId)
          .unique()
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_judgment_audits_owner_id")
          .table(JudgmentAudit::Table)
          .col(JudgmentAudit::OwnerId)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(JudgmentAudit::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum JudgmentAudit {
  #[sea_orm(iden = "judgment_audits")]
  Table,
  Id,
  TraceId,
  OwnerId,
  ApiKeyId,
  OperationType,
  InputContent,
  ExtractedFacts,
  ExistingMemories,
  LlmResponse,
  ParsedOperations,
  Reasoning,
  ExecutedOperations,
  ExecutionSuccess,
  ErrorMessage,
  ModelName,
  LatencyMs,
  CreatedAt,
  IsVerified,
}
