pub use sea_orm_migration::*;

mod m20260715_01_create_memories_table;
mod m20260715_02_create_facts_table;
mod m20260715_03_create_judgment_audits_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
  fn migrations() -> Vec<Box<dyn MigrationTrait>> {
    vec![
      Box::new(m20260715_01_create_memories_table::Migration),
      Box::new(m20260715_02_create_facts_table::Migration),
      Box::new(m20260715_03_create_judgment_audits_table::Migration),
    ]
  }
}
