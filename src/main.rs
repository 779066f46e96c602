use apalis_postgres::{Config, PostgresStorage};
use mnemo_core::MemoryEngine;
use mnemo_migration::{Migrator, MigratorTrait};
use mnemo_server::server;
use mnemo_shared::{APP_ENV, AppError};
use mnemo_stores::{Neo4jStore, PgRecordStore, QdrantStore};
use mnemo_worker::{MemoryJob, worker};
use sea_orm::Database;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), AppError> {
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into()),
    )
    .with(tracing_subscriber::fmt::layer())
    .init();

  let db = Database::connect(APP_ENV.database_url.as_str()).await?;

  // Apply all pending migrations
  // https://www.sea-ql.org/SeaORM/docs/migration/running-migration/#migrating-programmatically
  Migrator::up(&db, None).await?;
  PostgresStorage::setup(&db.get_postgres_connection_pool()).await?;

  // One namespaced queue per subscription tier; prefetch is bounded by
  // the worker, not the broker.
  let free_storage = PostgresStorage::<MemoryJob>::new_with_config(
    db.get_postgres_connection_pool(),
    Config::new(&APP_ENV.queue_free),
  );
  let pro_storage = PostgresStorage::<MemoryJob>::new_with_config(
    db.get_postgres_connection_pool(),
    Config::new(&APP_ENV.queue_pro),
  );

  let engine = MemoryEngine::new(
    QdrantStore::connect()?,
    Neo4jStore::connect().await?,
    PgRecordStore::new(db.clone()),
  );

  let _ = tokio::try_join!(
    worker(engine.clone(), free_storage.clone(), pro_storage.clone()),
    server(db.clone(), engine, free_storage, pro_storage)
  );

  Ok(())
}
