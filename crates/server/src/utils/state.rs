use apalis_postgres::PostgresStorage;
use mnemo_core::ProdEngine;
use mnemo_worker::{MemoryJob, SubscriptionTier};
use sea_orm::DatabaseConnection;

#[derive(Clone)]
pub struct AppState {
  pub db: DatabaseConnection,
  pub engine: ProdEngine,
  pub free_storage: PostgresStorage<MemoryJob>,
  pub pro_storage: PostgresStorage<MemoryJob>,
}

impl AppState {
  #[must_use]
  pub const fn new(
    db: DatabaseConnection,
    engine: ProdEngine,
    free_storage: PostgresStorage<MemoryJob>,
    pro_storage: PostgresStorage<MemoryJob>,
  ) -> Self {
    Self {
      db,
      engine,
      free_storage,
      pro_storage,
    }
  }

  /// The only tier-aware decision in the system.
  #[must_use]
  pub fn storage_for(&self, tier: SubscriptionTier) -> PostgresStorage<MemoryJob> {
    match tier {
      SubscriptionTier::Pro => self.pro_storage.clone(),
      SubscriptionTier::Free => self.free_storage.clone(),
    }
  }
}
