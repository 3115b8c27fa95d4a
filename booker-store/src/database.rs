use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

use crate::app_config::DatabaseConfig;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(cfg: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&cfg.url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

/// Every driver-level failure is treated as the backend being unreachable;
/// callers decide whether the operation is safe to repeat.
pub(crate) fn store_unavailable(err: sqlx::Error) -> booker_core::StoreError {
    booker_core::StoreError::Unavailable(err.to_string())
}

pub(crate) fn ledger_unavailable(err: sqlx::Error) -> booker_core::LedgerError {
    booker_core::LedgerError::Unavailable(err.to_string())
}
