//! PostgreSQL adapters - Database implementations for the storage ports.
//!
//! - `PostgresBillingRecordStore` - Billing records with conditional updates
//! - `PostgresBillingEventLog` - Durable, queryable billing log

mod billing_event_log;
mod billing_record_store;

pub use billing_event_log::PostgresBillingEventLog;
pub use billing_record_store::PostgresBillingRecordStore;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::DatabaseConfig;
use crate::domain::foundation::DomainError;

/// Opens a pool sized from `config`, running migrations if asked to.
pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<PgPool, DomainError> {
    let pool = PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .idle_timeout(config.idle_timeout())
        .connect(url)
        .await
        .map_err(|e| DomainError::database(format!("Failed to connect to database: {e}")))?;

    if config.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to run migrations: {e}")))?;
        tracing::info!("Database migrations applied");
    }

    Ok(pool)
}
