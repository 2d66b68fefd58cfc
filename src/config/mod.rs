//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables with the
//! `config` and `dotenvy` crates. Variables use the `BILLING` prefix and
//! nested values are separated by double underscores.
//!
//! # Example
//!
//! ```no_run
//! use billing_reconciler::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod database;
mod error;
mod logging;
mod plans;
mod processor;
mod retry;
mod server;

pub use database::{DatabaseConfig, StorageBackend};
pub use error::{ConfigError, ValidationError};
pub use logging::LoggingConfig;
pub use plans::{load_plan_catalog, parse_plan_catalog};
pub use processor::ProcessorConfig;
pub use retry::RetryConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Billing record storage; in-memory when no URL is set
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Direct-debit processor API and webhook secret
    pub processor: ProcessorConfig,

    /// Backoff for retryable failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Billing log retention
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Reads `.env` (if present) and then `BILLING__*` variables, with `__`
    /// separating nesting levels: `BILLING__RETRY__MAX_ATTEMPTS=5` sets
    /// `retry.max_attempts`.
    ///
    /// Fails when `BILLING__PROCESSOR__WEBHOOK_SECRET` is absent or a value
    /// does not parse. Range checks are left to [`AppConfig::validate`].
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("BILLING")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// First failing section wins.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.processor.validate(&self.server.environment)?;
        self.retry.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
