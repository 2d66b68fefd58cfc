//! Storage backend selection.
//!
//! A blank or missing URL selects the in-memory store, which loses every
//! billing record on restart.

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

const MAX_POOL_SIZE: u32 = 100;

/// Where billing records and log entries live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend<'a> {
    Postgres { url: &'a str },
    InMemory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection before failing the query.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Seconds an idle connection is kept before it is closed.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Apply `migrations/` before serving.
    #[serde(default)]
    pub run_migrations: bool,
}

impl DatabaseConfig {
    pub fn backend(&self) -> StorageBackend<'_> {
        match self.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => StorageBackend::Postgres { url },
            _ => StorageBackend::InMemory,
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Pool bounds are checked even for the in-memory backend so a config
    /// that works locally does not break once a URL is added.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let StorageBackend::Postgres { url } = self.backend() {
            let scheme = url.split("://").next().unwrap_or_default();
            if !matches!(scheme, "postgres" | "postgresql") || !url.contains("://") {
                return Err(ValidationError::InvalidDatabaseUrl);
            }
        }
        if self.max_connections > MAX_POOL_SIZE {
            return Err(ValidationError::PoolSizeTooLarge);
        }
        if self.max_connections == 0 || self.min_connections > self.max_connections {
            return Err(ValidationError::InvalidPoolSize);
        }
        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            run_migrations: false,
        }
    }
}

fn default_min_connections() -> u32 {
    2
}

fn default_max_connections() -> u32 {
    20
}

fn default_acquire_timeout() -> u64 {
    10
}

fn default_idle_timeout() -> u64 {
    600
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_url(url: &str) -> DatabaseConfig {
        DatabaseConfig {
            url: Some(url.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn no_url_means_in_memory() {
        let config = DatabaseConfig::default();
        assert_eq!(config.backend(), StorageBackend::InMemory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn blank_url_means_in_memory() {
        assert_eq!(with_url("   ").backend(), StorageBackend::InMemory);
    }

    #[test]
    fn postgres_url_selects_postgres() {
        let config = with_url(" postgresql://localhost/billing ");
        assert_eq!(
            config.backend(),
            StorageBackend::Postgres {
                url: "postgresql://localhost/billing"
            }
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn other_schemes_are_rejected() {
        assert_eq!(
            with_url("mysql://localhost/billing").validate(),
            Err(ValidationError::InvalidDatabaseUrl)
        );
        assert_eq!(
            with_url("postgres").validate(),
            Err(ValidationError::InvalidDatabaseUrl)
        );
    }

    #[test]
    fn pool_bounds_are_checked() {
        let inverted = DatabaseConfig {
            min_connections: 10,
            max_connections: 5,
            ..Default::default()
        };
        assert_eq!(inverted.validate(), Err(ValidationError::InvalidPoolSize));

        let empty = DatabaseConfig {
            min_connections: 0,
            max_connections: 0,
            ..Default::default()
        };
        assert_eq!(empty.validate(), Err(ValidationError::InvalidPoolSize));

        let huge = DatabaseConfig {
            max_connections: 150,
            ..Default::default()
        };
        assert_eq!(huge.validate(), Err(ValidationError::PoolSizeTooLarge));
    }

    #[test]
    fn timeouts_convert_to_durations() {
        let config = DatabaseConfig {
            acquire_timeout_secs: 3,
            idle_timeout_secs: 60,
            ..Default::default()
        };
        assert_eq!(config.acquire_timeout(), Duration::from_secs(3));
        assert_eq!(config.idle_timeout(), Duration::from_secs(60));
    }
}
