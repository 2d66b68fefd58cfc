//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    #[error("Plan catalog is invalid: {0}")]
    InvalidPlanCatalog(String),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Invalid processor base URL")]
    InvalidProcessorUrl,

    #[error("Processor base URL must use HTTPS in production")]
    ProcessorUrlMustBeHttps,

    #[error("Mock processor cannot be used in production")]
    MockProcessorInProduction,

    #[error("Processor timeout must be between 1 and 120 seconds")]
    InvalidProcessorTimeout,

    #[error("Retry max_attempts must be between 1 and 10")]
    InvalidRetryAttempts,

    #[error("Retry base delay must be between 1 and 60000 ms")]
    InvalidRetryDelay,

    #[error("Log retention must be at least one day")]
    InvalidRetention,
}
