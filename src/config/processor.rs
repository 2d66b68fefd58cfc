//! Direct-debit processor configuration

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

/// Processor API access and webhook signing.
///
/// Without a `base_url` the binary runs against the in-process mock
/// processor, which is refused in production.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorConfig {
    /// API root, e.g. `https://api.processor.example`
    pub base_url: Option<String>,

    /// Bearer token for outbound calls
    pub access_token: Option<SecretString>,

    /// Shared secret used to sign webhook deliveries
    pub webhook_secret: SecretString,

    /// Value sent in the API version header
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl ProcessorConfig {
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref().filter(|url| !url.trim().is_empty())
    }

    /// True when no processor API is configured.
    pub fn uses_mock(&self) -> bool {
        self.base_url().is_none()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate processor configuration
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if self.webhook_secret.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("PROCESSOR__WEBHOOK_SECRET"));
        }
        if self.timeout_secs == 0 || self.timeout_secs > 120 {
            return Err(ValidationError::InvalidProcessorTimeout);
        }

        let Some(url) = self.base_url() else {
            if *environment == Environment::Production {
                return Err(ValidationError::MockProcessorInProduction);
            }
            return Ok(());
        };
        if !url.starts_with("https://") && !url.starts_with("http://") {
            return Err(ValidationError::InvalidProcessorUrl);
        }
        if *environment == Environment::Production && !url.starts_with("https://") {
            return Err(ValidationError::ProcessorUrlMustBeHttps);
        }
        let has_token = self
            .access_token
            .as_ref()
            .is_some_and(|token| !token.expose_secret().is_empty());
        if !has_token {
            return Err(ValidationError::MissingRequired("PROCESSOR__ACCESS_TOKEN"));
        }
        Ok(())
    }
}

fn default_api_version() -> String {
    "2015-07-06".to_string()
}

fn default_timeout() -> u64 {
    30
}
