//! Billing log entries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{LogEntryId, Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// One structured, append-only record of something billing-relevant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingLogEntry {
    pub id: LogEntryId,
    pub timestamp: Timestamp,
    pub level: LogLevel,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BillingLogEntry {
    pub fn new(level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            id: LogEntryId::new(),
            timestamp: Timestamp::now(),
            level,
            event: event.into(),
            user_id: None,
            customer_id: None,
            subscription_id: None,
            amount: None,
            currency: None,
            metadata: BTreeMap::new(),
            error: None,
        }
    }

    pub fn info(event: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, event)
    }

    pub fn warn(event: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, event)
    }

    pub fn error(event: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, event)
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_subscription(mut self, subscription_id: impl Into<String>) -> Self {
        self.subscription_id = Some(subscription_id.into());
        self
    }

    pub fn with_amount(mut self, amount: i64, currency: impl Into<String>) -> Self {
        self.amount = Some(amount);
        self.currency = Some(currency.into());
        self
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Sets optional ids in one call, skipping the ones that are absent.
    pub fn with_ids(
        mut self,
        user_id: Option<&UserId>,
        customer_id: Option<&str>,
        subscription_id: Option<&str>,
    ) -> Self {
        if let Some(user_id) = user_id {
            self.user_id = Some(user_id.clone());
        }
        if let Some(customer_id) = customer_id {
            self.customer_id = Some(customer_id.to_string());
        }
        if let Some(subscription_id) = subscription_id {
            self.subscription_id = Some(subscription_id.to_string());
        }
        self
    }

    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Emits the entry through `tracing` under the `billing` target, at the
    /// matching level.
    pub fn trace(&self) {
        let user_id = self.user_id.as_ref().map(|u| u.as_str()).unwrap_or("");
        let customer_id = self.customer_id.as_deref().unwrap_or("");
        let subscription_id = self.subscription_id.as_deref().unwrap_or("");
        let error = self.error.as_deref().unwrap_or("");
        match self.level {
            LogLevel::Info => tracing::info!(
                target: "billing",
                event = %self.event,
                user_id,
                customer_id,
                subscription_id,
                metadata = ?self.metadata,
                "billing event"
            ),
            LogLevel::Warn => tracing::warn!(
                target: "billing",
                event = %self.event,
                user_id,
                customer_id,
                subscription_id,
                metadata = ?self.metadata,
                error,
                "billing event"
            ),
            LogLevel::Error => tracing::error!(
                target: "billing",
                event = %self.event,
                user_id,
                customer_id,
                subscription_id,
                metadata = ?self.metadata,
                error,
                "billing event"
            ),
        }
    }
}
