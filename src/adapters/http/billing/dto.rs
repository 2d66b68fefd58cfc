//! Request and response bodies for the billing endpoints.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::application::handlers::{CreateSubscriptionResult, LogFilter, StartCheckoutResult};
use crate::domain::billing::{
    BillingError, BillingLogEntry, ExternalSubscription, LogLevel, Plan, UserBillingRecord,
};

/// Acknowledgement for accepted webhook deliveries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Error body. `error` is the machine-readable kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            message: message.into(),
        }
    }
}

impl From<&BillingError> for ErrorResponse {
    fn from(err: &BillingError) -> Self {
        Self::new(err.kind(), err.public_message())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartCheckoutRequest {
    pub plan_id: String,
    pub success_redirect_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartCheckoutResponse {
    pub redirect_flow_id: String,
    pub redirect_url: String,
    pub session_token: String,
    pub customer_id: String,
}

impl From<StartCheckoutResult> for StartCheckoutResponse {
    fn from(result: StartCheckoutResult) -> Self {
        Self {
            redirect_flow_id: result.redirect_flow.id,
            redirect_url: result.redirect_flow.redirect_url,
            session_token: result.redirect_flow.session_token,
            customer_id: result.customer_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteCheckoutRequest {
    pub redirect_flow_id: String,
    pub session_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub plan_id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelSubscriptionRequest {
    #[serde(default)]
    pub at_period_end: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    pub subscription: ExternalSubscription,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<UserBillingRecord>,
}

impl From<CreateSubscriptionResult> for SubscriptionResponse {
    fn from(result: CreateSubscriptionResult) -> Self {
        Self {
            subscription: result.subscription,
            record: Some(result.record),
        }
    }
}

impl From<ExternalSubscription> for SubscriptionResponse {
    fn from(subscription: ExternalSubscription) -> Self {
        Self {
            subscription,
            record: None,
        }
    }
}

/// Query string of `GET /billing/logs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogsQuery {
    pub level: Option<String>,
    pub event: Option<String>,
    pub limit: Option<usize>,
}

impl LogsQuery {
    pub fn into_filter(self) -> Result<LogFilter, BillingError> {
        let level = self
            .level
            .map(|raw| {
                LogLevel::parse(&raw)
                    .ok_or_else(|| BillingError::validation(format!("Unknown log level '{raw}'")))
            })
            .transpose()?;
        Ok(LogFilter {
            level,
            event: self.event.filter(|e| !e.is_empty()),
            limit: self.limit,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogsResponse {
    pub entries: Vec<BillingLogEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlansResponse {
    pub plans: Vec<Plan>,
}
