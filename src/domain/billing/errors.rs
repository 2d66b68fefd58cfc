//! Billing error taxonomy.
//!
//! Every failure that leaves the billing core is one of four kinds. Raw
//! processor payloads are kept for logs and never included in responses.

use http::StatusCode;
use thiserror::Error;

use super::webhook_errors::WebhookError;
use crate::domain::foundation::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillingError {
    /// Bad input. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Illegal subscription state transition. Never retried.
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Signature or envelope failure at the webhook endpoint.
    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    /// Failure of the processor or another external collaborator.
    #[error("External API error ({status_code} {reason}): {message}")]
    ExternalApi {
        status_code: u16,
        reason: String,
        message: String,
        retryable: bool,
        raw: Option<String>,
    },
}

impl BillingError {
    pub fn validation(message: impl Into<String>) -> Self {
        BillingError::Validation(message.into())
    }

    pub fn subscription(message: impl Into<String>) -> Self {
        BillingError::Subscription(message.into())
    }

    /// Whether the retry policy may attempt the operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::ExternalApi { retryable: true, .. })
    }

    /// Short machine-readable kind, used in log metadata and responses.
    pub fn kind(&self) -> &'static str {
        match self {
            BillingError::Validation(_) => "validation_error",
            BillingError::Subscription(_) => "subscription_error",
            BillingError::Webhook(_) => "webhook_error",
            BillingError::ExternalApi { .. } => "external_api_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            BillingError::Validation(_) | BillingError::Webhook(_) => StatusCode::BAD_REQUEST,
            BillingError::Subscription(_) => StatusCode::CONFLICT,
            BillingError::ExternalApi { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Message safe to send to an untrusted caller.
    pub fn public_message(&self) -> String {
        match self {
            BillingError::Validation(msg) | BillingError::Subscription(msg) => msg.clone(),
            BillingError::Webhook(err) => err.to_string(),
            BillingError::ExternalApi { retryable, .. } => {
                if *retryable {
                    "Payment processor is temporarily unavailable, please try again".to_string()
                } else {
                    "Payment processor rejected the request".to_string()
                }
            }
        }
    }

    /// Raw upstream payload, if any. For logs only.
    pub fn raw(&self) -> Option<&str> {
        match self {
            BillingError::ExternalApi { raw, .. } => raw.as_deref(),
            _ => None,
        }
    }
}

impl From<ValidationError> for BillingError {
    fn from(err: ValidationError) -> Self {
        BillingError::Validation(err.to_string())
    }
}
