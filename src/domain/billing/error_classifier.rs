//! Error classification.
//!
//! The one place that decides which failures are retryable. The retry
//! policy only ever asks `BillingError::is_retryable`, whose answer is set
//! here.

use super::errors::BillingError;
use super::webhook_errors::WebhookError;
use crate::domain::foundation::{DomainError, ErrorCode, ValidationError};
use crate::ports::{ProcessorError, ProcessorErrorKind};

/// Processor reason codes that may succeed on a later attempt.
const RETRYABLE_REASONS: [&str; 4] = [
    "internal_error",
    "rate_limit_exceeded",
    "service_unavailable",
    "timeout",
];

pub struct ErrorClassifier;

impl ErrorClassifier {
    /// True if a processor failure with this reason code should be retried.
    pub fn is_retryable_reason(reason: &str) -> bool {
        RETRYABLE_REASONS.contains(&reason)
    }

    pub fn classify_processor(err: &ProcessorError) -> BillingError {
        match err.kind {
            ProcessorErrorKind::InvalidPlan => BillingError::Validation(err.message.clone()),
            ProcessorErrorKind::InvalidState => BillingError::Subscription(err.message.clone()),
            kind => {
                let reason = kind.reason_code();
                BillingError::ExternalApi {
                    status_code: err.status_code.unwrap_or_else(|| default_status(kind)),
                    reason: reason.to_string(),
                    message: err.message.clone(),
                    retryable: Self::is_retryable_reason(reason),
                    raw: err.raw.clone(),
                }
            }
        }
    }

    /// Store and other infrastructure failures. An unavailable store is
    /// treated like an unavailable processor.
    pub fn classify_domain(err: &DomainError) -> BillingError {
        match err.code {
            ErrorCode::ValidationFailed | ErrorCode::BillingRecordNotFound => {
                BillingError::Validation(err.message().to_string())
            }
            ErrorCode::InvalidStateTransition => {
                BillingError::Subscription(err.message().to_string())
            }
            ErrorCode::ConcurrentModification => BillingError::ExternalApi {
                status_code: 409,
                reason: "concurrent_modification".to_string(),
                message: err.message().to_string(),
                retryable: false,
                raw: None,
            },
            ErrorCode::DatabaseError => external("service_unavailable", 503, err.message()),
            ErrorCode::InternalError => external("internal_error", 500, err.message()),
        }
    }

    pub fn classify_webhook(err: &WebhookError) -> BillingError {
        BillingError::Webhook(err.clone())
    }

    pub fn classify_validation(err: &ValidationError) -> BillingError {
        BillingError::Validation(err.to_string())
    }

    /// Anything that fits no other category. Terminal.
    pub fn classify_unexpected(err: &(dyn std::error::Error + 'static)) -> BillingError {
        BillingError::ExternalApi {
            status_code: 500,
            reason: "unknown".to_string(),
            message: err.to_string(),
            retryable: false,
            raw: None,
        }
    }
}

fn external(reason: &str, status_code: u16, message: &str) -> BillingError {
    BillingError::ExternalApi {
        status_code,
        reason: reason.to_string(),
        message: message.to_string(),
        retryable: ErrorClassifier::is_retryable_reason(reason),
        raw: None,
    }
}

fn default_status(kind: ProcessorErrorKind) -> u16 {
    match kind {
        ProcessorErrorKind::ValidationFailed | ProcessorErrorKind::InvalidPlan => 422,
        ProcessorErrorKind::PermissionDenied => 403,
        ProcessorErrorKind::NotFound => 404,
        ProcessorErrorKind::InvalidState => 409,
        ProcessorErrorKind::RateLimitExceeded => 429,
        ProcessorErrorKind::InternalError | ProcessorErrorKind::Unknown => 500,
        ProcessorErrorKind::ServiceUnavailable => 503,
        ProcessorErrorKind::Timeout => 504,
    }
}

impl From<ProcessorError> for BillingError {
    fn from(err: ProcessorError) -> Self {
        ErrorClassifier::classify_processor(&err)
    }
}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        ErrorClassifier::classify_domain(&err)
    }
}
