//! Webhook intake errors.
//!
//! Only the envelope can fail: a bad signature or an undecodable body.
//! Per-event problems are logged by the handlers and never surface here.

use http::StatusCode;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    /// Signature header absent.
    #[error("Missing signature")]
    MissingSignature,

    /// Signature did not match the body, or could not be decoded.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Body is not a valid event batch.
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl WebhookError {
    /// Webhook errors are never retried; re-delivery of the same bytes
    /// fails the same way.
    pub fn is_retryable(&self) -> bool {
        false
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}
