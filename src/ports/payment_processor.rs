//! Payment processor port.
//!
//! Outbound calls to the direct-debit processor. Implementations translate
//! the processor's wire shapes into `domain::billing` types at the boundary
//! and validate plan ids against the catalog before any network call.
//!
//! # Design
//!
//! - **Typed results**: every operation returns a domain type or a
//!   `ProcessorError`, never a raw response
//! - **Idempotent creates**: create calls carry an `IdempotencyKey` that the
//!   caller reuses across retries

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::billing::{
    CompletedRedirectFlow, CustomerDetails, ExternalCustomer, ExternalSubscription, Mandate,
    PlanId, RedirectFlow, SubscriptionUpdate,
};
use crate::domain::foundation::UserId;

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<ExternalCustomer, ProcessorError>;

    /// Returns `None` if the processor has no such customer.
    async fn get_customer(&self, customer_id: &str)
        -> Result<Option<ExternalCustomer>, ProcessorError>;

    async fn update_customer(
        &self,
        customer_id: &str,
        details: CustomerDetails,
    ) -> Result<ExternalCustomer, ProcessorError>;

    /// Starts the mandate setup handshake. Fails with `InvalidPlan` before
    /// any network call if the plan is unknown.
    async fn create_redirect_flow(
        &self,
        request: CreateRedirectFlowRequest,
    ) -> Result<RedirectFlow, ProcessorError>;

    async fn complete_redirect_flow(
        &self,
        redirect_flow_id: &str,
        session_token: &str,
    ) -> Result<CompletedRedirectFlow, ProcessorError>;

    /// Fails with `InvalidPlan` before any network call if the plan is
    /// unknown or not billable.
    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<ExternalSubscription, ProcessorError>;

    /// Returns `None` if the processor has no such subscription.
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<ExternalSubscription>, ProcessorError>;

    async fn update_subscription(
        &self,
        subscription_id: &str,
        update: SubscriptionUpdate,
    ) -> Result<ExternalSubscription, ProcessorError>;

    /// If `at_period_end` is true the subscription ends after the current
    /// charge date instead of immediately.
    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> Result<ExternalSubscription, ProcessorError>;

    /// Mandates held for the customer.
    async fn list_payment_methods(&self, customer_id: &str) -> Result<Vec<Mandate>, ProcessorError>;
}

/// Key sent as the `Idempotency-Key` header on create calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Same parts, same key. Hashed so the header value stays short and
    /// ASCII whatever the parts contain.
    pub fn derived(parts: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for IdempotencyKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct CreateCustomerRequest {
    /// Stored as processor metadata so events can be traced back.
    pub user_id: UserId,
    pub details: CustomerDetails,
    pub idempotency_key: IdempotencyKey,
}

#[derive(Debug, Clone)]
pub struct CreateRedirectFlowRequest {
    pub plan_id: PlanId,
    pub description: String,
    pub session_token: String,
    pub success_redirect_url: String,
    pub prefilled_email: Option<String>,
    pub customer_id: Option<String>,
    pub idempotency_key: IdempotencyKey,
}

#[derive(Debug, Clone)]
pub struct CreateSubscriptionRequest {
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub customer_id: String,
    pub mandate_id: String,
    pub metadata: HashMap<String, String>,
    pub idempotency_key: IdempotencyKey,
}

/// Why a processor call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessorErrorKind {
    /// Plan id rejected locally; no call was made.
    InvalidPlan,
    /// Resource is in a state that forbids the operation (e.g. already cancelled).
    InvalidState,
    ValidationFailed,
    NotFound,
    PermissionDenied,
    RateLimitExceeded,
    InternalError,
    ServiceUnavailable,
    /// No response within the per-call timeout. The remote side may have
    /// committed.
    Timeout,
    Unknown,
}

impl ProcessorErrorKind {
    /// Reason code used in logs and in `BillingError::ExternalApi`.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ProcessorErrorKind::InvalidPlan => "invalid_plan",
            ProcessorErrorKind::InvalidState => "invalid_state",
            ProcessorErrorKind::ValidationFailed => "validation_failed",
            ProcessorErrorKind::NotFound => "not_found",
            ProcessorErrorKind::PermissionDenied => "permission_denied",
            ProcessorErrorKind::RateLimitExceeded => "rate_limit_exceeded",
            ProcessorErrorKind::InternalError => "internal_error",
            ProcessorErrorKind::ServiceUnavailable => "service_unavailable",
            ProcessorErrorKind::Timeout => "timeout",
            ProcessorErrorKind::Unknown => "unknown",
        }
    }

    /// Best-effort kind from an HTTP status alone.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => ProcessorErrorKind::ValidationFailed,
            401 | 403 => ProcessorErrorKind::PermissionDenied,
            404 => ProcessorErrorKind::NotFound,
            409 => ProcessorErrorKind::InvalidState,
            429 => ProcessorErrorKind::RateLimitExceeded,
            500 => ProcessorErrorKind::InternalError,
            502 | 503 => ProcessorErrorKind::ServiceUnavailable,
            504 => ProcessorErrorKind::Timeout,
            _ => ProcessorErrorKind::Unknown,
        }
    }
}

impl fmt::Display for ProcessorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason_code())
    }
}

/// Raw failure from the processor client. Classified into a `BillingError`
/// by `ErrorClassifier`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ProcessorError {
    pub kind: ProcessorErrorKind,
    /// HTTP status returned by the processor, if a response arrived.
    pub status_code: Option<u16>,
    pub message: String,
    /// Unmodified response body. Logged, never returned to callers.
    pub raw: Option<String>,
}

impl ProcessorError {
    pub fn new(kind: ProcessorErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status_code: None,
            message: message.into(),
            raw: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }

    pub fn invalid_plan(plan_id: &PlanId) -> Self {
        Self::new(
            ProcessorErrorKind::InvalidPlan,
            format!("Unknown or non-billable plan: {}", plan_id),
        )
    }

    /// Connection-level failure; no response arrived.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProcessorErrorKind::ServiceUnavailable, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProcessorErrorKind::Timeout, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(ProcessorErrorKind::NotFound, format!("{} not found", resource))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_processor_is_object_safe() {
        fn _accepts_dyn(_processor: &dyn PaymentProcessor) {}
    }

    #[test]
    fn status_codes_map_to_kinds() {
        assert_eq!(ProcessorErrorKind::from_status(429), ProcessorErrorKind::RateLimitExceeded);
        assert_eq!(ProcessorErrorKind::from_status(503), ProcessorErrorKind::ServiceUnavailable);
        assert_eq!(ProcessorErrorKind::from_status(404), ProcessorErrorKind::NotFound);
        assert_eq!(ProcessorErrorKind::from_status(418), ProcessorErrorKind::Unknown);
    }

    #[test]
    fn display_includes_reason_code() {
        let err = ProcessorError::new(ProcessorErrorKind::RateLimitExceeded, "slow down");
        assert_eq!(err.to_string(), "rate_limit_exceeded: slow down");
    }

    #[test]
    fn idempotency_keys_are_unique() {
        assert_ne!(IdempotencyKey::new(), IdempotencyKey::new());
    }

    #[test]
    fn derived_keys_depend_only_on_their_parts() {
        let key = IdempotencyKey::derived(&["create_subscription", "user-1", "3", "pro"]);
        assert_eq!(key, IdempotencyKey::derived(&["create_subscription", "user-1", "3", "pro"]));
        assert_ne!(key, IdempotencyKey::derived(&["create_subscription", "user-1", "4", "pro"]));
        assert_ne!(
            IdempotencyKey::derived(&["ab", "c"]),
            IdempotencyKey::derived(&["a", "bc"])
        );
        assert_eq!(key.as_str().len(), 64);
    }
}
