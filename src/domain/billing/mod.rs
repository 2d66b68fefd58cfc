//! Billing domain module.
//!
//! Handles the per-user billing record, the plan catalog, the processor's
//! resource shapes, webhook decoding and the error taxonomy.
//!
//! # Module Structure
//!
//! - `plan` - Static plan catalog (price, interval, feature limits)
//! - `status` - BillingStatus state machine
//! - `record` - UserBillingRecord and the causal ordering guard
//! - `allowance` - Prompt quota derived from a record and the catalog
//! - `external` - Customer, subscription, mandate and payment shapes
//! - `webhook_event` - Decoded webhook envelope and dispatch keys
//! - `webhook_verifier` - HMAC-SHA256 signature check and batch parsing
//! - `errors` / `error_classifier` - BillingError taxonomy and retryability
//! - `log_entry` - Append-only billing log entries

mod allowance;
mod error_classifier;
mod errors;
mod external;
mod log_entry;
pub(crate) mod plan;
mod record;
mod status;
mod webhook_errors;
mod webhook_event;
mod webhook_verifier;

pub use allowance::{PromptAllowance, FREE_USAGE_PERIOD_DAYS};
pub use error_classifier::ErrorClassifier;
pub use errors::BillingError;
pub use external::{
    CompletedRedirectFlow, CustomerDetails, ExternalCustomer, ExternalSubscription,
    ExternalSubscriptionStatus, Mandate, MandateStatus, Payment, PaymentStatus, RedirectFlow,
    SubscriptionUpdate,
};
pub use log_entry::{BillingLogEntry, LogLevel};
pub use plan::{Plan, PlanCatalog, PlanId, PlanInterval, PlanLimits};
pub use record::{ReconciliationEffect, Usage, UserBillingRecord};
pub use status::BillingStatus;
pub use webhook_errors::WebhookError;
pub use webhook_event::{EventBatch, EventDetails, EventKind, EventLinks, WebhookEvent};
pub use webhook_verifier::{compute_signature, WebhookVerifier, SIGNATURE_HEADER};
