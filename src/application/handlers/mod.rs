//! Application handlers.
//!
//! - `webhook` - Signed webhook intake and per-event reconciliation
//! - `subscription` - Checkout and subscription lifecycle on the user's behalf
//! - `queries` - Billing record reads and the prompt counter

pub mod queries;
pub mod subscription;
pub mod webhook;

mod record_writes;

#[cfg(test)]
pub(crate) mod test_support;

pub use queries::{BillingOverview, BillingQueries, LogFilter};
pub use subscription::{
    CancelSubscriptionCommand, CompleteCheckoutCommand, CreateSubscriptionCommand,
    CreateSubscriptionResult, StartCheckoutCommand, StartCheckoutResult, SubscriptionOrchestrator,
    UpdateBillingDetailsCommand, UpdateSubscriptionCommand,
};
pub use webhook::{
    EventRouter, ProcessWebhookCommand, ProcessWebhookHandler, ProcessWebhookResult,
    RecordReconciler,
};
