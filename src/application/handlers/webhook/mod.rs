//! Webhook intake and reconciliation handlers.

mod customer_events;
mod event_router;
mod mandate_events;
mod payment_events;
mod process_webhook;
mod reconciler;
mod subscription_events;

pub use event_router::{EventRouter, IgnoredEventHandler, ReconciliationHandler};
pub use process_webhook::{ProcessWebhookCommand, ProcessWebhookHandler, ProcessWebhookResult};
pub use reconciler::{ApplyOutcome, RecordKey, RecordReconciler};
