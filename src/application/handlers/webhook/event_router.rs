//! Event Router
//!
//! Dispatch table from `(resource_type, action)` to handler, built once at
//! startup. Pairs without an entry fall through to an explicit no-op arm.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use super::customer_events::CustomerEventHandler;
use super::mandate_events::MandateEventHandler;
use super::payment_events::PaymentEventHandler;
use super::reconciler::RecordReconciler;
use super::subscription_events::SubscriptionEventHandler;
use crate::domain::billing::{BillingError, BillingLogEntry, EventBatch, EventKind, WebhookEvent};
use crate::ports::BillingEventLog;

/// Reconciles one decoded event.
///
/// Implementations return `Ok` for anything that re-delivery would not fix
/// (unknown records, stale events). `Err` is reserved for failures that
/// outlived the retry policy.
#[async_trait]
pub trait ReconciliationHandler: Send + Sync {
    async fn handle(&self, event: &WebhookEvent) -> Result<(), BillingError>;
}

/// Default arm: records that the event was seen and does nothing else.
pub struct IgnoredEventHandler {
    log: Arc<dyn BillingEventLog>,
}

#[async_trait]
impl ReconciliationHandler for IgnoredEventHandler {
    async fn handle(&self, event: &WebhookEvent) -> Result<(), BillingError> {
        self.log
            .append(
                BillingLogEntry::info("webhook_event_ignored")
                    .with_metadata("event_id", event.id.clone())
                    .with_metadata("event_type", event.key()),
            )
            .await;
        Ok(())
    }
}

pub struct EventRouter {
    handlers: HashMap<EventKind, Arc<dyn ReconciliationHandler>>,
    fallback: Arc<dyn ReconciliationHandler>,
    log: Arc<dyn BillingEventLog>,
}

impl EventRouter {
    /// Builds the full dispatch table.
    pub fn new(reconciler: Arc<RecordReconciler>, log: Arc<dyn BillingEventLog>) -> Self {
        let customers: Arc<dyn ReconciliationHandler> =
            Arc::new(CustomerEventHandler::new(log.clone()));

        let mut handlers: HashMap<EventKind, Arc<dyn ReconciliationHandler>> = HashMap::new();
        for kind in EventKind::ALL {
            let handler: Arc<dyn ReconciliationHandler> = match kind {
                EventKind::SubscriptionCreated
                | EventKind::SubscriptionCancelled
                | EventKind::SubscriptionFinished
                | EventKind::SubscriptionPaused
                | EventKind::SubscriptionResumed => {
                    Arc::new(SubscriptionEventHandler::new(kind, reconciler.clone()))
                }
                EventKind::PaymentConfirmed
                | EventKind::PaymentFailed
                | EventKind::PaymentCancelled => {
                    Arc::new(PaymentEventHandler::new(kind, reconciler.clone()))
                }
                EventKind::MandateActive | EventKind::MandateCancelled => {
                    Arc::new(MandateEventHandler::new(kind, reconciler.clone()))
                }
                EventKind::CustomerCreated | EventKind::CustomerUpdated => customers.clone(),
            };
            handlers.insert(kind, handler);
        }

        Self {
            handlers,
            fallback: Arc::new(IgnoredEventHandler { log: log.clone() }),
            log,
        }
    }

    /// Replaces the handler for one kind.
    pub fn with_handler(
        mut self,
        kind: EventKind,
        handler: Arc<dyn ReconciliationHandler>,
    ) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn route(&self, event: &WebhookEvent) -> Arc<dyn ReconciliationHandler> {
        event
            .kind()
            .and_then(|kind| self.handlers.get(&kind))
            .unwrap_or(&self.fallback)
            .clone()
    }

    /// Handles one event; failures are logged and reported as `false`.
    pub async fn dispatch(&self, event: &WebhookEvent) -> bool {
        match self.route(event).handle(event).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(
                    event_id = %event.id,
                    event_type = %event.key(),
                    error = %err,
                    "Webhook event failed"
                );
                let mut entry = BillingLogEntry::error("webhook_event_failed")
                    .with_ids(
                        None,
                        event.links.customer.as_deref(),
                        event.links.subscription.as_deref(),
                    )
                    .with_metadata("event_id", event.id.clone())
                    .with_metadata("event_type", event.key())
                    .with_error(err.to_string());
                if let Some(raw) = err.raw() {
                    entry = entry.with_metadata("raw", raw.to_string());
                }
                self.log.append(entry).await;
                false
            }
        }
    }

    /// Handles every event in the batch independently and concurrently.
    ///
    /// Returns success per event id. An id delivered twice in one batch is
    /// successful only if both deliveries were.
    pub async fn dispatch_batch(&self, batch: &EventBatch) -> BTreeMap<String, bool> {
        let results = join_all(
            batch
                .events
                .iter()
                .map(|event| async move { (event.id.clone(), self.dispatch(event).await) }),
        )
        .await;

        let mut outcome = BTreeMap::new();
        for (id, ok) in results {
            outcome
                .entry(id)
                .and_modify(|existing: &mut bool| *existing &= ok)
                .or_insert(ok);
        }
        outcome
    }
}
