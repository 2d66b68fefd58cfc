//! payments.* reconciliation.
//!
//! Payment events link a mandate and usually a subscription. The record is
//! found by subscription id when present, otherwise by mandate id.

use std::sync::Arc;

use async_trait::async_trait;

use super::event_router::ReconciliationHandler;
use super::reconciler::{RecordKey, RecordReconciler};
use crate::domain::billing::{
    BillingError, BillingLogEntry, BillingStatus, EventKind, ReconciliationEffect, WebhookEvent,
};

pub struct PaymentEventHandler {
    kind: EventKind,
    reconciler: Arc<RecordReconciler>,
}

impl PaymentEventHandler {
    pub fn new(kind: EventKind, reconciler: Arc<RecordReconciler>) -> Self {
        Self { kind, reconciler }
    }

    fn effect(&self) -> Option<ReconciliationEffect> {
        match self.kind {
            EventKind::PaymentConfirmed => Some(ReconciliationEffect::ConfirmPayment),
            // A failed collection cancels outright; there is no grace period.
            EventKind::PaymentFailed => {
                Some(ReconciliationEffect::SetStatus(BillingStatus::Cancelled))
            }
            _ => None,
        }
    }
}

fn record_key(event: &WebhookEvent) -> Option<RecordKey<'_>> {
    event
        .links
        .subscription
        .as_deref()
        .map(RecordKey::Subscription)
        .or_else(|| event.links.mandate.as_deref().map(RecordKey::Mandate))
}

#[async_trait]
impl ReconciliationHandler for PaymentEventHandler {
    async fn handle(&self, event: &WebhookEvent) -> Result<(), BillingError> {
        let Some(effect) = self.effect() else {
            // payments.cancelled: recorded, no state change.
            self.reconciler
                .log()
                .append(
                    BillingLogEntry::info("payment_cancelled")
                        .with_ids(
                            None,
                            event.links.customer.as_deref(),
                            event.links.subscription.as_deref(),
                        )
                        .with_metadata("event_id", event.id.clone())
                        .with_metadata(
                            "payment_id",
                            event.links.payment.clone().unwrap_or_default(),
                        ),
                )
                .await;
            return Ok(());
        };

        let Some(key) = record_key(event) else {
            self.reconciler.log_missing_link(event, "subscription_or_mandate").await;
            return Ok(());
        };

        self.reconciler.apply(event, key, effect).await?;
        Ok(())
    }
}
