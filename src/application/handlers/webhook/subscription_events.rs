//! subscriptions.* reconciliation.

use std::sync::Arc;

use async_trait::async_trait;

use super::event_router::ReconciliationHandler;
use super::reconciler::{RecordKey, RecordReconciler};
use crate::domain::billing::{
    BillingError, BillingStatus, EventKind, ReconciliationEffect, WebhookEvent,
};

pub struct SubscriptionEventHandler {
    kind: EventKind,
    reconciler: Arc<RecordReconciler>,
}

impl SubscriptionEventHandler {
    pub fn new(kind: EventKind, reconciler: Arc<RecordReconciler>) -> Self {
        Self { kind, reconciler }
    }

    fn target_status(&self) -> Option<BillingStatus> {
        match self.kind {
            EventKind::SubscriptionCreated | EventKind::SubscriptionResumed => {
                Some(BillingStatus::Active)
            }
            EventKind::SubscriptionCancelled => Some(BillingStatus::Cancelled),
            EventKind::SubscriptionFinished => Some(BillingStatus::Finished),
            EventKind::SubscriptionPaused => Some(BillingStatus::Paused),
            _ => None,
        }
    }
}

#[async_trait]
impl ReconciliationHandler for SubscriptionEventHandler {
    async fn handle(&self, event: &WebhookEvent) -> Result<(), BillingError> {
        let Some(status) = self.target_status() else {
            return Ok(());
        };
        let Some(subscription_id) = event.links.subscription.as_deref() else {
            self.reconciler.log_missing_link(event, "subscription").await;
            return Ok(());
        };

        self.reconciler
            .apply(
                event,
                RecordKey::Subscription(subscription_id),
                ReconciliationEffect::SetStatus(status),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::test_support::{event, Fixture};
    use crate::domain::billing::LogLevel;

    async fn handle(fixture: &Fixture, kind: EventKind, ev: WebhookEvent) {
        SubscriptionEventHandler::new(kind, fixture.reconciler())
            .handle(&ev)
            .await
            .unwrap();
    }

    fn on_sb1(id: &str, secs: i64, action: &str) -> WebhookEvent {
        event(id, secs, "subscriptions", action).subscription("SB1").build()
    }

    #[tokio::test]
    async fn lifecycle_follows_events() {
        let fixture = Fixture::new().await;

        handle(&fixture, EventKind::SubscriptionCreated, on_sb1("EV1", 10, "created")).await;
        assert_eq!(fixture.status().await, BillingStatus::Active);

        handle(&fixture, EventKind::SubscriptionPaused, on_sb1("EV2", 20, "paused")).await;
        assert_eq!(fixture.status().await, BillingStatus::Paused);

        handle(&fixture, EventKind::SubscriptionResumed, on_sb1("EV3", 30, "resumed")).await;
        assert_eq!(fixture.status().await, BillingStatus::Active);

        handle(&fixture, EventKind::SubscriptionFinished, on_sb1("EV4", 40, "finished")).await;
        assert_eq!(fixture.status().await, BillingStatus::Finished);
    }

    #[tokio::test]
    async fn event_without_subscription_link_is_logged() {
        let fixture = Fixture::new().await;

        let unlinked = event("EV1", 10, "subscriptions", "cancelled").build();
        handle(&fixture, EventKind::SubscriptionCancelled, unlinked).await;

        assert_eq!(fixture.status().await, BillingStatus::PendingCustomerApproval);
        assert_eq!(fixture.log.count_level(LogLevel::Error).await, 1);
    }
}
