//! mandates.* reconciliation.

use std::sync::Arc;

use async_trait::async_trait;

use super::event_router::ReconciliationHandler;
use super::reconciler::{RecordKey, RecordReconciler};
use crate::domain::billing::{
    BillingError, BillingStatus, EventKind, ReconciliationEffect, WebhookEvent,
};

pub struct MandateEventHandler {
    kind: EventKind,
    reconciler: Arc<RecordReconciler>,
}

impl MandateEventHandler {
    pub fn new(kind: EventKind, reconciler: Arc<RecordReconciler>) -> Self {
        Self { kind, reconciler }
    }
}

#[async_trait]
impl ReconciliationHandler for MandateEventHandler {
    async fn handle(&self, event: &WebhookEvent) -> Result<(), BillingError> {
        let status = match self.kind {
            EventKind::MandateActive => BillingStatus::Active,
            EventKind::MandateCancelled => BillingStatus::Cancelled,
            _ => return Ok(()),
        };
        let Some(mandate_id) = event.links.mandate.as_deref() else {
            self.reconciler.log_missing_link(event, "mandate").await;
            return Ok(());
        };

        self.reconciler
            .apply(
                event,
                RecordKey::Mandate(mandate_id),
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

    #[tokio::test]
    async fn cancelled_mandate_cancels_record() {
        let fixture = Fixture::new().await;

        MandateEventHandler::new(EventKind::MandateCancelled, fixture.reconciler())
            .handle(&event("EV1", 10, "mandates", "cancelled").mandate("MD1").build())
            .await
            .unwrap();

        assert_eq!(fixture.status().await, BillingStatus::Cancelled);
    }

    #[tokio::test]
    async fn unknown_mandate_is_accepted() {
        let fixture = Fixture::new().await;

        let result = MandateEventHandler::new(EventKind::MandateActive, fixture.reconciler())
            .handle(&event("EV1", 10, "mandates", "active").mandate("MD-unknown").build())
            .await;

        assert!(result.is_ok());
        assert_eq!(fixture.status().await, BillingStatus::PendingCustomerApproval);
    }
}
