//! customers.* events. Recorded only; customer details are not mirrored.

use std::sync::Arc;

use async_trait::async_trait;

use super::event_router::ReconciliationHandler;
use crate::domain::billing::{BillingError, BillingLogEntry, WebhookEvent};
use crate::ports::BillingEventLog;

pub struct CustomerEventHandler {
    log: Arc<dyn BillingEventLog>,
}

impl CustomerEventHandler {
    pub fn new(log: Arc<dyn BillingEventLog>) -> Self {
        Self { log }
    }
}

#[async_trait]
impl ReconciliationHandler for CustomerEventHandler {
    async fn handle(&self, event: &WebhookEvent) -> Result<(), BillingError> {
        let mut entry = BillingLogEntry::info(format!("customer_{}", event.action))
            .with_metadata("event_id", event.id.clone());
        if let Some(customer) = &event.links.customer {
            entry = entry.with_customer(customer.clone());
        }
        self.log.append(entry).await;
        Ok(())
    }
}
