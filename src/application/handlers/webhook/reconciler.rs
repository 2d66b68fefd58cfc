//! Shared read-modify-write for reconciliation handlers.
//!
//! Locates the record by the natural key in the event, checks causal order
//! and writes through a conditional update. A rejected write means the
//! record changed after it was read, so the loop re-reads and decides again.

use std::sync::Arc;

use crate::application::handlers::record_writes::{write_conflict, MAX_WRITE_CONFLICTS};
use crate::application::retry::{RetryPolicy, RetryScope};
use crate::domain::billing::{
    BillingError, BillingLogEntry, ReconciliationEffect, UserBillingRecord, WebhookEvent,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{BillingEventLog, BillingRecordStore, UpdateCondition, UpdateOutcome};

/// Natural key used to find the record an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKey<'a> {
    Subscription(&'a str),
    Mandate(&'a str),
}

impl RecordKey<'_> {
    fn field(&self) -> &'static str {
        match self {
            RecordKey::Subscription(_) => "subscription_id",
            RecordKey::Mandate(_) => "mandate_id",
        }
    }

    fn value(&self) -> &str {
        match self {
            RecordKey::Subscription(id) | RecordKey::Mandate(id) => id,
        }
    }
}

/// What happened to one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied(UserBillingRecord),
    /// An equal or newer event already landed.
    Stale,
    /// No record carries the key. Logged, not retried.
    MissingRecord,
}

pub struct RecordReconciler {
    store: Arc<dyn BillingRecordStore>,
    log: Arc<dyn BillingEventLog>,
    retry: RetryPolicy,
}

impl RecordReconciler {
    pub fn new(
        store: Arc<dyn BillingRecordStore>,
        log: Arc<dyn BillingEventLog>,
        retry: RetryPolicy,
    ) -> Self {
        Self { store, log, retry }
    }

    pub fn log(&self) -> &Arc<dyn BillingEventLog> {
        &self.log
    }

    /// Applies `effect` to the record `key` points at, if the event is newer
    /// than everything already applied.
    pub async fn apply(
        &self,
        event: &WebhookEvent,
        key: RecordKey<'_>,
        effect: ReconciliationEffect,
    ) -> Result<ApplyOutcome, BillingError> {
        let scope = scope_for(event, key);

        for _ in 0..MAX_WRITE_CONFLICTS {
            let Some(current) = self.locate(&scope, key).await? else {
                self.log_missing(event, key).await;
                return Ok(ApplyOutcome::MissingRecord);
            };

            if !current.accepts_event_at(&event.created_at) {
                self.log_stale(event, &current).await;
                return Ok(ApplyOutcome::Stale);
            }

            let updated =
                current.with_event_applied(effect, &event.id, event.created_at, Timestamp::now());
            let condition = UpdateCondition::EventNewerThanStored {
                created_at: event.created_at,
                version: current.version,
            };

            let store = self.store.as_ref();
            let updated = &updated;
            let outcome = self
                .retry
                .run(&scope, |_| async move {
                    store
                        .conditional_update(updated, condition)
                        .await
                        .map_err(BillingError::from)
                })
                .await?;

            match outcome {
                UpdateOutcome::Applied(stored) => {
                    self.log_applied(event, &current, &stored).await;
                    return Ok(ApplyOutcome::Applied(stored));
                }
                UpdateOutcome::NotFound => {
                    self.log_missing(event, key).await;
                    return Ok(ApplyOutcome::MissingRecord);
                }
                UpdateOutcome::Rejected => {
                    tracing::debug!(event_id = %event.id, "Record changed under us, re-reading");
                }
            }
        }

        Err(write_conflict(&format!("applying {}", event.id)))
    }

    /// Logs an event whose payload lacks the key its handler needs.
    pub async fn log_missing_link(&self, event: &WebhookEvent, link: &str) {
        self.log
            .append(
                BillingLogEntry::error("webhook_event_missing_link")
                    .with_ids(
                        None,
                        event.links.customer.as_deref(),
                        event.links.subscription.as_deref(),
                    )
                    .with_metadata("event_id", event.id.clone())
                    .with_metadata("event_type", event.key())
                    .with_metadata("link", link.to_string()),
            )
            .await;
    }

    async fn locate(
        &self,
        scope: &RetryScope,
        key: RecordKey<'_>,
    ) -> Result<Option<UserBillingRecord>, BillingError> {
        let store = self.store.as_ref();
        self.retry
            .run(scope, |_| async move {
                let found = match key {
                    RecordKey::Subscription(id) => store.get_by_subscription_id(id).await,
                    RecordKey::Mandate(id) => store.get_by_mandate_id(id).await,
                };
                found.map_err(BillingError::from)
            })
            .await
    }

    async fn log_missing(&self, event: &WebhookEvent, key: RecordKey<'_>) {
        let mut entry = BillingLogEntry::error("billing_record_not_found")
            .with_metadata("event_id", event.id.clone())
            .with_metadata("event_type", event.key())
            .with_metadata(key.field(), key.value().to_string())
            .with_error(format!("No billing record for {} {}", key.field(), key.value()));
        if let RecordKey::Subscription(id) = key {
            entry = entry.with_subscription(id);
        }
        if let Some(customer) = &event.links.customer {
            entry = entry.with_customer(customer.clone());
        }
        self.log.append(entry).await;
    }

    async fn log_stale(&self, event: &WebhookEvent, current: &UserBillingRecord) {
        let mut entry = BillingLogEntry::info("webhook_event_skipped")
            .with_user(current.user_id.clone())
            .with_metadata("event_id", event.id.clone())
            .with_metadata("event_type", event.key())
            .with_metadata("event_created_at", event.created_at.to_string());
        if let Some(last) = &current.last_event_at {
            entry = entry.with_metadata("last_event_at", last.to_string());
        }
        self.log.append(entry).await;
    }

    async fn log_applied(
        &self,
        event: &WebhookEvent,
        before: &UserBillingRecord,
        after: &UserBillingRecord,
    ) {
        self.log
            .append(
                BillingLogEntry::info("billing_record_reconciled")
                    .with_ids(
                        Some(&after.user_id),
                        after.external_customer_id.as_deref(),
                        after.external_subscription_id.as_deref(),
                    )
                    .with_metadata("event_id", event.id.clone())
                    .with_metadata("event_type", event.key())
                    .with_metadata("from_status", before.status.as_str())
                    .with_metadata("to_status", after.status.as_str()),
            )
            .await;
    }
}

fn scope_for(event: &WebhookEvent, key: RecordKey<'_>) -> RetryScope {
    let scope = RetryScope::new(event.key());
    match key {
        RecordKey::Subscription(id) => scope.subscription(id),
        RecordKey::Mandate(_) => scope,
    }
}
