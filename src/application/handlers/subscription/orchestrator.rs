//! Outbound subscription lifecycle.
//!
//! The orchestrator talks to the processor on the user's behalf. It writes
//! to the billing record only to store processor ids and the initial
//! `pending_customer_approval` status. Every later status change arrives by
//! webhook.

use std::future::Future;
use std::sync::Arc;

use crate::application::handlers::record_writes::{load_record, update_record};
use crate::application::retry::{RetryPolicy, RetryScope};
use crate::domain::billing::{BillingError, BillingLogEntry, PlanCatalog, UserBillingRecord};
use crate::domain::foundation::UserId;
use crate::ports::{BillingEventLog, BillingRecordStore, PaymentProcessor, ProcessorError};

pub struct SubscriptionOrchestrator {
    pub(super) processor: Arc<dyn PaymentProcessor>,
    pub(super) store: Arc<dyn BillingRecordStore>,
    pub(super) log: Arc<dyn BillingEventLog>,
    pub(super) catalog: Arc<PlanCatalog>,
    pub(super) retry: RetryPolicy,
}

impl SubscriptionOrchestrator {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        store: Arc<dyn BillingRecordStore>,
        log: Arc<dyn BillingEventLog>,
        catalog: Arc<PlanCatalog>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            processor,
            store,
            log,
            catalog,
            retry,
        }
    }

    /// Runs one processor call under the retry policy. `call` is invoked
    /// once per attempt and must reuse any idempotency key it was given.
    pub(super) async fn call_processor<T, F, Fut>(
        &self,
        scope: &RetryScope,
        mut call: F,
    ) -> Result<T, BillingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProcessorError>>,
    {
        self.retry
            .run(scope, |_| {
                let fut = call();
                async move { fut.await.map_err(BillingError::from) }
            })
            .await
    }

    pub(super) async fn load(
        &self,
        scope: &RetryScope,
        user_id: &UserId,
    ) -> Result<UserBillingRecord, BillingError> {
        load_record(self.store.as_ref(), &self.retry, scope, user_id).await
    }

    pub(super) async fn update<F>(
        &self,
        scope: &RetryScope,
        user_id: &UserId,
        change: F,
    ) -> Result<UserBillingRecord, BillingError>
    where
        F: FnMut(&UserBillingRecord) -> Result<Option<UserBillingRecord>, BillingError>,
    {
        update_record(self.store.as_ref(), &self.retry, scope, user_id, change).await
    }

    /// Checks that `subscription_id` is the one on the user's record.
    pub(super) fn require_owned(
        record: &UserBillingRecord,
        subscription_id: &str,
    ) -> Result<(), BillingError> {
        if record.external_subscription_id.as_deref() != Some(subscription_id) {
            return Err(BillingError::validation(
                "Subscription does not belong to this user",
            ));
        }
        Ok(())
    }

    /// Records a failed operation. Retry exhaustion is already logged by the
    /// policy, so only terminal failures are written here.
    pub(super) async fn log_failure(&self, scope: &RetryScope, err: &BillingError) {
        if err.is_retryable() {
            return;
        }
        tracing::warn!(operation = %scope.operation, error = %err, "Subscription operation failed");
        let mut entry = BillingLogEntry::error(format!("{}_failed", scope.operation))
            .with_ids(
                scope.user_id.as_ref(),
                scope.customer_id.as_deref(),
                scope.subscription_id.as_deref(),
            )
            .with_metadata("error_kind", err.kind())
            .with_error(err.to_string());
        if let Some(raw) = err.raw() {
            entry = entry.with_metadata("raw", raw.to_string());
        }
        self.log.append(entry).await;
    }
}
