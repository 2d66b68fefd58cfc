//! Read side of the billing record, plus the prompt counter.

use std::sync::Arc;

use serde::Serialize;

use crate::application::handlers::record_writes::{load_record, update_record};
use crate::application::retry::{RetryPolicy, RetryScope};
use crate::domain::billing::{
    BillingError, BillingLogEntry, ExternalCustomer, ExternalSubscription, LogLevel, Mandate,
    PlanCatalog, PromptAllowance, UserBillingRecord,
};
use crate::domain::foundation::{ErrorCode, Timestamp, UserId};
use crate::ports::{BillingEventLog, BillingRecordStore, LogQuery, PaymentProcessor};

/// Most log entries a single request may return.
pub const MAX_LOG_LIMIT: usize = 500;

/// The record together with the processor's current view of it.
#[derive(Debug, Clone, Serialize)]
pub struct BillingOverview {
    pub record: UserBillingRecord,
    pub customer: Option<ExternalCustomer>,
    pub subscription: Option<ExternalSubscription>,
    pub payment_methods: Vec<Mandate>,
}

/// Caller-supplied filters for `BillingQueries::logs`. The user is never
/// taken from here.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub level: Option<LogLevel>,
    pub event: Option<String>,
    pub limit: Option<usize>,
}

pub struct BillingQueries {
    store: Arc<dyn BillingRecordStore>,
    log: Arc<dyn BillingEventLog>,
    processor: Arc<dyn PaymentProcessor>,
    catalog: Arc<PlanCatalog>,
    retry: RetryPolicy,
}

impl BillingQueries {
    pub fn new(
        store: Arc<dyn BillingRecordStore>,
        log: Arc<dyn BillingEventLog>,
        processor: Arc<dyn PaymentProcessor>,
        catalog: Arc<PlanCatalog>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            log,
            processor,
            catalog,
            retry,
        }
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    pub async fn get_record(&self, user_id: &UserId) -> Result<UserBillingRecord, BillingError> {
        let scope = RetryScope::new("get_record").user(user_id);
        load_record(self.store.as_ref(), &self.retry, &scope, user_id).await
    }

    /// Creates the free record a new user starts with. Returns the existing
    /// record if there is one.
    pub async fn provision_record(
        &self,
        user_id: &UserId,
    ) -> Result<UserBillingRecord, BillingError> {
        let scope = RetryScope::new("provision_record").user(user_id);
        let store = self.store.as_ref();

        let existing = self
            .retry
            .run(&scope, |_| async move {
                store.get_by_user_id(user_id).await.map_err(BillingError::from)
            })
            .await?;
        if let Some(record) = existing {
            return Ok(record);
        }

        let record =
            UserBillingRecord::new(user_id.clone(), self.catalog.free_plan(), Timestamp::now());
        match store.insert(&record).await {
            Ok(()) => {
                self.log
                    .append(
                        BillingLogEntry::info("billing_record_created")
                            .with_user(user_id.clone())
                            .with_metadata("plan_id", record.plan_id.to_string()),
                    )
                    .await;
                Ok(record)
            }
            // Lost a race with a concurrent signup.
            Err(err) if err.code == ErrorCode::ValidationFailed => self.get_record(user_id).await,
            Err(err) => Err(err.into()),
        }
    }

    pub async fn prompt_allowance(
        &self,
        user_id: &UserId,
    ) -> Result<PromptAllowance, BillingError> {
        let record = self.get_record(user_id).await?;
        Ok(PromptAllowance::for_record(&record, &self.catalog, Timestamp::now()))
    }

    /// Counts one prompt against the allowance. Fails with a validation
    /// error once the allowance is spent.
    pub async fn record_prompt_use(
        &self,
        user_id: &UserId,
    ) -> Result<PromptAllowance, BillingError> {
        let scope = RetryScope::new("record_prompt_use").user(user_id);
        let catalog = self.catalog.as_ref();
        let now = Timestamp::now();

        let record = update_record(self.store.as_ref(), &self.retry, &scope, user_id, |current| {
            current
                .with_prompt_used(catalog, now)
                .map(Some)
                .map_err(BillingError::from)
        })
        .await?;

        Ok(PromptAllowance::for_record(&record, catalog, now))
    }

    /// The record plus live processor state. Processor lookups that fail
    /// after retries fail the whole query.
    pub async fn billing_overview(
        &self,
        user_id: &UserId,
    ) -> Result<BillingOverview, BillingError> {
        let record = self.get_record(user_id).await?;
        let processor = self.processor.as_ref();

        let (customer, payment_methods) = match record.external_customer_id.as_deref() {
            Some(customer_id) => {
                let scope = RetryScope::new("get_customer").user(user_id).customer(customer_id);
                let customer = self
                    .retry
                    .run(&scope, |_| async move {
                        processor.get_customer(customer_id).await.map_err(BillingError::from)
                    })
                    .await?;
                let mandates = self
                    .retry
                    .run(&scope, |_| async move {
                        processor
                            .list_payment_methods(customer_id)
                            .await
                            .map_err(BillingError::from)
                    })
                    .await?;
                (customer, mandates)
            }
            None => (None, Vec::new()),
        };

        let subscription = match record.external_subscription_id.as_deref() {
            Some(subscription_id) => {
                let scope = RetryScope::new("get_subscription")
                    .user(user_id)
                    .subscription(subscription_id);
                self.retry
                    .run(&scope, |_| async move {
                        processor
                            .get_subscription(subscription_id)
                            .await
                            .map_err(BillingError::from)
                    })
                    .await?
            }
            None => None,
        };

        Ok(BillingOverview {
            record,
            customer,
            subscription,
            payment_methods,
        })
    }

    /// Log entries for one user, newest first.
    pub async fn logs(
        &self,
        user_id: &UserId,
        filter: LogFilter,
    ) -> Result<Vec<BillingLogEntry>, BillingError> {
        let query = LogQuery {
            level: filter.level,
            event: filter.event,
            limit: Some(filter.limit.unwrap_or(MAX_LOG_LIMIT).min(MAX_LOG_LIMIT)),
            ..LogQuery::for_user(user_id.clone())
        };
        Ok(self.log.query(&query).await?)
    }
}
