//! Shared fixtures for handler tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::adapters::memory::{InMemoryBillingEventLog, InMemoryBillingRecordStore};
use crate::adapters::processor::MockPaymentProcessor;
use crate::application::handlers::queries::BillingQueries;
use crate::application::handlers::subscription::SubscriptionOrchestrator;
use crate::application::handlers::webhook::{EventRouter, ProcessWebhookHandler, RecordReconciler};
use crate::application::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::domain::billing::plan::tests::test_catalog;
use crate::domain::billing::{
    BillingStatus, EventLinks, ExternalCustomer, ExternalSubscription, ExternalSubscriptionStatus,
    Mandate, MandateStatus, PlanCatalog, PlanId, UserBillingRecord, WebhookEvent, WebhookVerifier,
};
use crate::domain::foundation::{AuthenticatedUser, Timestamp, UserId};
use crate::ports::{BillingRecordStore, UpdateCondition, UpdateOutcome};

pub(crate) const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub(crate) const USER_ID: &str = "user-1";
pub(crate) const FREE_USER_ID: &str = "user-2";

pub(crate) fn ts(secs: i64) -> Timestamp {
    Timestamp::from_unix_secs(1_700_000_000 + secs)
}

pub(crate) struct Fixture {
    pub store: Arc<InMemoryBillingRecordStore>,
    pub log: Arc<InMemoryBillingEventLog>,
    pub processor: Arc<MockPaymentProcessor>,
    pub catalog: Arc<PlanCatalog>,
}

impl Fixture {
    /// No records and an empty processor.
    pub fn empty() -> Self {
        let catalog = Arc::new(test_catalog());
        Self {
            store: Arc::new(InMemoryBillingRecordStore::new()),
            log: Arc::new(InMemoryBillingEventLog::new()),
            processor: Arc::new(MockPaymentProcessor::new(catalog.clone())),
            catalog,
        }
    }

    /// `user-1` on pro, awaiting customer approval: customer `CU1`, mandate
    /// `MD1`, subscription `SB1`. Nothing is logged.
    pub async fn new() -> Self {
        let fixture = Self::empty();
        let pro = fixture.catalog.require(&PlanId::new("pro")).unwrap().clone();

        let mut record =
            UserBillingRecord::new(fixture.user_id(), fixture.catalog.free_plan(), ts(0));
        record.attach_mandate("CU1".into(), "MD1".into(), ts(0));
        record.begin_subscription("SB1".into(), &pro, None, ts(0)).unwrap();
        fixture.store.insert(&record).await.unwrap();

        fixture.processor.add_customer(customer("CU1", "user1@example.com"));
        fixture.processor.add_mandate("CU1", mandate("MD1"));
        fixture.processor.add_subscription(ExternalSubscription {
            id: "SB1".into(),
            customer_id: Some("CU1".into()),
            plan_id: pro.id.clone(),
            mandate_id: "MD1".into(),
            status: ExternalSubscriptionStatus::PendingCustomerApproval,
            start_date: None,
            end_date: None,
            next_charge_date: None,
            metadata: HashMap::new(),
        });
        fixture
    }

    /// `new()` plus `user-2` on the free plan with no processor customer.
    pub async fn with_free_user() -> Self {
        let fixture = Self::new().await;
        let record = UserBillingRecord::new(
            fixture.free_user().id,
            fixture.catalog.free_plan(),
            Timestamp::now(),
        );
        fixture.store.insert(&record).await.unwrap();
        fixture
    }

    /// `with_free_user()` where `user-2` has completed checkout as `CU2`
    /// with mandate `MD2`.
    pub async fn with_mandated_free_user() -> Self {
        let fixture = Self::with_free_user().await;
        let mut record = fixture.free_user_record().await;
        record.attach_mandate("CU2".into(), "MD2".into(), Timestamp::now());
        let outcome = fixture
            .store
            .conditional_update(&record, UpdateCondition::VersionMatches(record.version))
            .await
            .unwrap();
        assert!(outcome.is_applied());
        fixture.processor.add_customer(customer("CU2", "free@example.com"));
        fixture.processor.add_mandate("CU2", mandate("MD2"));
        fixture
    }

    pub fn user_id(&self) -> UserId {
        UserId::new(USER_ID).unwrap()
    }

    pub fn free_user(&self) -> AuthenticatedUser {
        AuthenticatedUser::new(
            UserId::new(FREE_USER_ID).unwrap(),
            "free@example.com",
            Some("Free User".to_string()),
        )
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy::new(DEFAULT_MAX_ATTEMPTS, Duration::from_millis(1), self.log.clone())
    }

    pub fn reconciler(&self) -> Arc<RecordReconciler> {
        Arc::new(RecordReconciler::new(
            self.store.clone(),
            self.log.clone(),
            self.retry(),
        ))
    }

    pub fn router(&self) -> EventRouter {
        EventRouter::new(self.reconciler(), self.log.clone())
    }

    pub fn webhook_handler(&self) -> ProcessWebhookHandler {
        ProcessWebhookHandler::new(
            WebhookVerifier::new(SecretString::new(WEBHOOK_SECRET.to_string())),
            Arc::new(self.router()),
            self.log.clone(),
        )
    }

    pub fn orchestrator(&self) -> SubscriptionOrchestrator {
        SubscriptionOrchestrator::new(
            self.processor.clone(),
            self.store.clone(),
            self.log.clone(),
            self.catalog.clone(),
            self.retry(),
        )
    }

    pub fn queries(&self) -> BillingQueries {
        BillingQueries::new(
            self.store.clone(),
            self.log.clone(),
            self.processor.clone(),
            self.catalog.clone(),
            self.retry(),
        )
    }

    pub async fn record(&self) -> UserBillingRecord {
        self.store
            .get_by_user_id(&self.user_id())
            .await
            .unwrap()
            .expect("seeded record")
    }

    pub async fn free_user_record(&self) -> UserBillingRecord {
        self.store
            .get_by_user_id(&self.free_user().id)
            .await
            .unwrap()
            .expect("seeded free record")
    }

    pub async fn status(&self) -> BillingStatus {
        self.record().await.status
    }

    /// Overwrites `user-1`'s status without touching event ordering.
    pub async fn set_status(&self, status: BillingStatus) {
        let mut record = self.record().await;
        record.status = status;
        let outcome = self
            .store
            .conditional_update(&record, UpdateCondition::VersionMatches(record.version))
            .await
            .unwrap();
        assert!(matches!(outcome, UpdateOutcome::Applied(_)));
    }
}

fn customer(id: &str, email: &str) -> ExternalCustomer {
    ExternalCustomer {
        id: id.into(),
        email: email.into(),
        given_name: None,
        family_name: None,
        company_name: None,
        address_line1: None,
        city: None,
        postal_code: None,
        country_code: None,
        created_at: ts(0),
    }
}

fn mandate(id: &str) -> Mandate {
    Mandate {
        id: id.into(),
        status: MandateStatus::Active,
        scheme: "bacs".into(),
        reference: None,
        next_charge_date: None,
    }
}

/// Builds a webhook event created `secs` seconds after a fixed epoch.
pub(crate) fn event(id: &str, secs: i64, resource_type: &str, action: &str) -> EventBuilder {
    EventBuilder {
        event: WebhookEvent {
            id: id.into(),
            created_at: ts(secs),
            resource_type: resource_type.into(),
            action: action.into(),
            links: EventLinks::default(),
            details: None,
            metadata: HashMap::new(),
        },
    }
}

pub(crate) struct EventBuilder {
    event: WebhookEvent,
}

impl EventBuilder {
    pub fn subscription(mut self, id: &str) -> Self {
        self.event.links.subscription = Some(id.into());
        self
    }

    pub fn mandate(mut self, id: &str) -> Self {
        self.event.links.mandate = Some(id.into());
        self
    }

    pub fn customer(mut self, id: &str) -> Self {
        self.event.links.customer = Some(id.into());
        self
    }

    pub fn payment(mut self, id: &str) -> Self {
        self.event.links.payment = Some(id.into());
        self
    }

    pub fn build(self) -> WebhookEvent {
        self.event
    }
}
