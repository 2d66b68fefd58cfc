//! In-process payment processor.
//!
//! Implements `PaymentProcessor` against in-memory state for tests and local
//! runs without processor credentials. Supports:
//! - Catalog-aware plan validation (invalid plans are never recorded as calls)
//! - Persistent and one-shot error injection per method
//! - Failures injected after the write commits, to exercise idempotent retries
//! - Idempotency-key replay on create calls
//! - Call tracking

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::billing::{
    CompletedRedirectFlow, CustomerDetails, ExternalCustomer, ExternalSubscription,
    ExternalSubscriptionStatus, Mandate, MandateStatus, PlanCatalog, PlanId, RedirectFlow,
    SubscriptionUpdate,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{
    CreateCustomerRequest, CreateRedirectFlowRequest, CreateSubscriptionRequest, IdempotencyKey,
    PaymentProcessor, ProcessorError, ProcessorErrorKind,
};

/// Mock processor.
///
/// # Example
///
/// ```ignore
/// let mock = MockPaymentProcessor::new(catalog);
/// mock.fail_next("create_subscription", ProcessorError::timeout("slow"));
/// let result = mock.create_subscription(request).await;
/// assert_eq!(mock.call_count("create_subscription"), 1);
/// ```
#[derive(Clone)]
pub struct MockPaymentProcessor {
    catalog: Arc<PlanCatalog>,
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    customers: HashMap<String, ExternalCustomer>,
    subscriptions: HashMap<String, ExternalSubscription>,
    mandates: HashMap<String, Vec<Mandate>>,
    flows: HashMap<String, PendingFlow>,
    replays: HashMap<String, Replay>,

    /// Returned on every call to the method until cleared.
    method_errors: HashMap<String, ProcessorError>,

    /// Returned once each, in order, before the method runs.
    queued_errors: HashMap<String, VecDeque<ProcessorError>>,

    /// Returned once each, after the method has committed its write.
    post_commit_errors: HashMap<String, VecDeque<ProcessorError>>,

    next_charge_date: Option<NaiveDate>,
    sequence: u64,
    call_log: Vec<MethodCall>,
}

struct PendingFlow {
    session_token: String,
    customer_id: Option<String>,
    email: Option<String>,
}

#[derive(Clone)]
enum Replay {
    Customer(ExternalCustomer),
    Flow(RedirectFlow),
    Subscription(ExternalSubscription),
}

/// Recorded method call for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{}{:04}", prefix, self.sequence)
    }

    fn record(&mut self, method: &str, args: Vec<String>) {
        self.call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
    }

    fn pre_call_error(&mut self, method: &str) -> Option<ProcessorError> {
        if let Some(err) = self
            .queued_errors
            .get_mut(method)
            .and_then(|queue| queue.pop_front())
        {
            return Some(err);
        }
        self.method_errors.get(method).cloned()
    }

    fn post_commit_error(&mut self, method: &str) -> Result<(), ProcessorError> {
        match self
            .post_commit_errors
            .get_mut(method)
            .and_then(|queue| queue.pop_front())
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn subscription_mut(&mut self, id: &str) -> Result<&mut ExternalSubscription, ProcessorError> {
        self.subscriptions
            .get_mut(id)
            .ok_or_else(|| ProcessorError::not_found("subscription"))
    }
}

impl MockPaymentProcessor {
    pub fn new(catalog: Arc<PlanCatalog>) -> Self {
        Self {
            catalog,
            inner: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn validate_plan(&self, plan_id: &PlanId) -> Result<(), ProcessorError> {
        self.catalog
            .require_paid(plan_id)
            .map(|_| ())
            .map_err(|_| ProcessorError::invalid_plan(plan_id))
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Seeding
    // ════════════════════════════════════════════════════════════════════════════

    pub fn add_customer(&self, customer: ExternalCustomer) {
        self.state().customers.insert(customer.id.clone(), customer);
    }

    pub fn add_subscription(&self, subscription: ExternalSubscription) {
        self.state()
            .subscriptions
            .insert(subscription.id.clone(), subscription);
    }

    pub fn add_mandate(&self, customer_id: &str, mandate: Mandate) {
        self.state()
            .mandates
            .entry(customer_id.to_string())
            .or_default()
            .push(mandate);
    }

    /// Moves a stored subscription to `status`, as the processor would after
    /// the corresponding webhook.
    pub fn set_subscription_status(
        &self,
        subscription_id: &str,
        status: ExternalSubscriptionStatus,
    ) {
        if let Some(sub) = self.state().subscriptions.get_mut(subscription_id) {
            sub.status = status;
        }
    }

    /// Charge date reported on subscriptions created from now on.
    pub fn set_next_charge_date(&self, date: NaiveDate) {
        self.state().next_charge_date = Some(date);
    }

    pub fn subscription(&self, subscription_id: &str) -> Option<ExternalSubscription> {
        self.state().subscriptions.get(subscription_id).cloned()
    }

    pub fn subscription_count(&self) -> usize {
        self.state().subscriptions.len()
    }

    pub fn customer_count(&self) -> usize {
        self.state().customers.len()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Error Injection
    // ════════════════════════════════════════════════════════════════════════════

    /// Fail every call to `method` until `clear_errors`.
    pub fn set_method_error(&self, method: &str, error: ProcessorError) {
        self.state().method_errors.insert(method.to_string(), error);
    }

    /// Fail the next call to `method` once. Queued errors are consumed in
    /// order before any persistent error applies.
    pub fn fail_next(&self, method: &str, error: ProcessorError) {
        self.state()
            .queued_errors
            .entry(method.to_string())
            .or_default()
            .push_back(error);
    }

    /// Let the next call to `method` commit, then report `error` anyway.
    pub fn fail_after_commit(&self, method: &str, error: ProcessorError) {
        self.state()
            .post_commit_errors
            .entry(method.to_string())
            .or_default()
            .push_back(error);
    }

    pub fn clear_errors(&self) {
        let mut state = self.state();
        state.method_errors.clear();
        state.queued_errors.clear();
        state.post_commit_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.state().call_log.iter().any(|c| c.method == method)
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.state().call_log.len()
    }

    pub fn clear_calls(&self) {
        self.state().call_log.clear();
    }
}

fn replay_key(method: &str, key: &IdempotencyKey) -> String {
    format!("{}:{}", method, key)
}

fn apply_details(customer: &mut ExternalCustomer, details: CustomerDetails) {
    if let Some(email) = details.email {
        customer.email = email;
    }
    customer.given_name = details.given_name.or(customer.given_name.take());
    customer.family_name = details.family_name.or(customer.family_name.take());
    customer.company_name = details.company_name.or(customer.company_name.take());
    customer.address_line1 = details.address_line1.or(customer.address_line1.take());
    customer.city = details.city.or(customer.city.take());
    customer.postal_code = details.postal_code.or(customer.postal_code.take());
    customer.country_code = details.country_code.or(customer.country_code.take());
}

#[async_trait]
impl PaymentProcessor for MockPaymentProcessor {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<ExternalCustomer, ProcessorError> {
        const METHOD: &str = "create_customer";
        let mut state = self.state();
        state.record(METHOD, vec![request.user_id.to_string()]);
        if let Some(err) = state.pre_call_error(METHOD) {
            return Err(err);
        }

        let key = replay_key(METHOD, &request.idempotency_key);
        if let Some(Replay::Customer(existing)) = state.replays.get(&key) {
            return Ok(existing.clone());
        }

        let mut customer = ExternalCustomer {
            id: state.next_id("CU"),
            email: String::new(),
            given_name: None,
            family_name: None,
            company_name: None,
            address_line1: None,
            city: None,
            postal_code: None,
            country_code: None,
            created_at: Timestamp::now(),
        };
        apply_details(&mut customer, request.details);
        state.customers.insert(customer.id.clone(), customer.clone());
        state.replays.insert(key, Replay::Customer(customer.clone()));

        state.post_commit_error(METHOD)?;
        Ok(customer)
    }

    async fn get_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<ExternalCustomer>, ProcessorError> {
        const METHOD: &str = "get_customer";
        let mut state = self.state();
        state.record(METHOD, vec![customer_id.to_string()]);
        if let Some(err) = state.pre_call_error(METHOD) {
            return Err(err);
        }
        Ok(state.customers.get(customer_id).cloned())
    }

    async fn update_customer(
        &self,
        customer_id: &str,
        details: CustomerDetails,
    ) -> Result<ExternalCustomer, ProcessorError> {
        const METHOD: &str = "update_customer";
        let mut state = self.state();
        state.record(METHOD, vec![customer_id.to_string()]);
        if let Some(err) = state.pre_call_error(METHOD) {
            return Err(err);
        }

        let customer = state
            .customers
            .get_mut(customer_id)
            .ok_or_else(|| ProcessorError::not_found("customer"))?;
        apply_details(customer, details);
        let updated = customer.clone();

        state.post_commit_error(METHOD)?;
        Ok(updated)
    }

    async fn create_redirect_flow(
        &self,
        request: CreateRedirectFlowRequest,
    ) -> Result<RedirectFlow, ProcessorError> {
        const METHOD: &str = "create_redirect_flow";
        self.validate_plan(&request.plan_id)?;

        let mut state = self.state();
        state.record(METHOD, vec![request.plan_id.to_string()]);
        if let Some(err) = state.pre_call_error(METHOD) {
            return Err(err);
        }

        let key = replay_key(METHOD, &request.idempotency_key);
        if let Some(Replay::Flow(existing)) = state.replays.get(&key) {
            return Ok(existing.clone());
        }

        let id = state.next_id("RE");
        let flow = RedirectFlow {
            redirect_url: format!("https://pay.processor.test/flow/{}", id),
            id: id.clone(),
            session_token: request.session_token.clone(),
        };
        state.flows.insert(
            id,
            PendingFlow {
                session_token: request.session_token,
                customer_id: request.customer_id,
                email: request.prefilled_email,
            },
        );
        state.replays.insert(key, Replay::Flow(flow.clone()));

        state.post_commit_error(METHOD)?;
        Ok(flow)
    }

    async fn complete_redirect_flow(
        &self,
        redirect_flow_id: &str,
        session_token: &str,
    ) -> Result<CompletedRedirectFlow, ProcessorError> {
        const METHOD: &str = "complete_redirect_flow";
        let mut state = self.state();
        state.record(METHOD, vec![redirect_flow_id.to_string()]);
        if let Some(err) = state.pre_call_error(METHOD) {
            return Err(err);
        }

        let flow = state
            .flows
            .remove(redirect_flow_id)
            .ok_or_else(|| ProcessorError::not_found("redirect flow"))?;
        if flow.session_token != session_token {
            let message = "Session token does not match the redirect flow";
            state.flows.insert(redirect_flow_id.to_string(), flow);
            return Err(
                ProcessorError::new(ProcessorErrorKind::ValidationFailed, message).with_status(422),
            );
        }

        let customer_id = match flow.customer_id {
            Some(id) => id,
            None => {
                let id = state.next_id("CU");
                let customer = ExternalCustomer {
                    id: id.clone(),
                    email: flow.email.unwrap_or_default(),
                    given_name: None,
                    family_name: None,
                    company_name: None,
                    address_line1: None,
                    city: None,
                    postal_code: None,
                    country_code: None,
                    created_at: Timestamp::now(),
                };
                state.customers.insert(id.clone(), customer);
                id
            }
        };

        let mandate_id = state.next_id("MD");
        let mandate = Mandate {
            id: mandate_id.clone(),
            status: MandateStatus::PendingSubmission,
            scheme: "bacs".to_string(),
            reference: Some(format!("REF-{}", mandate_id)),
            next_charge_date: state.next_charge_date,
        };
        state
            .mandates
            .entry(customer_id.clone())
            .or_default()
            .push(mandate);

        state.post_commit_error(METHOD)?;
        Ok(CompletedRedirectFlow {
            id: redirect_flow_id.to_string(),
            customer_id,
            mandate_id,
            confirmation_url: None,
        })
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<ExternalSubscription, ProcessorError> {
        const METHOD: &str = "create_subscription";
        self.validate_plan(&request.plan_id)?;

        let mut state = self.state();
        state.record(
            METHOD,
            vec![request.user_id.to_string(), request.plan_id.to_string()],
        );
        if let Some(err) = state.pre_call_error(METHOD) {
            return Err(err);
        }

        let key = replay_key(METHOD, &request.idempotency_key);
        if let Some(Replay::Subscription(existing)) = state.replays.get(&key) {
            return Ok(existing.clone());
        }

        let mut metadata = request.metadata;
        metadata.insert("user_id".to_string(), request.user_id.to_string());
        metadata.insert("plan_id".to_string(), request.plan_id.to_string());

        let subscription = ExternalSubscription {
            id: state.next_id("SB"),
            customer_id: Some(request.customer_id),
            plan_id: request.plan_id,
            mandate_id: request.mandate_id,
            status: ExternalSubscriptionStatus::PendingCustomerApproval,
            start_date: state.next_charge_date,
            end_date: None,
            next_charge_date: state.next_charge_date,
            metadata,
        };
        state
            .subscriptions
            .insert(subscription.id.clone(), subscription.clone());
        state
            .replays
            .insert(key, Replay::Subscription(subscription.clone()));

        state.post_commit_error(METHOD)?;
        Ok(subscription)
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<ExternalSubscription>, ProcessorError> {
        const METHOD: &str = "get_subscription";
        let mut state = self.state();
        state.record(METHOD, vec![subscription_id.to_string()]);
        if let Some(err) = state.pre_call_error(METHOD) {
            return Err(err);
        }
        Ok(state.subscriptions.get(subscription_id).cloned())
    }

    async fn update_subscription(
        &self,
        subscription_id: &str,
        update: SubscriptionUpdate,
    ) -> Result<ExternalSubscription, ProcessorError> {
        const METHOD: &str = "update_subscription";
        let mut state = self.state();
        state.record(
            METHOD,
            vec![subscription_id.to_string(), update.name().to_string()],
        );
        if let Some(err) = state.pre_call_error(METHOD) {
            return Err(err);
        }

        let sub = state.subscription_mut(subscription_id)?;
        let invalid = |message: &str| {
            ProcessorError::new(ProcessorErrorKind::InvalidState, message).with_status(422)
        };
        match update {
            SubscriptionUpdate::Pause => {
                if sub.status != ExternalSubscriptionStatus::Active {
                    return Err(invalid("Only active subscriptions can be paused"));
                }
                sub.status = ExternalSubscriptionStatus::Paused;
            }
            SubscriptionUpdate::Resume => {
                if sub.status != ExternalSubscriptionStatus::Paused {
                    return Err(invalid("Only paused subscriptions can be resumed"));
                }
                sub.status = ExternalSubscriptionStatus::Active;
            }
            SubscriptionUpdate::Metadata { metadata } => sub.metadata.extend(metadata),
        }
        let updated = sub.clone();

        state.post_commit_error(METHOD)?;
        Ok(updated)
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> Result<ExternalSubscription, ProcessorError> {
        const METHOD: &str = "cancel_subscription";
        let mut state = self.state();
        state.record(
            METHOD,
            vec![subscription_id.to_string(), at_period_end.to_string()],
        );
        if let Some(err) = state.pre_call_error(METHOD) {
            return Err(err);
        }

        let sub = state.subscription_mut(subscription_id)?;
        if sub.status.is_ended() {
            return Err(ProcessorError::new(
                ProcessorErrorKind::InvalidState,
                "Subscription is already cancelled or finished",
            )
            .with_status(422));
        }
        match (at_period_end, sub.next_charge_date) {
            (true, Some(date)) => sub.end_date = Some(date),
            _ => sub.status = ExternalSubscriptionStatus::Cancelled,
        }
        let updated = sub.clone();

        state.post_commit_error(METHOD)?;
        Ok(updated)
    }

    async fn list_payment_methods(
        &self,
        customer_id: &str,
    ) -> Result<Vec<Mandate>, ProcessorError> {
        const METHOD: &str = "list_payment_methods";
        let mut state = self.state();
        state.record(METHOD, vec![customer_id.to_string()]);
        if let Some(err) = state.pre_call_error(METHOD) {
            return Err(err);
        }
        Ok(state.mandates.get(customer_id).cloned().unwrap_or_default())
    }
}
