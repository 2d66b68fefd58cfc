//! End-to-end billing scenarios over HTTP.
//!
//! A user signs up, sets up a mandate, subscribes, gets activated by webhook
//! and cancels, all through the public router. The processor is the
//! in-process mock so call counts and failures can be asserted.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::NaiveDate;
use secrecy::SecretString;
use serde_json::{json, Value};
use tower::ServiceExt;

use billing_reconciler::adapters::http::middleware::{USER_EMAIL_HEADER, USER_ID_HEADER};
use billing_reconciler::adapters::http::{app_router, BillingAppState};
use billing_reconciler::adapters::memory::{InMemoryBillingEventLog, InMemoryBillingRecordStore};
use billing_reconciler::adapters::processor::MockPaymentProcessor;
use billing_reconciler::application::handlers::{
    BillingQueries, EventRouter, ProcessWebhookHandler, RecordReconciler, SubscriptionOrchestrator,
};
use billing_reconciler::application::RetryPolicy;
use billing_reconciler::config::parse_plan_catalog;
use billing_reconciler::domain::billing::{
    compute_signature, LogLevel, WebhookVerifier, SIGNATURE_HEADER,
};
use billing_reconciler::ports::{BillingEventLog, LogQuery, ProcessorError};

// =============================================================================
// Test Infrastructure
// =============================================================================

const SECRET: &str = "whsec_scenarios";
const USER: &str = "user-7";
const EMAIL: &str = "ada@example.com";

const PLANS: &str = r#"
plans:
  - id: free
    name: Free
    price_minor_units: 0
    currency: GBP
    interval: MONTHLY
    limits:
      prompts_per_month: 3
      api_calls_per_minute: 5
      saved_prompts: 5
      priority_support: false
  - id: pro
    name: Pro
    price_minor_units: 1900
    currency: GBP
    interval: MONTHLY
    limits:
      prompts_per_month: 500
      api_calls_per_minute: 60
      saved_prompts: 100
      priority_support: false
"#;

struct TestApp {
    router: Router,
    log: Arc<InMemoryBillingEventLog>,
    processor: Arc<MockPaymentProcessor>,
}

impl TestApp {
    fn new() -> Self {
        let catalog = Arc::new(parse_plan_catalog(PLANS).unwrap());
        let store = Arc::new(InMemoryBillingRecordStore::new());
        let log = Arc::new(InMemoryBillingEventLog::new());
        let processor = Arc::new(MockPaymentProcessor::new(catalog.clone()));
        let retry = RetryPolicy::new(3, Duration::from_millis(1), log.clone());

        let reconciler = Arc::new(RecordReconciler::new(store.clone(), log.clone(), retry.clone()));
        let events = Arc::new(EventRouter::new(reconciler, log.clone()));
        let verifier = WebhookVerifier::new(SecretString::new(SECRET.to_string()));

        let state = BillingAppState {
            orchestrator: Arc::new(SubscriptionOrchestrator::new(
                processor.clone(),
                store.clone(),
                log.clone(),
                catalog.clone(),
                retry.clone(),
            )),
            queries: Arc::new(BillingQueries::new(
                store,
                log.clone(),
                processor.clone(),
                catalog,
                retry,
            )),
            webhooks: Arc::new(ProcessWebhookHandler::new(verifier, events, log.clone())),
        };

        Self {
            router: app_router(state, Duration::from_secs(5)),
            log,
            processor,
        }
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(USER_ID_HEADER, USER)
            .header(USER_EMAIL_HEADER, EMAIL)
            .header("content-type", "application/json");
        let body = body.map_or_else(Body::empty, |b| Body::from(b.to_string()));
        self.call(request.body(body).unwrap()).await
    }

    async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn webhook(
        &self,
        id: &str,
        created_at: &str,
        resource: &str,
        action: &str,
        subscription: &str,
    ) {
        let body = json!({
            "events": [{
                "id": id,
                "created_at": created_at,
                "resource_type": resource,
                "action": action,
                "links": { "subscription": subscription }
            }]
        })
        .to_string();
        let request = Request::post("/webhooks/processor")
            .header(SIGNATURE_HEADER, compute_signature(SECRET, body.as_bytes()))
            .body(Body::from(body))
            .unwrap();
        let (status, _) = self.call(request).await;
        assert_eq!(status, StatusCode::OK);
    }

    /// Signup plus a completed mandate checkout.
    async fn with_mandate(&self) {
        let (status, _) = self.send("POST", "/billing/record", None).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, flow) = self
            .send(
                "POST",
                "/billing/checkout",
                Some(json!({ "plan_id": "pro", "success_redirect_url": "https://app.test/done" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, record) = self
            .send(
                "POST",
                "/billing/checkout/complete",
                Some(json!({
                    "redirect_flow_id": flow["redirect_flow_id"],
                    "session_token": flow["session_token"],
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(record["mandate_id"].is_string());
    }

    async fn subscribe(&self) -> String {
        let (status, body) = self
            .send("POST", "/billing/subscriptions", Some(json!({ "plan_id": "pro" })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["subscription"]["id"].as_str().unwrap().to_string()
    }

    async fn status(&self) -> String {
        let (_, record) = self.send("GET", "/billing/record", None).await;
        record["status"].as_str().unwrap().to_string()
    }

    async fn count(&self, event: &str) -> usize {
        self.log
            .query(&LogQuery {
                event: Some(event.to_string()),
                ..LogQuery::default()
            })
            .await
            .unwrap()
            .len()
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn signup_subscribe_activate_and_cancel() {
    let app = TestApp::new();
    app.with_mandate().await;

    let subscription_id = app.subscribe().await;
    assert_eq!(app.status().await, "pending_customer_approval");

    app.webhook("EV1", "2024-03-01T09:00:00Z", "subscriptions", "created", &subscription_id)
        .await;
    assert_eq!(app.status().await, "active");

    let (_, allowance) = app.send("GET", "/billing/allowance", None).await;
    assert_eq!(allowance["plan_id"], "pro");
    assert_eq!(allowance["limit"], 500);

    for _ in 0..2 {
        app.send("POST", "/billing/usage", None).await;
    }
    let (_, allowance) = app.send("GET", "/billing/allowance", None).await;
    assert_eq!(allowance["used"], 2);

    app.webhook("EV2", "2024-03-01T10:00:00Z", "payments", "confirmed", &subscription_id)
        .await;
    let (_, allowance) = app.send("GET", "/billing/allowance", None).await;
    assert_eq!(allowance["used"], 0);
    assert_eq!(app.status().await, "active");

    let (status, _) = app
        .send("POST", &format!("/billing/subscriptions/{subscription_id}/cancel"), None)
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    // Nothing changes until the processor confirms by webhook.
    assert_eq!(app.status().await, "active");

    app.webhook("EV3", "2024-03-02T09:00:00Z", "subscriptions", "cancelled", &subscription_id)
        .await;
    assert_eq!(app.status().await, "cancelled");

    // A stale redelivery of the activation must not revive the subscription.
    app.webhook("EV1", "2024-03-01T09:00:00Z", "subscriptions", "created", &subscription_id)
        .await;
    assert_eq!(app.status().await, "cancelled");

    let (_, allowance) = app.send("GET", "/billing/allowance", None).await;
    assert_eq!(allowance["plan_id"], "free");
}

#[tokio::test]
async fn second_subscription_while_live_is_rejected() {
    let app = TestApp::new();
    app.with_mandate().await;
    app.subscribe().await;
    let calls_before = app.processor.call_count("create_subscription");

    let (status, body) = app
        .send("POST", "/billing/subscriptions", Some(json!({ "plan_id": "pro" })))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(app.processor.call_count("create_subscription"), calls_before);
}

#[tokio::test]
async fn cancel_at_period_end_sets_end_date() {
    let app = TestApp::new();
    let charge_date = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
    app.processor.set_next_charge_date(charge_date);
    app.with_mandate().await;
    let subscription_id = app.subscribe().await;

    let (status, body) = app
        .send(
            "POST",
            &format!("/billing/subscriptions/{subscription_id}/cancel"),
            Some(json!({ "at_period_end": true })),
        )
        .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["subscription"]["end_date"], "2024-04-01");
}

#[tokio::test]
async fn cancelling_someone_elses_subscription_is_rejected() {
    let app = TestApp::new();
    app.with_mandate().await;
    app.subscribe().await;

    let (status, _) = app
        .send("POST", "/billing/subscriptions/SB_NOT_MINE/cancel", None)
        .await;

    assert!(status.is_client_error());
    assert_eq!(app.processor.call_count("cancel_subscription"), 0);
}

// =============================================================================
// Validation and Retry
// =============================================================================

#[tokio::test]
async fn unknown_plan_is_rejected_before_any_processor_call() {
    let app = TestApp::new();
    app.with_mandate().await;
    app.processor.clear_calls();

    let (status, body) = app
        .send("POST", "/billing/subscriptions", Some(json!({ "plan_id": "platinum" })))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(app.processor.total_calls(), 0);
}

#[tokio::test]
async fn free_plan_cannot_be_subscribed_to() {
    let app = TestApp::new();
    app.with_mandate().await;
    app.processor.clear_calls();

    let (status, _) = app
        .send("POST", "/billing/subscriptions", Some(json!({ "plan_id": "free" })))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.processor.total_calls(), 0);
}

#[tokio::test]
async fn persistent_transient_failure_stops_after_three_attempts() {
    let app = TestApp::new();
    app.with_mandate().await;
    app.processor
        .set_method_error("create_subscription", ProcessorError::timeout("processor timed out"));

    let (status, body) = app
        .send("POST", "/billing/subscriptions", Some(json!({ "plan_id": "pro" })))
        .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "external_api_error");
    assert_eq!(app.processor.call_count("create_subscription"), 3);
    assert_eq!(app.count("retry_attempt_failed").await, 2);
    assert_eq!(app.count("retry_exhausted").await, 1);
    assert_eq!(app.status().await, "free");
}

#[tokio::test]
async fn transient_failure_then_success_creates_one_subscription() {
    let app = TestApp::new();
    app.with_mandate().await;
    app.processor
        .fail_after_commit("create_subscription", ProcessorError::timeout("lost response"));

    app.subscribe().await;

    assert_eq!(app.processor.call_count("create_subscription"), 2);
    assert_eq!(app.processor.subscription_count(), 1);
    assert_eq!(app.count("retry_succeeded").await, 1);
    assert_eq!(app.status().await, "pending_customer_approval");
}

#[tokio::test]
async fn subscribing_without_a_mandate_is_a_validation_error() {
    let app = TestApp::new();
    app.send("POST", "/billing/record", None).await;

    let (status, _) = app
        .send("POST", "/billing/subscriptions", Some(json!({ "plan_id": "pro" })))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.processor.total_calls(), 0);
}

// =============================================================================
// Usage and Access
// =============================================================================

#[tokio::test]
async fn free_allowance_runs_out() {
    let app = TestApp::new();
    app.send("POST", "/billing/record", None).await;

    for remaining in [2, 1, 0] {
        let (status, body) = app.send("POST", "/billing/usage", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["remaining"], remaining);
    }
    let (status, _) = app.send("POST", "/billing/usage", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, allowance) = app.send("GET", "/billing/allowance", None).await;
    assert_eq!(allowance["allowed"], false);
    assert_eq!(allowance["used"], 3);
}

#[tokio::test]
async fn provisioning_twice_returns_the_same_record() {
    let app = TestApp::new();

    let (first_status, first) = app.send("POST", "/billing/record", None).await;
    let (_, second) = app.send("POST", "/billing/record", None).await;

    assert_eq!(first_status, StatusCode::CREATED);
    assert_eq!(first["created_at"], second["created_at"]);
    assert_eq!(app.count("billing_record_created").await, 1);
}

#[tokio::test]
async fn logs_endpoint_returns_only_the_callers_entries() {
    let app = TestApp::new();
    app.with_mandate().await;
    app.log
        .append(billing_reconciler::domain::billing::BillingLogEntry::info("someone_else"))
        .await;

    let (status, body) = app.send("GET", "/billing/logs?level=info&limit=10", None).await;

    assert_eq!(status, StatusCode::OK);
    let entries = body["entries"].as_array().unwrap();
    assert!(!entries.is_empty());
    assert!(entries.iter().all(|e| e["user_id"] == USER));
    assert!(entries.iter().all(|e| e["level"] == LogLevel::Info.as_str()));
}

#[tokio::test]
async fn billing_routes_require_identity() {
    let app = TestApp::new();

    let (status, body) = app
        .call(Request::get("/billing/record").body(Body::empty()).unwrap())
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthenticated");
}

#[tokio::test]
async fn plans_are_listed_cheapest_first() {
    let app = TestApp::new();

    let (status, body) = app.send("GET", "/billing/plans", None).await;

    assert_eq!(status, StatusCode::OK);
    let ids: Vec<_> = body["plans"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, ["free", "pro"]);
}
