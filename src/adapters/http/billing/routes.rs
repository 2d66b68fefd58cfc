//! Axum router configuration for billing endpoints.

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use super::handlers::{
    cancel_subscription, complete_checkout, create_subscription, get_allowance, get_logs,
    get_overview, get_record, list_plans, provision_record, receive_webhook, record_usage,
    start_checkout, update_billing_details, update_subscription, BillingAppState,
};
use crate::adapters::http::middleware::identity_middleware;

/// User-facing billing routes. Every handler except `/plans` requires a
/// caller identity.
///
/// # Routes
/// - `GET /record`, `POST /record` - Read or provision the billing record
/// - `GET /allowance`, `POST /usage` - Prompt quota and counter
/// - `GET /overview` - Record plus processor customer, subscription and mandates
/// - `GET /logs` - Caller's own billing log
/// - `GET /plans` - Plan catalog
/// - `POST /checkout`, `POST /checkout/complete` - Mandate setup
/// - `POST /subscriptions`, `POST /subscriptions/:id/cancel`, `PATCH /subscriptions/:id`
/// - `PATCH /customer` - Billing details at the processor
pub fn billing_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/record", get(get_record).post(provision_record))
        .route("/allowance", get(get_allowance))
        .route("/usage", post(record_usage))
        .route("/overview", get(get_overview))
        .route("/logs", get(get_logs))
        .route("/plans", get(list_plans))
        .route("/checkout", post(start_checkout))
        .route("/checkout/complete", post(complete_checkout))
        .route("/subscriptions", post(create_subscription))
        .route("/subscriptions/:id/cancel", post(cancel_subscription))
        .route("/subscriptions/:id", patch(update_subscription))
        .route("/customer", patch(update_billing_details))
        .layer(middleware::from_fn(identity_middleware))
}

/// Processor webhooks. Authenticated by signature, not by caller identity.
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/processor", post(receive_webhook))
}

/// Both route groups, mounted at `/billing` and `/webhooks`.
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .nest("/billing", billing_routes())
        .nest("/webhooks", webhook_routes())
}
