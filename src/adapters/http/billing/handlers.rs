//! HTTP handlers for billing endpoints.
//!
//! These handlers connect axum routes to the orchestrator, the query side
//! and the webhook intake.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Json, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::adapters::http::middleware::RequireAuth;
use crate::application::handlers::{
    BillingQueries, CancelSubscriptionCommand, CompleteCheckoutCommand, CreateSubscriptionCommand,
    ProcessWebhookCommand, ProcessWebhookHandler, StartCheckoutCommand, SubscriptionOrchestrator,
    UpdateBillingDetailsCommand, UpdateSubscriptionCommand,
};
use crate::domain::billing::{
    BillingError, CustomerDetails, PlanId, SubscriptionUpdate, SIGNATURE_HEADER,
};

use super::dto::{
    CancelSubscriptionRequest, CompleteCheckoutRequest, CreateSubscriptionRequest, ErrorResponse,
    LogsQuery, LogsResponse, PlansResponse, StartCheckoutRequest, StartCheckoutResponse,
    SubscriptionResponse, SuccessResponse,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state. Cloned per request; every field is an `Arc`.
#[derive(Clone)]
pub struct BillingAppState {
    pub orchestrator: Arc<SubscriptionOrchestrator>,
    pub queries: Arc<BillingQueries>,
    pub webhooks: Arc<ProcessWebhookHandler>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook Intake
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/processor
///
/// 200 whenever the delivery was authentic and decodable, even if some of
/// its events could not be applied. 400 otherwise.
pub async fn receive_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, BillingApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let cmd = ProcessWebhookCommand {
        body: body.to_vec(),
        signature,
    };
    state.webhooks.handle(cmd).await?;

    Ok(Json(SuccessResponse::ok()))
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /billing/record
pub async fn get_record(
    State(state): State<BillingAppState>,
    RequireAuth(user): RequireAuth,
) -> Result<impl IntoResponse, BillingApiError> {
    Ok(Json(state.queries.get_record(&user.id).await?))
}

/// GET /billing/allowance
pub async fn get_allowance(
    State(state): State<BillingAppState>,
    RequireAuth(user): RequireAuth,
) -> Result<impl IntoResponse, BillingApiError> {
    Ok(Json(state.queries.prompt_allowance(&user.id).await?))
}

/// GET /billing/overview
pub async fn get_overview(
    State(state): State<BillingAppState>,
    RequireAuth(user): RequireAuth,
) -> Result<impl IntoResponse, BillingApiError> {
    Ok(Json(state.queries.billing_overview(&user.id).await?))
}

/// GET /billing/logs?level=&event=&limit=
pub async fn get_logs(
    State(state): State<BillingAppState>,
    RequireAuth(user): RequireAuth,
    Query(query): Query<LogsQuery>,
) -> Result<impl IntoResponse, BillingApiError> {
    let entries = state.queries.logs(&user.id, query.into_filter()?).await?;
    Ok(Json(LogsResponse { entries }))
}

/// GET /billing/plans
pub async fn list_plans(State(state): State<BillingAppState>) -> impl IntoResponse {
    let mut plans: Vec<_> = state.queries.catalog().plans().into_iter().cloned().collect();
    plans.sort_by(|a, b| {
        a.price_minor_units
            .cmp(&b.price_minor_units)
            .then_with(|| a.id.cmp(&b.id))
    });
    Json(PlansResponse { plans })
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers (POST/PATCH endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /billing/record - Provision the free record at signup
pub async fn provision_record(
    State(state): State<BillingAppState>,
    RequireAuth(user): RequireAuth,
) -> Result<impl IntoResponse, BillingApiError> {
    let record = state.queries.provision_record(&user.id).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// POST /billing/usage - Count one prompt
pub async fn record_usage(
    State(state): State<BillingAppState>,
    RequireAuth(user): RequireAuth,
) -> Result<impl IntoResponse, BillingApiError> {
    Ok(Json(state.queries.record_prompt_use(&user.id).await?))
}

/// POST /billing/checkout - Start mandate setup
pub async fn start_checkout(
    State(state): State<BillingAppState>,
    RequireAuth(user): RequireAuth,
    Json(request): Json<StartCheckoutRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = StartCheckoutCommand {
        user,
        plan_id: PlanId::new(request.plan_id),
        success_redirect_url: request.success_redirect_url,
    };
    let result = state.orchestrator.start_checkout(cmd).await?;
    Ok((StatusCode::CREATED, Json(StartCheckoutResponse::from(result))))
}

/// POST /billing/checkout/complete - Store the mandate from a finished flow
pub async fn complete_checkout(
    State(state): State<BillingAppState>,
    RequireAuth(user): RequireAuth,
    Json(request): Json<CompleteCheckoutRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = CompleteCheckoutCommand {
        user_id: user.id,
        redirect_flow_id: request.redirect_flow_id,
        session_token: request.session_token,
    };
    Ok(Json(state.orchestrator.complete_checkout(cmd).await?))
}

/// POST /billing/subscriptions
pub async fn create_subscription(
    State(state): State<BillingAppState>,
    RequireAuth(user): RequireAuth,
    Json(request): Json<CreateSubscriptionRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = CreateSubscriptionCommand {
        user_id: user.id,
        plan_id: PlanId::new(request.plan_id),
        metadata: request.metadata,
    };
    let result = state.orchestrator.create_subscription(cmd).await?;
    Ok((StatusCode::CREATED, Json(SubscriptionResponse::from(result))))
}

/// POST /billing/subscriptions/:id/cancel
///
/// The record changes when the processor's cancellation webhook arrives.
pub async fn cancel_subscription(
    State(state): State<BillingAppState>,
    RequireAuth(user): RequireAuth,
    Path(subscription_id): Path<String>,
    request: Option<Json<CancelSubscriptionRequest>>,
) -> Result<impl IntoResponse, BillingApiError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let cmd = CancelSubscriptionCommand {
        user_id: user.id,
        subscription_id,
        at_period_end: request.at_period_end,
    };
    let subscription = state.orchestrator.cancel_subscription(cmd).await?;
    Ok((StatusCode::ACCEPTED, Json(SubscriptionResponse::from(subscription))))
}

/// PATCH /billing/subscriptions/:id - Pause, resume or replace metadata
pub async fn update_subscription(
    State(state): State<BillingAppState>,
    RequireAuth(user): RequireAuth,
    Path(subscription_id): Path<String>,
    Json(update): Json<SubscriptionUpdate>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = UpdateSubscriptionCommand {
        user_id: user.id,
        subscription_id,
        update,
    };
    let subscription = state.orchestrator.update_subscription(cmd).await?;
    Ok((StatusCode::ACCEPTED, Json(SubscriptionResponse::from(subscription))))
}

/// PATCH /billing/customer
pub async fn update_billing_details(
    State(state): State<BillingAppState>,
    RequireAuth(user): RequireAuth,
    Json(details): Json<CustomerDetails>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = UpdateBillingDetailsCommand {
        user_id: user.id,
        details,
    };
    Ok(Json(state.orchestrator.update_billing_details(cmd).await?))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts billing errors to HTTP responses.
#[derive(Debug)]
pub struct BillingApiError(BillingError);

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            tracing::error!(
                kind = self.0.kind(),
                error = %self.0,
                raw = ?self.0.raw(),
                "Billing request failed"
            );
        } else {
            tracing::debug!(kind = self.0.kind(), error = %self.0, "Billing request rejected");
        }
        (status, Json(ErrorResponse::from(&self.0))).into_response()
    }
}
