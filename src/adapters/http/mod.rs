//! HTTP adapters - REST API over axum.
//!
//! - `billing` - Billing endpoints and webhook intake
//! - `middleware` - Caller identity from the auth gateway

pub mod billing;
pub mod middleware;
mod router;

pub use billing::{BillingApiError, BillingAppState};
pub use router::{app_router, health, HealthResponse};
