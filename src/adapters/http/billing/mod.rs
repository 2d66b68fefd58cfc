//! HTTP adapter for billing endpoints.
//!
//! - `POST /webhooks/processor` - Signed processor webhooks
//! - `/billing/*` - Checkout, subscription lifecycle, record and usage reads

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{BillingApiError, BillingAppState};
pub use routes::{billing_router, billing_routes, webhook_routes};
