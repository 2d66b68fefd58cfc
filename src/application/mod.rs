//! Application layer - Commands, Queries, and Handlers.
//!
//! Orchestrates domain operations and coordinates between ports. Webhook
//! intake and user-initiated subscription changes are kept apart: only the
//! former moves a record past `pending_customer_approval`.

pub mod handlers;
pub mod retry;

pub use retry::{RetryPolicy, RetryScope, DEFAULT_MAX_ATTEMPTS};
