//! Read-side handlers.

mod billing_queries;

pub use billing_queries::{BillingOverview, BillingQueries, LogFilter, MAX_LOG_LIMIT};
