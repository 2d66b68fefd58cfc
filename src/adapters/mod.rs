//! Adapters - Implementations of port interfaces.
//!
//! - `memory` - In-memory billing record store and event log
//! - `postgres` - PostgreSQL billing record store and event log
//! - `processor` - HTTP processor client and an in-process mock
//! - `http` - axum routes for the billing API and webhook intake

pub mod http;
pub mod memory;
pub mod postgres;
pub mod processor;
