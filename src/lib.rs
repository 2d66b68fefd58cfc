//! Billing Reconciler - direct-debit subscription billing core
//!
//! Keeps a durable per-user billing record in step with an external
//! direct-debit processor: signed webhooks flow in and are reconciled under
//! a causal ordering rule, subscription changes flow out through an
//! idempotent, retried processor client.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
