//! Domain layer containing billing rules and types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, errors, state machine)
//! - `billing` - Plans, billing records, webhook events and the error taxonomy

pub mod billing;
pub mod foundation;
