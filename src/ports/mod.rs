//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the billing core and the outside world. Adapters implement these ports.
//!
//! - `BillingRecordStore` - Durable per-user billing record with conditional writes
//! - `PaymentProcessor` - Outbound calls to the direct-debit processor
//! - `BillingEventLog` - Append-only structured billing log

mod billing_event_log;
mod billing_record_store;
mod payment_processor;

pub use billing_event_log::{BillingEventLog, LogQuery};
pub use billing_record_store::{BillingRecordStore, UpdateCondition, UpdateOutcome};
pub use payment_processor::{
    CreateCustomerRequest, CreateRedirectFlowRequest, CreateSubscriptionRequest, IdempotencyKey,
    PaymentProcessor, ProcessorError, ProcessorErrorKind,
};
