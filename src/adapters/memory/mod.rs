//! In-memory adapters.
//!
//! Used by tests and by the binary when no database is configured.

mod billing_event_log;
mod billing_record_store;

pub use billing_event_log::InMemoryBillingEventLog;
pub use billing_record_store::InMemoryBillingRecordStore;
