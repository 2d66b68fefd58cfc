//! Billing record store port.
//!
//! A document store keyed by user id with secondary lookups by processor
//! subscription id and mandate id. There is no lock: every write is a
//! conditional update that the store applies atomically.
//!
//! # Example
//!
//! ```ignore
//! let outcome = store
//!     .conditional_update(
//!         &updated,
//!         UpdateCondition::EventNewerThanStored {
//!             created_at: event.created_at,
//!             version: current.version,
//!         },
//!     )
//!     .await?;
//! if let UpdateOutcome::Rejected = outcome {
//!     // Re-read: either a newer event landed or the record moved on.
//! }
//! ```

use async_trait::async_trait;

use crate::domain::billing::UserBillingRecord;
use crate::domain::foundation::{DomainError, Timestamp, UserId};

/// Predicate checked against the stored record at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateCondition {
    /// Apply only if the stored `last_event_at` is absent or strictly older
    /// than `created_at`, and the record has not changed since it was read
    /// at `version`.
    EventNewerThanStored { created_at: Timestamp, version: u64 },

    /// Apply only if the stored `version` equals this value.
    VersionMatches(u64),
}

impl UpdateCondition {
    /// Evaluates the condition against the currently stored record.
    pub fn holds_for(&self, stored: &UserBillingRecord) -> bool {
        match self {
            UpdateCondition::EventNewerThanStored {
                created_at,
                version,
            } => stored.accepts_event_at(created_at) && stored.version == *version,
            UpdateCondition::VersionMatches(version) => stored.version == *version,
        }
    }
}

/// Result of a conditional update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Written. Carries the stored record with its new version.
    Applied(UserBillingRecord),

    /// The condition did not hold; nothing was written. Callers re-read to
    /// find out whether the event is stale or the record merely changed.
    Rejected,

    /// No record for the user.
    NotFound,
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied(_))
    }
}

#[async_trait]
pub trait BillingRecordStore: Send + Sync {
    async fn get_by_user_id(&self, user_id: &UserId)
        -> Result<Option<UserBillingRecord>, DomainError>;

    async fn get_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<UserBillingRecord>, DomainError>;

    async fn get_by_mandate_id(
        &self,
        mandate_id: &str,
    ) -> Result<Option<UserBillingRecord>, DomainError>;

    /// Inserts a new record.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` if the user already has a record
    /// - `DatabaseError` on persistence failure
    async fn insert(&self, record: &UserBillingRecord) -> Result<(), DomainError>;

    /// Replaces the stored record with `record` if `condition` holds for the
    /// stored version. The stored version is bumped on success.
    async fn conditional_update(
        &self,
        record: &UserBillingRecord,
        condition: UpdateCondition,
    ) -> Result<UpdateOutcome, DomainError>;
}
