//! Billing event log port.
//!
//! Append-only. Entries are removed only by the retention sweep.

use async_trait::async_trait;

use crate::domain::billing::{BillingLogEntry, LogLevel};
use crate::domain::foundation::{DomainError, Timestamp, UserId};

/// Filter for `BillingEventLog::query`. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogQuery {
    pub user_id: Option<UserId>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub level: Option<LogLevel>,
    pub event: Option<String>,
    /// Newest entries first; `None` returns all matches.
    pub limit: Option<usize>,
}

impl LogQuery {
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &BillingLogEntry) -> bool {
        fn field_matches(filter: &Option<String>, value: &Option<String>) -> bool {
            filter.is_none() || filter.as_ref() == value.as_ref()
        }
        self.user_id
            .as_ref()
            .map_or(true, |id| entry.user_id.as_ref() == Some(id))
            && field_matches(&self.customer_id, &entry.customer_id)
            && field_matches(&self.subscription_id, &entry.subscription_id)
            && self.level.map_or(true, |level| entry.level == level)
            && self.event.as_ref().map_or(true, |event| &entry.event == event)
    }
}

#[async_trait]
pub trait BillingEventLog: Send + Sync {
    /// Appends an entry. Logging never fails the caller.
    async fn append(&self, entry: BillingLogEntry);

    /// Matching entries, newest first.
    async fn query(&self, query: &LogQuery) -> Result<Vec<BillingLogEntry>, DomainError>;

    /// Deletes entries older than `cutoff`. Returns how many were removed.
    async fn sweep_before(&self, cutoff: Timestamp) -> Result<usize, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billing_event_log_is_object_safe() {
        fn _accepts_dyn(_log: &dyn BillingEventLog) {}
    }

    #[test]
    fn empty_query_matches_everything() {
        let entry = BillingLogEntry::info("customers.created");
        assert!(LogQuery::default().matches(&entry));
    }

    #[test]
    fn query_filters_on_every_set_field() {
        let user = UserId::new("user-1").unwrap();
        let entry = BillingLogEntry::error("subscription_not_found")
            .with_user(user.clone())
            .with_subscription("SB1");

        assert!(LogQuery::for_user(user.clone()).matches(&entry));
        assert!(!LogQuery::for_user(UserId::new("user-2").unwrap()).matches(&entry));

        let by_level = LogQuery {
            level: Some(LogLevel::Info),
            ..LogQuery::default()
        };
        assert!(!by_level.matches(&entry));

        let by_subscription = LogQuery {
            subscription_id: Some("SB1".into()),
            customer_id: Some("CU1".into()),
            ..LogQuery::default()
        };
        assert!(!by_subscription.matches(&entry));
    }
}
