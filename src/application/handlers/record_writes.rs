//! Versioned read-modify-write of billing records outside webhook intake.

use crate::application::retry::{RetryPolicy, RetryScope};
use crate::domain::billing::{BillingError, UserBillingRecord};
use crate::domain::foundation::UserId;
use crate::ports::{BillingRecordStore, UpdateCondition, UpdateOutcome};

/// Upper bound on re-reads after a lost write race.
pub(crate) const MAX_WRITE_CONFLICTS: usize = 5;

pub(crate) fn write_conflict(what: &str) -> BillingError {
    BillingError::ExternalApi {
        status_code: 409,
        reason: "concurrent_modification".to_string(),
        message: format!("Gave up {} after repeated write conflicts", what),
        retryable: false,
        raw: None,
    }
}

pub(crate) fn record_not_found(user_id: &UserId) -> BillingError {
    BillingError::validation(format!("No billing record for user {}", user_id))
}

pub(crate) async fn load_record(
    store: &dyn BillingRecordStore,
    retry: &RetryPolicy,
    scope: &RetryScope,
    user_id: &UserId,
) -> Result<UserBillingRecord, BillingError> {
    retry
        .run(scope, |_| async move {
            store.get_by_user_id(user_id).await.map_err(BillingError::from)
        })
        .await?
        .ok_or_else(|| record_not_found(user_id))
}

/// Re-reads the record, asks `change` for its successor and writes it only
/// if the version is unchanged. `change` returning `None` leaves the record
/// as it is.
pub(crate) async fn update_record<F>(
    store: &dyn BillingRecordStore,
    retry: &RetryPolicy,
    scope: &RetryScope,
    user_id: &UserId,
    mut change: F,
) -> Result<UserBillingRecord, BillingError>
where
    F: FnMut(&UserBillingRecord) -> Result<Option<UserBillingRecord>, BillingError>,
{
    for _ in 0..MAX_WRITE_CONFLICTS {
        let current = load_record(store, retry, scope, user_id).await?;
        let Some(next) = change(&current)? else {
            return Ok(current);
        };

        let next = &next;
        let condition = UpdateCondition::VersionMatches(current.version);
        let outcome = retry
            .run(scope, |_| async move {
                store
                    .conditional_update(next, condition)
                    .await
                    .map_err(BillingError::from)
            })
            .await?;

        match outcome {
            UpdateOutcome::Applied(stored) => return Ok(stored),
            UpdateOutcome::NotFound => return Err(record_not_found(user_id)),
            UpdateOutcome::Rejected => {
                tracing::debug!(
                    user_id = %user_id,
                    operation = %scope.operation,
                    "Version moved, re-reading"
                );
            }
        }
    }

    Err(write_conflict(&scope.operation))
}
