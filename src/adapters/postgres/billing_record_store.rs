//! PostgreSQL implementation of BillingRecordStore.
//!
//! The ordering rule and the version check both live in the `WHERE` clause
//! of a single `UPDATE`, so concurrent writers are serialized by the row
//! lock PostgreSQL takes for the update.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use crate::domain::billing::{BillingStatus, PlanId, Usage, UserBillingRecord};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::{BillingRecordStore, UpdateCondition, UpdateOutcome};

const RECORD_COLUMNS: &str = "user_id, external_customer_id, external_subscription_id, mandate_id, \
     plan_id, status, next_charge_date, prompts_used, monthly_limit, usage_reset_at, \
     last_event_at, last_event_id, version, created_at, updated_at";

pub struct PostgresBillingRecordStore {
    pool: PgPool,
}

impl PostgresBillingRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_where(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<UserBillingRecord>, DomainError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM billing_records WHERE {column} = $1");
        let row: Option<RecordRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to load billing record", e))?;

        row.map(UserBillingRecord::try_from).transpose()
    }

    async fn exists(&self, user_id: &UserId) -> Result<bool, DomainError> {
        let found: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM billing_records WHERE user_id = $1")
                .bind(user_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("Failed to check billing record", e))?;
        Ok(found.is_some())
    }
}

/// Database row representation of a billing record.
#[derive(Debug, sqlx::FromRow)]
struct RecordRow {
    user_id: String,
    external_customer_id: Option<String>,
    external_subscription_id: Option<String>,
    mandate_id: Option<String>,
    plan_id: String,
    status: String,
    next_charge_date: Option<NaiveDate>,
    prompts_used: i64,
    monthly_limit: i64,
    usage_reset_at: DateTime<Utc>,
    last_event_at: Option<DateTime<Utc>>,
    last_event_id: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RecordRow> for UserBillingRecord {
    type Error = DomainError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str, detail: String| {
            DomainError::database(format!("Invalid {what} in row: {detail}"))
        };

        Ok(UserBillingRecord {
            user_id: UserId::new(row.user_id).map_err(|e| corrupt("user_id", e.to_string()))?,
            external_customer_id: row.external_customer_id,
            external_subscription_id: row.external_subscription_id,
            mandate_id: row.mandate_id,
            plan_id: PlanId::new(row.plan_id),
            status: BillingStatus::parse(&row.status)
                .map_err(|e| corrupt("status", e.to_string()))?,
            next_charge_date: row.next_charge_date,
            usage: Usage {
                prompts_used: u64::try_from(row.prompts_used)
                    .map_err(|e| corrupt("prompts_used", e.to_string()))?,
                monthly_limit: row.monthly_limit,
                reset_at: Timestamp::from_datetime(row.usage_reset_at),
            },
            last_event_at: row.last_event_at.map(Timestamp::from_datetime),
            last_event_id: row.last_event_id,
            version: u64::try_from(row.version).map_err(|e| corrupt("version", e.to_string()))?,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn db_error(context: &str, err: sqlx::Error) -> DomainError {
    DomainError::database(format!("{context}: {err}"))
}

fn to_i64(value: u64, field: &str) -> Result<i64, DomainError> {
    i64::try_from(value)
        .map_err(|_| DomainError::validation(field, format!("{value} is out of range")))
}

#[async_trait]
impl BillingRecordStore for PostgresBillingRecordStore {
    async fn get_by_user_id(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UserBillingRecord>, DomainError> {
        self.fetch_where("user_id", user_id.as_str()).await
    }

    async fn get_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<UserBillingRecord>, DomainError> {
        self.fetch_where("external_subscription_id", subscription_id).await
    }

    async fn get_by_mandate_id(
        &self,
        mandate_id: &str,
    ) -> Result<Option<UserBillingRecord>, DomainError> {
        self.fetch_where("mandate_id", mandate_id).await
    }

    async fn insert(&self, record: &UserBillingRecord) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO billing_records (
                user_id, external_customer_id, external_subscription_id, mandate_id,
                plan_id, status, next_charge_date, prompts_used, monthly_limit, usage_reset_at,
                last_event_at, last_event_id, version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(record.user_id.as_str())
        .bind(&record.external_customer_id)
        .bind(&record.external_subscription_id)
        .bind(&record.mandate_id)
        .bind(record.plan_id.as_str())
        .bind(record.status.as_str())
        .bind(record.next_charge_date)
        .bind(to_i64(record.usage.prompts_used, "prompts_used")?)
        .bind(record.usage.monthly_limit)
        .bind(record.usage.reset_at.as_datetime())
        .bind(record.last_event_at.map(|t| *t.as_datetime()))
        .bind(&record.last_event_id)
        .bind(to_i64(record.version, "version")?)
        .bind(record.created_at.as_datetime())
        .bind(record.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("billing_records_pkey") {
                    return DomainError::validation(
                        "user_id",
                        format!("Billing record already exists for {}", record.user_id),
                    );
                }
            }
            db_error("Failed to insert billing record", e)
        })?;

        Ok(())
    }

    async fn conditional_update(
        &self,
        record: &UserBillingRecord,
        condition: UpdateCondition,
    ) -> Result<UpdateOutcome, DomainError> {
        let (expected_version, event_at) = match condition {
            UpdateCondition::EventNewerThanStored {
                created_at,
                version,
            } => (version, Some(*created_at.as_datetime())),
            UpdateCondition::VersionMatches(version) => (version, None),
        };

        let sql = format!(
            r#"
            UPDATE billing_records SET
                external_customer_id = $2,
                external_subscription_id = $3,
                mandate_id = $4,
                plan_id = $5,
                status = $6,
                next_charge_date = $7,
                prompts_used = $8,
                monthly_limit = $9,
                usage_reset_at = $10,
                last_event_at = $11,
                last_event_id = $12,
                version = version + 1,
                updated_at = NOW()
            WHERE user_id = $1
              AND version = $13
              AND ($14::timestamptz IS NULL OR last_event_at IS NULL OR last_event_at < $14)
            RETURNING {RECORD_COLUMNS}
            "#
        );

        let row: Option<RecordRow> = sqlx::query_as(&sql)
            .bind(record.user_id.as_str())
            .bind(&record.external_customer_id)
            .bind(&record.external_subscription_id)
            .bind(&record.mandate_id)
            .bind(record.plan_id.as_str())
            .bind(record.status.as_str())
            .bind(record.next_charge_date)
            .bind(to_i64(record.usage.prompts_used, "prompts_used")?)
            .bind(record.usage.monthly_limit)
            .bind(record.usage.reset_at.as_datetime())
            .bind(record.last_event_at.map(|t| *t.as_datetime()))
            .bind(&record.last_event_id)
            .bind(to_i64(expected_version, "version")?)
            .bind(event_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(db_err) = &e {
                    if db_err.code().as_deref() == Some("23505") {
                        return DomainError::new(
                            ErrorCode::ValidationFailed,
                            "Subscription or mandate already belongs to another user",
                        );
                    }
                }
                db_error("Failed to update billing record", e)
            })?;

        match row {
            Some(row) => Ok(UpdateOutcome::Applied(UserBillingRecord::try_from(row)?)),
            None if self.exists(&record.user_id).await? => Ok(UpdateOutcome::Rejected),
            None => Ok(UpdateOutcome::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> RecordRow {
        let now = Utc::now();
        RecordRow {
            user_id: "user-1".into(),
            external_customer_id: Some("CU1".into()),
            external_subscription_id: Some("SB1".into()),
            mandate_id: Some("MD1".into()),
            plan_id: "pro".into(),
            status: "pending_customer_approval".into(),
            next_charge_date: NaiveDate::from_ymd_opt(2024, 2, 1),
            prompts_used: 3,
            monthly_limit: 500,
            usage_reset_at: now,
            last_event_at: None,
            last_event_id: None,
            version: 4,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn row_converts_to_record() {
        let record = UserBillingRecord::try_from(row()).unwrap();
        assert_eq!(record.user_id.as_str(), "user-1");
        assert_eq!(record.status, BillingStatus::PendingCustomerApproval);
        assert_eq!(record.usage.prompts_used, 3);
        assert_eq!(record.version, 4);
    }

    #[test]
    fn unknown_status_is_a_database_error() {
        let mut bad = row();
        bad.status = "trialing".into();
        let err = UserBillingRecord::try_from(bad).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    #[test]
    fn negative_counters_are_rejected() {
        let mut bad = row();
        bad.version = -1;
        assert!(UserBillingRecord::try_from(bad).is_err());
    }
}
