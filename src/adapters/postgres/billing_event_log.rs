//! PostgreSQL implementation of BillingEventLog.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::domain::billing::{BillingLogEntry, LogLevel};
use crate::domain::foundation::{DomainError, LogEntryId, Timestamp, UserId};
use crate::ports::{BillingEventLog, LogQuery};

pub struct PostgresBillingEventLog {
    pool: PgPool,
}

impl PostgresBillingEventLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, entry: &BillingLogEntry) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO billing_log_entries (
                id, logged_at, level, event, user_id, customer_id, subscription_id,
                amount, currency, metadata, error
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.timestamp.as_datetime())
        .bind(entry.level.as_str())
        .bind(&entry.event)
        .bind(entry.user_id.as_ref().map(|u| u.as_str()))
        .bind(&entry.customer_id)
        .bind(&entry.subscription_id)
        .bind(entry.amount)
        .bind(&entry.currency)
        .bind(Json(&entry.metadata))
        .bind(&entry.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LogRow {
    id: Uuid,
    logged_at: DateTime<Utc>,
    level: String,
    event: String,
    user_id: Option<String>,
    customer_id: Option<String>,
    subscription_id: Option<String>,
    amount: Option<i64>,
    currency: Option<String>,
    metadata: Json<BTreeMap<String, serde_json::Value>>,
    error: Option<String>,
}

impl TryFrom<LogRow> for BillingLogEntry {
    type Error = DomainError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        let level = LogLevel::parse(&row.level).ok_or_else(|| {
            DomainError::database(format!("Invalid log level in row: {}", row.level))
        })?;
        let user_id = row
            .user_id
            .map(UserId::new)
            .transpose()
            .map_err(|e| DomainError::database(format!("Invalid user_id in row: {e}")))?;

        Ok(BillingLogEntry {
            id: LogEntryId::from_uuid(row.id),
            timestamp: Timestamp::from_datetime(row.logged_at),
            level,
            event: row.event,
            user_id,
            customer_id: row.customer_id,
            subscription_id: row.subscription_id,
            amount: row.amount,
            currency: row.currency,
            metadata: row.metadata.0,
            error: row.error,
        })
    }
}

#[async_trait]
impl BillingEventLog for PostgresBillingEventLog {
    async fn append(&self, entry: BillingLogEntry) {
        entry.trace();
        if let Err(e) = self.insert(&entry).await {
            tracing::error!(
                event = %entry.event,
                error = %e,
                "Failed to persist billing log entry"
            );
        }
    }

    async fn query(&self, query: &LogQuery) -> Result<Vec<BillingLogEntry>, DomainError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, logged_at, level, event, user_id, customer_id, subscription_id, \
             amount, currency, metadata, error FROM billing_log_entries WHERE TRUE",
        );
        if let Some(user_id) = &query.user_id {
            builder.push(" AND user_id = ").push_bind(user_id.as_str().to_string());
        }
        if let Some(customer_id) = &query.customer_id {
            builder.push(" AND customer_id = ").push_bind(customer_id.clone());
        }
        if let Some(subscription_id) = &query.subscription_id {
            builder.push(" AND subscription_id = ").push_bind(subscription_id.clone());
        }
        if let Some(level) = query.level {
            builder.push(" AND level = ").push_bind(level.as_str());
        }
        if let Some(event) = &query.event {
            builder.push(" AND event = ").push_bind(event.clone());
        }
        builder.push(" ORDER BY logged_at DESC");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows: Vec<LogRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to query billing log: {e}")))?;

        rows.into_iter().map(BillingLogEntry::try_from).collect()
    }

    async fn sweep_before(&self, cutoff: Timestamp) -> Result<usize, DomainError> {
        let result = sqlx::query("DELETE FROM billing_log_entries WHERE logged_at < $1")
            .bind(cutoff.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to sweep billing log: {e}")))?;
        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }
}
