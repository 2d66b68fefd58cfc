//! In-Memory Billing Record Store
//!
//! Records keyed by user id, with secondary indexes on subscription id and
//! mandate id. Conditional updates check and write under one write lock.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::UserBillingRecord;
use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::ports::{BillingRecordStore, UpdateCondition, UpdateOutcome};

#[derive(Debug, Default)]
struct Tables {
    records: HashMap<UserId, UserBillingRecord>,
    by_subscription: HashMap<String, UserId>,
    by_mandate: HashMap<String, UserId>,
}

impl Tables {
    fn reindex(&mut self, previous: Option<&UserBillingRecord>, current: &UserBillingRecord) {
        if let Some(previous) = previous {
            if let Some(id) = &previous.external_subscription_id {
                self.by_subscription.remove(id);
            }
            if let Some(id) = &previous.mandate_id {
                self.by_mandate.remove(id);
            }
        }
        if let Some(id) = &current.external_subscription_id {
            self.by_subscription.insert(id.clone(), current.user_id.clone());
        }
        if let Some(id) = &current.mandate_id {
            self.by_mandate.insert(id.clone(), current.user_id.clone());
        }
    }

    fn lookup(&self, index: &HashMap<String, UserId>, key: &str) -> Option<UserBillingRecord> {
        index.get(key).and_then(|user_id| self.records.get(user_id)).cloned()
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryBillingRecordStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryBillingRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.tables.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl BillingRecordStore for InMemoryBillingRecordStore {
    async fn get_by_user_id(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UserBillingRecord>, DomainError> {
        Ok(self.tables.read().await.records.get(user_id).cloned())
    }

    async fn get_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<UserBillingRecord>, DomainError> {
        let tables = self.tables.read().await;
        Ok(tables.lookup(&tables.by_subscription, subscription_id))
    }

    async fn get_by_mandate_id(
        &self,
        mandate_id: &str,
    ) -> Result<Option<UserBillingRecord>, DomainError> {
        let tables = self.tables.read().await;
        Ok(tables.lookup(&tables.by_mandate, mandate_id))
    }

    async fn insert(&self, record: &UserBillingRecord) -> Result<(), DomainError> {
        let mut tables = self.tables.write().await;
        if tables.records.contains_key(&record.user_id) {
            return Err(DomainError::validation(
                "user_id",
                format!("Billing record already exists for {}", record.user_id),
            ));
        }
        tables.reindex(None, record);
        tables.records.insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    async fn conditional_update(
        &self,
        record: &UserBillingRecord,
        condition: UpdateCondition,
    ) -> Result<UpdateOutcome, DomainError> {
        let mut tables = self.tables.write().await;
        let Some(stored) = tables.records.get(&record.user_id).cloned() else {
            return Ok(UpdateOutcome::NotFound);
        };
        if !condition.holds_for(&stored) {
            return Ok(UpdateOutcome::Rejected);
        }

        let mut next = record.clone();
        next.version = stored.version + 1;
        next.updated_at = Timestamp::now();
        tables.reindex(Some(&stored), &next);
        tables.records.insert(next.user_id.clone(), next.clone());
        Ok(UpdateOutcome::Applied(next))
    }
}
