//! In-Memory Billing Event Log
//!
//! Keeps entries in append order and mirrors each one to `tracing`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{BillingLogEntry, LogLevel};
use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{BillingEventLog, LogQuery};

#[derive(Debug, Clone, Default)]
pub struct InMemoryBillingEventLog {
    entries: Arc<RwLock<Vec<BillingLogEntry>>>,
}

impl InMemoryBillingEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of entries at `level`.
    pub async fn count_level(&self, level: LogLevel) -> usize {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.level == level)
            .count()
    }
}

#[async_trait]
impl BillingEventLog for InMemoryBillingEventLog {
    async fn append(&self, entry: BillingLogEntry) {
        entry.trace();
        self.entries.write().await.push(entry);
    }

    async fn query(&self, query: &LogQuery) -> Result<Vec<BillingLogEntry>, DomainError> {
        let entries = self.entries.read().await;
        let matches = entries.iter().rev().filter(|e| query.matches(e)).cloned();
        Ok(match query.limit {
            Some(limit) => matches.take(limit).collect(),
            None => matches.collect(),
        })
    }

    async fn sweep_before(&self, cutoff: Timestamp) -> Result<usize, DomainError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| !e.timestamp.is_before(&cutoff));
        Ok(before - entries.len())
    }
}
