//! Exponential backoff for retryable failures.
//!
//! Attempt `n` that fails with a retryable error waits `base * 2^(n-1)`
//! before attempt `n + 1`. Terminal errors return immediately.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::billing::{BillingError, BillingLogEntry};
use crate::domain::foundation::UserId;
use crate::ports::BillingEventLog;

/// Default number of attempts, first call included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Identifies what is being retried, for log entries.
#[derive(Debug, Clone, Default)]
pub struct RetryScope {
    pub operation: String,
    pub user_id: Option<UserId>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
}

impl RetryScope {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Self::default()
        }
    }

    pub fn user(mut self, user_id: &UserId) -> Self {
        self.user_id = Some(user_id.clone());
        self
    }

    pub fn customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn subscription(mut self, subscription_id: impl Into<String>) -> Self {
        self.subscription_id = Some(subscription_id.into());
        self
    }

    fn entry(&self, entry: BillingLogEntry) -> BillingLogEntry {
        entry
            .with_ids(
                self.user_id.as_ref(),
                self.customer_id.as_deref(),
                self.subscription_id.as_deref(),
            )
            .with_metadata("operation", self.operation.clone())
    }
}

#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    log: Arc<dyn BillingEventLog>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, log: Arc<dyn BillingEventLog>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            log,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Runs `operation` until it succeeds, fails terminally, or the attempt
    /// budget is spent. The closure receives the 1-based attempt number.
    ///
    /// Only retried calls reach the event log. A first-attempt success or a
    /// terminal failure is traced here and left for the caller to record.
    pub async fn run<T, F, Fut>(
        &self,
        scope: &RetryScope,
        mut operation: F,
    ) -> Result<T, BillingError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, BillingError>>,
    {
        let mut attempt = 1;
        loop {
            tracing::debug!(operation = %scope.operation, attempt, "Attempting operation");
            match operation(attempt).await {
                Ok(value) => {
                    if attempt == 1 {
                        tracing::debug!(operation = %scope.operation, "Operation succeeded");
                    } else {
                        tracing::info!(
                            operation = %scope.operation,
                            attempts = attempt,
                            "Operation succeeded after retry"
                        );
                        let entry = BillingLogEntry::info("retry_succeeded")
                            .with_metadata("attempt", attempt);
                        self.log.append(scope.entry(entry)).await;
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation = %scope.operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retryable failure, backing off"
                    );
                    self.log
                        .append(scope.entry(
                            BillingLogEntry::warn("retry_attempt_failed")
                                .with_metadata("attempt", attempt)
                                .with_metadata("delay_ms", delay.as_millis() as u64)
                                .with_error(err.to_string()),
                        ))
                        .await;
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        tracing::error!(
                            operation = %scope.operation,
                            attempts = attempt,
                            error = %err,
                            "Retries exhausted"
                        );
                        let mut entry = BillingLogEntry::error("retry_exhausted")
                            .with_metadata("attempt", attempt)
                            .with_error(err.to_string());
                        if let Some(raw) = err.raw() {
                            entry = entry.with_metadata("raw", raw.to_string());
                        }
                        self.log.append(scope.entry(entry)).await;
                    } else {
                        tracing::debug!(
                            operation = %scope.operation,
                            attempt,
                            error = %err,
                            "Terminal failure, not retrying"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingEventLog;
    use crate::domain::billing::LogLevel;
    use crate::ports::LogQuery;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn retryable() -> BillingError {
        BillingError::ExternalApi {
            status_code: 503,
            reason: "service_unavailable".into(),
            message: "down".into(),
            retryable: true,
            raw: None,
        }
    }

    fn policy(log: Arc<InMemoryBillingEventLog>) -> RetryPolicy {
        RetryPolicy::new(DEFAULT_MAX_ATTEMPTS, Duration::from_millis(2), log)
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let log = Arc::new(InMemoryBillingEventLog::new());
        let policy = RetryPolicy::new(3, Duration::from_millis(100), log);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let log = Arc::new(InMemoryBillingEventLog::new());
        let policy = RetryPolicy::new(0, Duration::from_millis(1), log);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[tokio::test]
    async fn always_retryable_failure_is_attempted_three_times() {
        let log = Arc::new(InMemoryBillingEventLog::new());
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy(log.clone())
            .run(&RetryScope::new("create_subscription"), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(retryable()) }
            })
            .await;

        assert!(matches!(result, Err(BillingError::ExternalApi { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let warnings = log
            .query(&LogQuery {
                level: Some(LogLevel::Warn),
                ..LogQuery::default()
            })
            .await
            .unwrap();
        let mut delays: Vec<u64> = warnings
            .iter()
            .map(|e| e.metadata["delay_ms"].as_u64().unwrap())
            .collect();
        delays.reverse();
        assert_eq!(delays, vec![2, 4]);

        let errors = log
            .query(&LogQuery {
                level: Some(LogLevel::Error),
                ..LogQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].event, "retry_exhausted");
    }

    #[tokio::test]
    async fn terminal_failure_is_not_retried() {
        let log = Arc::new(InMemoryBillingEventLog::new());
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy(log.clone())
            .run(&RetryScope::new("cancel_subscription"), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(BillingError::subscription("already cancelled")) }
            })
            .await;

        assert!(matches!(result, Err(BillingError::Subscription(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(log.query(&LogQuery::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recovers_when_a_later_attempt_succeeds() {
        let log = Arc::new(InMemoryBillingEventLog::new());

        let result = policy(log.clone())
            .run(&RetryScope::new("get_subscription"), |attempt| async move {
                if attempt < 2 {
                    Err(retryable())
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        let events: Vec<String> = log
            .query(&LogQuery::default())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event)
            .collect();
        assert_eq!(events, vec!["retry_succeeded", "retry_attempt_failed"]);
    }

    #[tokio::test]
    async fn first_try_success_logs_nothing() {
        let log = Arc::new(InMemoryBillingEventLog::new());
        let result = policy(log.clone())
            .run(&RetryScope::new("noop"), |_| async { Ok::<_, BillingError>(7) })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert!(log.query(&LogQuery::default()).await.unwrap().is_empty());
    }
}
