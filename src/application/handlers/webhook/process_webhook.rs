//! ProcessWebhookHandler - verifies, decodes and dispatches a webhook delivery.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::event_router::EventRouter;
use crate::domain::billing::{BillingError, BillingLogEntry, WebhookVerifier};
use crate::ports::BillingEventLog;

/// A raw webhook delivery, exactly as received.
#[derive(Debug, Clone)]
pub struct ProcessWebhookCommand {
    pub body: Vec<u8>,
    pub signature: Option<String>,
}

/// Per-event outcome of an accepted delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessWebhookResult {
    pub results: BTreeMap<String, bool>,
}

impl ProcessWebhookResult {
    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|ok| **ok).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

pub struct ProcessWebhookHandler {
    verifier: WebhookVerifier,
    router: Arc<EventRouter>,
    log: Arc<dyn BillingEventLog>,
}

impl ProcessWebhookHandler {
    pub fn new(
        verifier: WebhookVerifier,
        router: Arc<EventRouter>,
        log: Arc<dyn BillingEventLog>,
    ) -> Self {
        Self {
            verifier,
            router,
            log,
        }
    }

    /// Rejects the whole delivery only on a bad signature or undecodable
    /// body. Otherwise every event is attempted and the delivery succeeds,
    /// even if some events failed.
    pub async fn handle(
        &self,
        cmd: ProcessWebhookCommand,
    ) -> Result<ProcessWebhookResult, BillingError> {
        let batch = match self
            .verifier
            .verify_and_parse(&cmd.body, cmd.signature.as_deref())
        {
            Ok(batch) => batch,
            Err(err) => {
                tracing::warn!(error = %err, body_len = cmd.body.len(), "Webhook rejected");
                self.log
                    .append(
                        BillingLogEntry::warn("webhook_rejected")
                            .with_metadata("body_len", cmd.body.len())
                            .with_error(err.to_string()),
                    )
                    .await;
                return Err(BillingError::Webhook(err));
            }
        };

        tracing::info!(events = batch.len(), "Webhook batch received");
        let results = self.router.dispatch_batch(&batch).await;
        let result = ProcessWebhookResult { results };
        tracing::info!(
            succeeded = result.succeeded(),
            failed = result.failed(),
            "Webhook batch processed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::test_support::{Fixture, WEBHOOK_SECRET};
    use crate::domain::billing::{compute_signature, BillingStatus, LogLevel, WebhookError};

    const BODY: &str = r#"{"events":[
        {"id":"EV1","created_at":"2024-01-15T10:30:00Z","resource_type":"subscriptions","action":"created","links":{"subscription":"SB1"}},
        {"id":"EV2","created_at":"2024-01-15T10:31:00Z","resource_type":"payments","action":"confirmed","links":{"subscription":"SB1","payment":"PM1"}}
    ]}"#;

    fn command(body: &str, signature: Option<String>) -> ProcessWebhookCommand {
        ProcessWebhookCommand {
            body: body.as_bytes().to_vec(),
            signature,
        }
    }

    #[tokio::test]
    async fn signed_batch_is_applied() {
        let fixture = Fixture::new().await;
        let handler = fixture.webhook_handler();
        let signature = compute_signature(WEBHOOK_SECRET, BODY.as_bytes());

        let result = handler.handle(command(BODY, Some(signature))).await.unwrap();

        assert_eq!(result.succeeded(), 2);
        assert_eq!(result.failed(), 0);
        assert_eq!(fixture.status().await, BillingStatus::Active);
    }

    #[tokio::test]
    async fn tampered_body_is_rejected_without_processing() {
        let fixture = Fixture::new().await;
        let handler = fixture.webhook_handler();
        let signature = compute_signature(WEBHOOK_SECRET, BODY.as_bytes());
        let tampered = BODY.replace("created", "cancelled");

        let result = handler.handle(command(&tampered, Some(signature))).await;

        assert_eq!(
            result,
            Err(BillingError::Webhook(WebhookError::InvalidSignature))
        );
        assert_eq!(fixture.status().await, BillingStatus::PendingCustomerApproval);
        assert_eq!(fixture.log.count_level(LogLevel::Info).await, 0);
    }

    #[tokio::test]
    async fn unparseable_signed_body_is_rejected() {
        let fixture = Fixture::new().await;
        let handler = fixture.webhook_handler();
        let body = "{\"events\": [";
        let signature = compute_signature(WEBHOOK_SECRET, body.as_bytes());

        let result = handler.handle(command(body, Some(signature))).await;

        assert!(matches!(
            result,
            Err(BillingError::Webhook(WebhookError::ParseError(_)))
        ));
    }

    #[tokio::test]
    async fn missing_signature_is_rejected() {
        let fixture = Fixture::new().await;
        let result = fixture.webhook_handler().handle(command(BODY, None)).await;
        assert_eq!(
            result,
            Err(BillingError::Webhook(WebhookError::MissingSignature))
        );
    }
}
