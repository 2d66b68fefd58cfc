//! Cancel, pause, resume and metadata changes on an existing subscription.
//!
//! None of these write a status. The processor confirms each change with a
//! webhook and the reconciliation handlers apply it.

use super::orchestrator::SubscriptionOrchestrator;
use crate::application::retry::RetryScope;
use crate::domain::billing::{
    BillingError, BillingLogEntry, BillingStatus, ExternalSubscription, SubscriptionUpdate,
};
use crate::domain::foundation::UserId;

#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub user_id: UserId,
    pub subscription_id: String,
    /// End after the current paid cycle instead of immediately.
    pub at_period_end: bool,
}

#[derive(Debug, Clone)]
pub struct UpdateSubscriptionCommand {
    pub user_id: UserId,
    pub subscription_id: String,
    pub update: SubscriptionUpdate,
}

impl SubscriptionOrchestrator {
    pub async fn cancel_subscription(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<ExternalSubscription, BillingError> {
        let scope = RetryScope::new("cancel_subscription")
            .user(&cmd.user_id)
            .subscription(cmd.subscription_id.clone());
        let result = self.try_cancel(&scope, &cmd).await;
        if let Err(err) = &result {
            self.log_failure(&scope, err).await;
        }
        result
    }

    async fn try_cancel(
        &self,
        scope: &RetryScope,
        cmd: &CancelSubscriptionCommand,
    ) -> Result<ExternalSubscription, BillingError> {
        let record = self.load(scope, &cmd.user_id).await?;
        Self::require_owned(&record, &cmd.subscription_id)?;
        if !record.has_live_subscription() {
            return Err(BillingError::subscription(format!(
                "Cannot cancel a {} subscription",
                record.status
            )));
        }

        let subscription = self
            .call_processor(scope, || {
                self.processor
                    .cancel_subscription(&cmd.subscription_id, cmd.at_period_end)
            })
            .await?;

        self.log
            .append(
                BillingLogEntry::info("subscription_cancel_requested")
                    .with_ids(
                        Some(&cmd.user_id),
                        record.external_customer_id.as_deref(),
                        Some(&cmd.subscription_id),
                    )
                    .with_metadata("at_period_end", cmd.at_period_end),
            )
            .await;
        Ok(subscription)
    }

    pub async fn update_subscription(
        &self,
        cmd: UpdateSubscriptionCommand,
    ) -> Result<ExternalSubscription, BillingError> {
        let scope = RetryScope::new("update_subscription")
            .user(&cmd.user_id)
            .subscription(cmd.subscription_id.clone());
        let result = self.try_update(&scope, &cmd).await;
        if let Err(err) = &result {
            self.log_failure(&scope, err).await;
        }
        result
    }

    async fn try_update(
        &self,
        scope: &RetryScope,
        cmd: &UpdateSubscriptionCommand,
    ) -> Result<ExternalSubscription, BillingError> {
        let record = self.load(scope, &cmd.user_id).await?;
        Self::require_owned(&record, &cmd.subscription_id)?;

        let permitted = match &cmd.update {
            SubscriptionUpdate::Pause => record.status == BillingStatus::Active,
            SubscriptionUpdate::Resume => record.status == BillingStatus::Paused,
            SubscriptionUpdate::Metadata { .. } => record.has_live_subscription(),
        };
        if !permitted {
            return Err(BillingError::subscription(format!(
                "Cannot {} a {} subscription",
                cmd.update.name(),
                record.status
            )));
        }

        let subscription = self
            .call_processor(scope, || {
                self.processor
                    .update_subscription(&cmd.subscription_id, cmd.update.clone())
            })
            .await?;

        self.log
            .append(
                BillingLogEntry::info("subscription_update_requested")
                    .with_ids(
                        Some(&cmd.user_id),
                        record.external_customer_id.as_deref(),
                        Some(&cmd.subscription_id),
                    )
                    .with_metadata("action", cmd.update.name()),
            )
            .await;
        Ok(subscription)
    }
}
