//! Subscription creation against a completed mandate.

use std::collections::HashMap;

use super::orchestrator::SubscriptionOrchestrator;
use crate::application::retry::RetryScope;
use crate::domain::billing::{
    BillingError, BillingLogEntry, ExternalSubscription, PlanId, UserBillingRecord,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{CreateSubscriptionRequest, IdempotencyKey};

#[derive(Debug, Clone)]
pub struct CreateSubscriptionCommand {
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct CreateSubscriptionResult {
    pub subscription: ExternalSubscription,
    pub record: UserBillingRecord,
}

impl SubscriptionOrchestrator {
    /// Creates a processor subscription and marks the record
    /// `pending_customer_approval`. Activation arrives by webhook.
    ///
    /// The plan is checked before anything else: an unknown or free plan
    /// never reaches the processor.
    pub async fn create_subscription(
        &self,
        cmd: CreateSubscriptionCommand,
    ) -> Result<CreateSubscriptionResult, BillingError> {
        let scope = RetryScope::new("create_subscription").user(&cmd.user_id);
        let result = self.try_create_subscription(&scope, cmd).await;
        if let Err(err) = &result {
            self.log_failure(&scope, err).await;
        }
        result
    }

    async fn try_create_subscription(
        &self,
        scope: &RetryScope,
        cmd: CreateSubscriptionCommand,
    ) -> Result<CreateSubscriptionResult, BillingError> {
        let plan = self.catalog.require_paid(&cmd.plan_id)?;

        let record = self.load(scope, &cmd.user_id).await?;
        if record.has_live_subscription() {
            return Err(already_subscribed(&record));
        }
        let (Some(customer_id), Some(mandate_id)) =
            (record.external_customer_id.clone(), record.mandate_id.clone())
        else {
            return Err(BillingError::validation(
                "Complete checkout to set up a mandate before subscribing",
            ));
        };
        let scope = scope.clone().customer(customer_id.clone());

        // The key is tied to the record version the check above passed on.
        // Retries and concurrent creates from that version replay one
        // processor subscription instead of opening another.
        let request = CreateSubscriptionRequest {
            user_id: cmd.user_id.clone(),
            plan_id: plan.id.clone(),
            customer_id: customer_id.clone(),
            mandate_id,
            metadata: cmd.metadata,
            idempotency_key: IdempotencyKey::derived(&[
                "create_subscription",
                cmd.user_id.as_str(),
                record.version.to_string().as_str(),
                plan.id.as_str(),
            ]),
        };
        let subscription = self
            .call_processor(&scope, || self.processor.create_subscription(request.clone()))
            .await?;
        let scope = scope.subscription(subscription.id.clone());

        let mut written = false;
        let stored = self
            .update(&scope, &cmd.user_id, |current| {
                if current.external_subscription_id.as_deref() == Some(subscription.id.as_str()) {
                    return Ok(None);
                }
                if current.has_live_subscription() {
                    return Err(already_subscribed(current));
                }
                let mut next = current.clone();
                next.begin_subscription(
                    subscription.id.clone(),
                    plan,
                    subscription.next_charge_date,
                    Timestamp::now(),
                )
                .map_err(|e| BillingError::subscription(e.to_string()))?;
                written = true;
                Ok(Some(next))
            })
            .await;
        let record = match stored {
            Ok(record) => record,
            Err(err) => {
                self.cancel_unrecorded(&scope, &cmd.user_id, &subscription.id).await;
                return Err(err);
            }
        };
        if !written {
            return Ok(CreateSubscriptionResult {
                subscription,
                record,
            });
        }

        tracing::info!(
            user_id = %cmd.user_id,
            subscription_id = %subscription.id,
            plan_id = %plan.id,
            "Subscription created"
        );
        self.log
            .append(
                BillingLogEntry::info("subscription_created")
                    .with_user(cmd.user_id.clone())
                    .with_customer(customer_id)
                    .with_subscription(subscription.id.clone())
                    .with_amount(plan.price_minor_units, plan.currency.clone())
                    .with_metadata("plan_id", plan.id.to_string()),
            )
            .await;

        Ok(CreateSubscriptionResult {
            subscription,
            record,
        })
    }

    /// Cancels a processor subscription the record never took, so the
    /// mandate is not charged for it. Skipped if the record turns out to
    /// hold it after all.
    async fn cancel_unrecorded(
        &self,
        scope: &RetryScope,
        user_id: &UserId,
        subscription_id: &str,
    ) {
        if let Ok(current) = self.load(scope, user_id).await {
            if current.external_subscription_id.as_deref() == Some(subscription_id) {
                return;
            }
        }

        let cancelled = self
            .call_processor(scope, || self.processor.cancel_subscription(subscription_id, false))
            .await;
        let entry = match cancelled {
            Ok(_) => {
                tracing::warn!(
                    user_id = %user_id,
                    subscription_id,
                    "Cancelled subscription the billing record did not take"
                );
                BillingLogEntry::warn("unrecorded_subscription_cancelled")
            }
            Err(err) => {
                tracing::error!(
                    user_id = %user_id,
                    subscription_id,
                    error = %err,
                    "Could not cancel subscription the billing record did not take"
                );
                BillingLogEntry::error("unrecorded_subscription_cancel_failed")
                    .with_error(err.to_string())
            }
        };
        self.log
            .append(
                entry
                    .with_user(user_id.clone())
                    .with_subscription(subscription_id.to_string()),
            )
            .await;
    }
}

fn already_subscribed(record: &UserBillingRecord) -> BillingError {
    BillingError::validation(format!("User already has a {} subscription", record.status))
}
