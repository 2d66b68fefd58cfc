//! Mandate setup: redirect the user to the processor and store the customer
//! and mandate when they come back.

use uuid::Uuid;

use super::orchestrator::SubscriptionOrchestrator;
use crate::application::retry::RetryScope;
use crate::domain::billing::{
    BillingError, BillingLogEntry, CustomerDetails, PlanId, RedirectFlow, UserBillingRecord,
};
use crate::domain::foundation::{AuthenticatedUser, Timestamp, UserId};
use crate::ports::{CreateCustomerRequest, CreateRedirectFlowRequest, IdempotencyKey};

#[derive(Debug, Clone)]
pub struct StartCheckoutCommand {
    pub user: AuthenticatedUser,
    pub plan_id: PlanId,
    pub success_redirect_url: String,
}

#[derive(Debug, Clone)]
pub struct StartCheckoutResult {
    pub redirect_flow: RedirectFlow,
    pub customer_id: String,
}

#[derive(Debug, Clone)]
pub struct CompleteCheckoutCommand {
    pub user_id: UserId,
    pub redirect_flow_id: String,
    pub session_token: String,
}

impl SubscriptionOrchestrator {
    /// Ensures the user has a processor customer, then opens a redirect flow
    /// for `plan_id`. The returned session token must be presented again on
    /// completion.
    pub async fn start_checkout(
        &self,
        cmd: StartCheckoutCommand,
    ) -> Result<StartCheckoutResult, BillingError> {
        let scope = RetryScope::new("start_checkout").user(&cmd.user.id);
        let result = self.try_start_checkout(&scope, cmd).await;
        if let Err(err) = &result {
            self.log_failure(&scope, err).await;
        }
        result
    }

    async fn try_start_checkout(
        &self,
        scope: &RetryScope,
        cmd: StartCheckoutCommand,
    ) -> Result<StartCheckoutResult, BillingError> {
        let plan = self.catalog.require_paid(&cmd.plan_id)?;

        let record = self.load(scope, &cmd.user.id).await?;
        if record.has_live_subscription() {
            return Err(BillingError::subscription(
                "User already has a live subscription",
            ));
        }

        let customer_id = match &record.external_customer_id {
            Some(id) => id.clone(),
            None => self.create_customer(scope, &cmd.user).await?,
        };
        let scope = scope.clone().customer(customer_id.clone());

        let request = CreateRedirectFlowRequest {
            plan_id: plan.id.clone(),
            description: plan.name.clone(),
            session_token: Uuid::new_v4().to_string(),
            success_redirect_url: cmd.success_redirect_url,
            prefilled_email: Some(cmd.user.email.clone()),
            customer_id: Some(customer_id.clone()),
            idempotency_key: IdempotencyKey::new(),
        };
        let redirect_flow = self
            .call_processor(&scope, || self.processor.create_redirect_flow(request.clone()))
            .await?;

        self.log
            .append(
                BillingLogEntry::info("checkout_started")
                    .with_user(cmd.user.id.clone())
                    .with_customer(customer_id.clone())
                    .with_metadata("plan_id", plan.id.to_string())
                    .with_metadata("redirect_flow_id", redirect_flow.id.clone()),
            )
            .await;

        Ok(StartCheckoutResult {
            redirect_flow,
            customer_id,
        })
    }

    /// Creates the processor customer and stores its id on the record.
    /// A customer id stored concurrently wins over the one just created.
    async fn create_customer(
        &self,
        scope: &RetryScope,
        user: &AuthenticatedUser,
    ) -> Result<String, BillingError> {
        let mut details = CustomerDetails::with_email(user.email.clone());
        details.given_name = user.display_name.clone();
        let request = CreateCustomerRequest {
            user_id: user.id.clone(),
            details,
            idempotency_key: IdempotencyKey::new(),
        };
        let customer = self
            .call_processor(scope, || self.processor.create_customer(request.clone()))
            .await?;

        let record = self
            .update(scope, &user.id, |current| {
                if current.external_customer_id.is_some() {
                    return Ok(None);
                }
                let mut next = current.clone();
                next.attach_customer(customer.id.clone(), Timestamp::now());
                Ok(Some(next))
            })
            .await?;

        self.log
            .append(
                BillingLogEntry::info("customer_created")
                    .with_user(user.id.clone())
                    .with_customer(customer.id.clone()),
            )
            .await;

        Ok(record.external_customer_id.unwrap_or(customer.id))
    }

    /// Finishes the redirect flow and stores the resulting mandate.
    pub async fn complete_checkout(
        &self,
        cmd: CompleteCheckoutCommand,
    ) -> Result<UserBillingRecord, BillingError> {
        let scope = RetryScope::new("complete_checkout").user(&cmd.user_id);
        let result = self.try_complete_checkout(&scope, cmd).await;
        if let Err(err) = &result {
            self.log_failure(&scope, err).await;
        }
        result
    }

    async fn try_complete_checkout(
        &self,
        scope: &RetryScope,
        cmd: CompleteCheckoutCommand,
    ) -> Result<UserBillingRecord, BillingError> {
        if cmd.redirect_flow_id.trim().is_empty() || cmd.session_token.trim().is_empty() {
            return Err(BillingError::validation(
                "redirect_flow_id and session_token are required",
            ));
        }
        self.load(scope, &cmd.user_id).await?;

        let completed = self
            .call_processor(scope, || {
                self.processor
                    .complete_redirect_flow(&cmd.redirect_flow_id, &cmd.session_token)
            })
            .await?;

        let record = self
            .update(scope, &cmd.user_id, |current| {
                if current.mandate_id.as_deref() == Some(completed.mandate_id.as_str()) {
                    return Ok(None);
                }
                let mut next = current.clone();
                next.attach_mandate(
                    completed.customer_id.clone(),
                    completed.mandate_id.clone(),
                    Timestamp::now(),
                );
                Ok(Some(next))
            })
            .await?;

        self.log
            .append(
                BillingLogEntry::info("checkout_completed")
                    .with_user(cmd.user_id.clone())
                    .with_customer(completed.customer_id.clone())
                    .with_metadata("mandate_id", completed.mandate_id.clone())
                    .with_metadata("redirect_flow_id", completed.id.clone()),
            )
            .await;

        Ok(record)
    }
}
