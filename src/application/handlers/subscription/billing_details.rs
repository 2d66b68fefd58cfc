//! Customer details held by the processor.

use super::orchestrator::SubscriptionOrchestrator;
use crate::application::retry::RetryScope;
use crate::domain::billing::{BillingError, BillingLogEntry, CustomerDetails, ExternalCustomer};
use crate::domain::foundation::UserId;

#[derive(Debug, Clone)]
pub struct UpdateBillingDetailsCommand {
    pub user_id: UserId,
    pub details: CustomerDetails,
}

impl SubscriptionOrchestrator {
    pub async fn update_billing_details(
        &self,
        cmd: UpdateBillingDetailsCommand,
    ) -> Result<ExternalCustomer, BillingError> {
        let scope = RetryScope::new("update_billing_details").user(&cmd.user_id);
        let result = self.try_update_details(&scope, cmd).await;
        if let Err(err) = &result {
            self.log_failure(&scope, err).await;
        }
        result
    }

    async fn try_update_details(
        &self,
        scope: &RetryScope,
        cmd: UpdateBillingDetailsCommand,
    ) -> Result<ExternalCustomer, BillingError> {
        if cmd.details.email.as_deref().is_some_and(|e| !e.contains('@')) {
            return Err(BillingError::validation("email is not a valid address"));
        }

        let record = self.load(scope, &cmd.user_id).await?;
        let customer_id = record
            .external_customer_id
            .ok_or_else(|| BillingError::validation("User has no processor customer yet"))?;
        let scope = scope.clone().customer(customer_id.clone());

        let customer = self
            .call_processor(&scope, || {
                self.processor
                    .update_customer(&customer_id, cmd.details.clone())
            })
            .await?;

        self.log
            .append(
                BillingLogEntry::info("billing_details_updated")
                    .with_user(cmd.user_id.clone())
                    .with_customer(customer_id.clone()),
            )
            .await;
        Ok(customer)
    }
}
