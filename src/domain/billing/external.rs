//! Processor resources translated into this crate's model.
//!
//! These types are produced only by processor adapters. Nothing past the
//! adapter boundary sees the processor's wire shape.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::PlanId;
use crate::domain::foundation::{Timestamp, ValidationError};

/// Customer identity at the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCustomer {
    pub id: String,
    pub email: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub company_name: Option<String>,
    pub address_line1: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: Option<String>,
    pub created_at: Timestamp,
}

/// Fields sent when creating or updating a customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub email: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub company_name: Option<String>,
    pub address_line1: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl CustomerDetails {
    pub fn with_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalSubscriptionStatus {
    PendingCustomerApproval,
    CustomerApprovalDenied,
    Active,
    Finished,
    Cancelled,
    Paused,
}

impl ExternalSubscriptionStatus {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "pending_customer_approval" => Ok(Self::PendingCustomerApproval),
            "customer_approval_denied" => Ok(Self::CustomerApprovalDenied),
            "active" => Ok(Self::Active),
            "finished" => Ok(Self::Finished),
            "cancelled" => Ok(Self::Cancelled),
            "paused" => Ok(Self::Paused),
            other => Err(ValidationError::unknown("subscription_status", other)),
        }
    }

    pub fn is_ended(&self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Cancelled | Self::CustomerApprovalDenied
        )
    }
}

/// Subscription as reported by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSubscription {
    pub id: String,
    pub customer_id: Option<String>,
    pub plan_id: PlanId,
    pub mandate_id: String,
    pub status: ExternalSubscriptionStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub next_charge_date: Option<NaiveDate>,
    pub metadata: HashMap<String, String>,
}

/// Mutations accepted by `update_subscription`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SubscriptionUpdate {
    Pause,
    Resume,
    Metadata { metadata: HashMap<String, String> },
}

impl SubscriptionUpdate {
    pub fn name(&self) -> &'static str {
        match self {
            SubscriptionUpdate::Pause => "pause",
            SubscriptionUpdate::Resume => "resume",
            SubscriptionUpdate::Metadata { .. } => "metadata",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MandateStatus {
    PendingCustomerApproval,
    PendingSubmission,
    Submitted,
    Active,
    Failed,
    Cancelled,
    Expired,
}

impl MandateStatus {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "pending_customer_approval" => Ok(Self::PendingCustomerApproval),
            "pending_submission" => Ok(Self::PendingSubmission),
            "submitted" => Ok(Self::Submitted),
            "active" => Ok(Self::Active),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            other => Err(ValidationError::unknown("mandate_status", other)),
        }
    }

    /// True if payments may still be collected against the mandate.
    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::Failed | Self::Cancelled | Self::Expired)
    }
}

/// Authorization to debit a customer's account. Also the payment method
/// returned by `list_payment_methods`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mandate {
    pub id: String,
    pub status: MandateStatus,
    pub scheme: String,
    pub reference: Option<String>,
    pub next_charge_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    PendingCustomerApproval,
    PendingSubmission,
    Submitted,
    Confirmed,
    PaidOut,
    Cancelled,
    CustomerApprovalDenied,
    Failed,
    ChargedBack,
}

/// One charge attempt for one billing cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub subscription_id: Option<String>,
    pub mandate_id: String,
    pub amount_minor_units: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub charge_date: NaiveDate,
    pub created_at: Timestamp,
}

/// A hosted mandate-setup page the customer is sent to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectFlow {
    pub id: String,
    pub redirect_url: String,
    pub session_token: String,
}

/// Result of completing a redirect flow: the customer and mandate it created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedRedirectFlow {
    pub id: String,
    pub customer_id: String,
    pub mandate_id: String,
    pub confirmation_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_status_parses_processor_values() {
        assert_eq!(
            ExternalSubscriptionStatus::parse("customer_approval_denied"),
            Ok(ExternalSubscriptionStatus::CustomerApprovalDenied)
        );
        assert!(ExternalSubscriptionStatus::parse("late_failure_settled").is_err());
    }

    #[test]
    fn ended_subscription_states() {
        assert!(ExternalSubscriptionStatus::Cancelled.is_ended());
        assert!(ExternalSubscriptionStatus::CustomerApprovalDenied.is_ended());
        assert!(!ExternalSubscriptionStatus::Paused.is_ended());
    }

    #[test]
    fn mandate_usability() {
        assert!(MandateStatus::PendingSubmission.is_usable());
        assert!(!MandateStatus::Expired.is_usable());
        assert_eq!(MandateStatus::parse("submitted"), Ok(MandateStatus::Submitted));
    }

    #[test]
    fn subscription_update_is_tagged_by_action() {
        let update: SubscriptionUpdate = serde_json::from_str(r#"{"action":"pause"}"#).unwrap();
        assert_eq!(update, SubscriptionUpdate::Pause);

        let update: SubscriptionUpdate =
            serde_json::from_str(r#"{"action":"metadata","metadata":{"team":"a"}}"#).unwrap();
        assert_eq!(update.name(), "metadata");
    }
}
