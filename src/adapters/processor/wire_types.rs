//! Processor wire shapes and their translation into domain types.
//!
//! Resources travel wrapped in an envelope keyed by the resource name
//! (`{"subscriptions": {...}}`). Nothing here is visible outside the
//! adapter.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::billing::{
    CompletedRedirectFlow, CustomerDetails, ExternalCustomer, ExternalSubscription,
    ExternalSubscriptionStatus, Mandate, MandateStatus, PlanId, RedirectFlow,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{ProcessorError, ProcessorErrorKind};

// ════════════════════════════════════════════════════════════════════════════
// Envelopes
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize, Deserialize)]
pub struct CustomersEnvelope<T> {
    pub customers: T,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionsEnvelope<T> {
    pub subscriptions: T,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedirectFlowsEnvelope<T> {
    pub redirect_flows: T,
}

#[derive(Debug, Deserialize)]
pub struct MandatesEnvelope {
    pub mandates: Vec<WireMandate>,
}

#[derive(Debug, Serialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

// ════════════════════════════════════════════════════════════════════════════
// Requests
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Serialize)]
pub struct WireCustomerParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl From<CustomerDetails> for WireCustomerParams {
    fn from(details: CustomerDetails) -> Self {
        Self {
            email: details.email,
            given_name: details.given_name,
            family_name: details.family_name,
            company_name: details.company_name,
            address_line1: details.address_line1,
            city: details.city,
            postal_code: details.postal_code,
            country_code: details.country_code,
            metadata: details.metadata,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WirePrefilledCustomer {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct WireRedirectFlowParams {
    pub description: String,
    pub session_token: String,
    pub success_redirect_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefilled_customer: Option<WirePrefilledCustomer>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct WireCompleteFlowParams {
    pub session_token: String,
}

#[derive(Debug, Serialize)]
pub struct WireMandateLink {
    pub mandate: String,
}

#[derive(Debug, Serialize)]
pub struct WireSubscriptionParams {
    pub amount: i64,
    pub currency: String,
    pub name: String,
    pub interval_unit: String,
    pub metadata: HashMap<String, String>,
    pub links: WireMandateLink,
}

#[derive(Debug, Default, Serialize)]
pub struct WireSubscriptionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Serialize)]
pub struct WireActionParams {
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

// ════════════════════════════════════════════════════════════════════════════
// Responses
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct WireCustomer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub address_line1: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    pub created_at: String,
}

impl WireCustomer {
    pub fn into_domain(self) -> Result<ExternalCustomer, ProcessorError> {
        let created_at = parse_timestamp("customers.created_at", &self.created_at)?;
        Ok(ExternalCustomer {
            id: self.id,
            email: self.email.unwrap_or_default(),
            given_name: self.given_name,
            family_name: self.family_name,
            company_name: self.company_name,
            address_line1: self.address_line1,
            city: self.city,
            postal_code: self.postal_code,
            country_code: self.country_code,
            created_at,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct WireUpcomingPayment {
    pub charge_date: NaiveDate,
    #[serde(default)]
    pub amount: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WireSubscriptionLinks {
    #[serde(default)]
    pub mandate: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireSubscription {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub upcoming_payments: Vec<WireUpcomingPayment>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub links: WireSubscriptionLinks,
}

impl WireSubscription {
    pub fn into_domain(self) -> Result<ExternalSubscription, ProcessorError> {
        let status = ExternalSubscriptionStatus::parse(&self.status)
            .map_err(|e| malformed(format!("subscriptions.status: {}", e)))?;
        let mandate_id = self
            .links
            .mandate
            .ok_or_else(|| malformed("subscriptions.links.mandate missing"))?;
        let plan_id = self
            .metadata
            .get("plan_id")
            .cloned()
            .or(self.name)
            .map(PlanId::new)
            .ok_or_else(|| malformed("subscriptions.metadata.plan_id missing"))?;
        let customer_id = self
            .links
            .customer
            .or_else(|| self.metadata.get("customer_id").cloned());
        let next_charge_date = self.upcoming_payments.iter().map(|p| p.charge_date).min();

        Ok(ExternalSubscription {
            id: self.id,
            customer_id,
            plan_id,
            mandate_id,
            status,
            start_date: self.start_date,
            end_date: self.end_date,
            next_charge_date,
            metadata: self.metadata,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct WireRedirectFlow {
    pub id: String,
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub confirmation_url: Option<String>,
    #[serde(default)]
    pub links: WireSubscriptionLinks,
}

impl WireRedirectFlow {
    pub fn into_started(self, session_token: &str) -> Result<RedirectFlow, ProcessorError> {
        let redirect_url = self
            .redirect_url
            .ok_or_else(|| malformed("redirect_flows.redirect_url missing"))?;
        Ok(RedirectFlow {
            id: self.id,
            redirect_url,
            session_token: self.session_token.unwrap_or_else(|| session_token.to_string()),
        })
    }

    pub fn into_completed(self) -> Result<CompletedRedirectFlow, ProcessorError> {
        let customer_id = self
            .links
            .customer
            .ok_or_else(|| malformed("redirect_flows.links.customer missing"))?;
        let mandate_id = self
            .links
            .mandate
            .ok_or_else(|| malformed("redirect_flows.links.mandate missing"))?;
        Ok(CompletedRedirectFlow {
            id: self.id,
            customer_id,
            mandate_id,
            confirmation_url: self.confirmation_url,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct WireMandate {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub next_possible_charge_date: Option<NaiveDate>,
}

impl WireMandate {
    pub fn into_domain(self) -> Result<Mandate, ProcessorError> {
        let status = MandateStatus::parse(&self.status)
            .map_err(|e| malformed(format!("mandates.status: {}", e)))?;
        Ok(Mandate {
            id: self.id,
            status,
            scheme: self.scheme.unwrap_or_default(),
            reference: self.reference,
            next_charge_date: self.next_possible_charge_date,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Errors
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct WireErrorEnvelope {
    pub error: WireError,
}

#[derive(Debug, Deserialize)]
pub struct WireError {
    #[serde(default, rename = "type")]
    pub error_type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub errors: Vec<WireErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct WireErrorDetail {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Builds a `ProcessorError` from a non-2xx response.
///
/// The first detail `reason` wins, then the error `type`, then the HTTP
/// status.
pub fn error_from_response(status: u16, body: &str) -> ProcessorError {
    let parsed: Option<WireErrorEnvelope> = serde_json::from_str(body).ok();

    let (kind, message) = match parsed {
        Some(envelope) => {
            let reason = envelope.error.errors.first().and_then(|d| d.reason.clone());
            let kind = reason
                .as_deref()
                .and_then(kind_from_reason)
                .or_else(|| envelope.error.error_type.as_deref().and_then(kind_from_type))
                .unwrap_or_else(|| ProcessorErrorKind::from_status(status));
            let message = envelope
                .error
                .message
                .or_else(|| envelope.error.errors.into_iter().find_map(|d| d.message))
                .unwrap_or_else(|| format!("Processor returned {}", status));
            (kind, message)
        }
        None => (
            ProcessorErrorKind::from_status(status),
            format!("Processor returned {}", status),
        ),
    };

    ProcessorError::new(kind, message)
        .with_status(status)
        .with_raw(body)
}

fn kind_from_reason(reason: &str) -> Option<ProcessorErrorKind> {
    match reason {
        "rate_limit_exceeded" => Some(ProcessorErrorKind::RateLimitExceeded),
        "resource_not_found" | "not_found" => Some(ProcessorErrorKind::NotFound),
        "access_denied" | "insufficient_permissions" | "permission_denied" => {
            Some(ProcessorErrorKind::PermissionDenied)
        }
        "cancellation_failed"
        | "subscription_not_active"
        | "already_cancelled"
        | "pause_failed"
        | "resume_failed" => Some(ProcessorErrorKind::InvalidState),
        "internal_error" | "internal_server_error" => Some(ProcessorErrorKind::InternalError),
        "service_unavailable" => Some(ProcessorErrorKind::ServiceUnavailable),
        _ => None,
    }
}

fn kind_from_type(error_type: &str) -> Option<ProcessorErrorKind> {
    match error_type {
        "invalid_state" => Some(ProcessorErrorKind::InvalidState),
        "validation_failed" | "invalid_api_usage" => Some(ProcessorErrorKind::ValidationFailed),
        "internal_error" => Some(ProcessorErrorKind::InternalError),
        _ => None,
    }
}

fn malformed(message: impl Into<String>) -> ProcessorError {
    ProcessorError::new(ProcessorErrorKind::Unknown, message)
}

fn parse_timestamp(field: &str, value: &str) -> Result<Timestamp, ProcessorError> {
    Timestamp::parse_rfc3339(value)
        .ok_or_else(|| malformed(format!("{}: invalid timestamp", field)))
}
