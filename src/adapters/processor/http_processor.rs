//! HTTP client for the direct-debit processor.
//!
//! Implements `PaymentProcessor` over the processor's JSON API. Plan ids are
//! checked against the catalog before any request leaves the process, and
//! create calls forward the caller's `IdempotencyKey` as the
//! `Idempotency-Key` header so a retried create never duplicates.
//!
//! # Configuration
//!
//! ```ignore
//! let config = HttpProcessorConfig::new("https://api.processor.test", token)
//!     .with_timeout(Duration::from_secs(10));
//! let processor = HttpPaymentProcessor::new(config, catalog)?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::domain::billing::{
    CompletedRedirectFlow, CustomerDetails, ExternalCustomer, ExternalSubscription, Mandate, Plan,
    PlanCatalog, PlanId, RedirectFlow, SubscriptionUpdate,
};
use crate::ports::{
    CreateCustomerRequest, CreateRedirectFlowRequest, CreateSubscriptionRequest,
    PaymentProcessor, ProcessorError, ProcessorErrorKind,
};

use super::wire_types::{
    error_from_response, CustomersEnvelope, DataEnvelope, MandatesEnvelope,
    RedirectFlowsEnvelope, SubscriptionsEnvelope, WireActionParams, WireCompleteFlowParams,
    WireCustomer, WireCustomerParams, WireMandateLink, WirePrefilledCustomer, WireRedirectFlow,
    WireRedirectFlowParams, WireSubscription, WireSubscriptionParams, WireSubscriptionUpdate,
};

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";
pub const API_VERSION_HEADER: &str = "Api-Version";
pub const DEFAULT_API_VERSION: &str = "2015-07-06";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Processor API connection settings.
#[derive(Clone)]
pub struct HttpProcessorConfig {
    base_url: String,
    access_token: SecretString,
    api_version: String,
    timeout: Duration,
}

impl HttpProcessorConfig {
    pub fn new(base_url: impl Into<String>, access_token: SecretString) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token,
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl std::fmt::Debug for HttpProcessorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProcessorConfig")
            .field("base_url", &self.base_url)
            .field("access_token", &"[REDACTED]")
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// `PaymentProcessor` backed by the processor's REST API.
pub struct HttpPaymentProcessor {
    config: HttpProcessorConfig,
    catalog: Arc<PlanCatalog>,
    http_client: reqwest::Client,
}

impl HttpPaymentProcessor {
    pub fn new(
        config: HttpProcessorConfig,
        catalog: Arc<PlanCatalog>,
    ) -> Result<Self, ProcessorError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProcessorError::network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            catalog,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http_client
            .request(method, self.url(path))
            .bearer_auth(self.config.access_token.expose_secret())
            .header(API_VERSION_HEADER, &self.config.api_version)
    }

    fn paid_plan(&self, plan_id: &PlanId) -> Result<&Plan, ProcessorError> {
        self.catalog
            .require_paid(plan_id)
            .map_err(|_| ProcessorError::invalid_plan(plan_id))
    }

    async fn send(
        &self,
        operation: &str,
        builder: RequestBuilder,
    ) -> Result<reqwest::Response, ProcessorError> {
        builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProcessorError::timeout(format!("{} timed out: {}", operation, e))
            } else {
                ProcessorError::network(format!("{} failed: {}", operation, e))
            }
        })
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &str,
        builder: RequestBuilder,
    ) -> Result<T, ProcessorError> {
        let response = self.send(operation, builder).await?;
        self.read_body(operation, response).await
    }

    /// Like `execute`, but a 404 yields `None`.
    async fn execute_optional<T: DeserializeOwned>(
        &self,
        operation: &str,
        builder: RequestBuilder,
    ) -> Result<Option<T>, ProcessorError> {
        let response = self.send(operation, builder).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        self.read_body(operation, response).await.map(Some)
    }

    async fn read_body<T: DeserializeOwned>(
        &self,
        operation: &str,
        response: reqwest::Response,
    ) -> Result<T, ProcessorError> {
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ProcessorError::network(format!("{}: failed to read body: {}", operation, e))
        })?;

        if !status.is_success() {
            tracing::error!(
                operation = operation,
                status = status.as_u16(),
                "Processor API error"
            );
            return Err(error_from_response(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            ProcessorError::new(
                ProcessorErrorKind::Unknown,
                format!("{}: unexpected response: {}", operation, e),
            )
            .with_status(status.as_u16())
            .with_raw(body.clone())
        })
    }

    async fn subscription_action(
        &self,
        subscription_id: &str,
        action: &str,
        metadata: HashMap<String, String>,
    ) -> Result<ExternalSubscription, ProcessorError> {
        let path = format!("/subscriptions/{}/actions/{}", subscription_id, action);
        let body = DataEnvelope {
            data: WireActionParams { metadata },
        };
        let envelope: SubscriptionsEnvelope<WireSubscription> = self
            .execute(action, self.request(Method::POST, &path).json(&body))
            .await?;
        envelope.subscriptions.into_domain()
    }
}

#[async_trait]
impl PaymentProcessor for HttpPaymentProcessor {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<ExternalCustomer, ProcessorError> {
        let mut params = WireCustomerParams::from(request.details);
        params
            .metadata
            .insert("user_id".to_string(), request.user_id.to_string());

        let builder = self
            .request(Method::POST, "/customers")
            .header(IDEMPOTENCY_HEADER, request.idempotency_key.as_str())
            .json(&CustomersEnvelope { customers: params });

        let envelope: CustomersEnvelope<WireCustomer> =
            self.execute("create_customer", builder).await?;
        envelope.customers.into_domain()
    }

    async fn get_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<ExternalCustomer>, ProcessorError> {
        let path = format!("/customers/{}", customer_id);
        let envelope: Option<CustomersEnvelope<WireCustomer>> = self
            .execute_optional("get_customer", self.request(Method::GET, &path))
            .await?;
        envelope.map(|e| e.customers.into_domain()).transpose()
    }

    async fn update_customer(
        &self,
        customer_id: &str,
        details: CustomerDetails,
    ) -> Result<ExternalCustomer, ProcessorError> {
        let path = format!("/customers/{}", customer_id);
        let body = CustomersEnvelope {
            customers: WireCustomerParams::from(details),
        };
        let envelope: CustomersEnvelope<WireCustomer> = self
            .execute("update_customer", self.request(Method::PUT, &path).json(&body))
            .await?;
        envelope.customers.into_domain()
    }

    async fn create_redirect_flow(
        &self,
        request: CreateRedirectFlowRequest,
    ) -> Result<RedirectFlow, ProcessorError> {
        self.paid_plan(&request.plan_id)?;

        let mut metadata = HashMap::new();
        metadata.insert("plan_id".to_string(), request.plan_id.to_string());
        if let Some(customer_id) = &request.customer_id {
            metadata.insert("customer_id".to_string(), customer_id.clone());
        }

        let body = RedirectFlowsEnvelope {
            redirect_flows: WireRedirectFlowParams {
                description: request.description,
                session_token: request.session_token.clone(),
                success_redirect_url: request.success_redirect_url,
                prefilled_customer: request
                    .prefilled_email
                    .map(|email| WirePrefilledCustomer { email }),
                metadata,
            },
        };
        let builder = self
            .request(Method::POST, "/redirect_flows")
            .header(IDEMPOTENCY_HEADER, request.idempotency_key.as_str())
            .json(&body);

        let envelope: RedirectFlowsEnvelope<WireRedirectFlow> =
            self.execute("create_redirect_flow", builder).await?;
        envelope.redirect_flows.into_started(&request.session_token)
    }

    async fn complete_redirect_flow(
        &self,
        redirect_flow_id: &str,
        session_token: &str,
    ) -> Result<CompletedRedirectFlow, ProcessorError> {
        let path = format!("/redirect_flows/{}/actions/complete", redirect_flow_id);
        let body = DataEnvelope {
            data: WireCompleteFlowParams {
                session_token: session_token.to_string(),
            },
        };
        let envelope: RedirectFlowsEnvelope<WireRedirectFlow> = self
            .execute("complete_redirect_flow", self.request(Method::POST, &path).json(&body))
            .await?;
        envelope.redirect_flows.into_completed()
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<ExternalSubscription, ProcessorError> {
        let plan = self.paid_plan(&request.plan_id)?;

        let mut metadata = request.metadata;
        metadata.insert("plan_id".to_string(), plan.id.to_string());
        metadata.insert("user_id".to_string(), request.user_id.to_string());
        metadata.insert("customer_id".to_string(), request.customer_id.clone());

        let body = SubscriptionsEnvelope {
            subscriptions: WireSubscriptionParams {
                amount: plan.price_minor_units,
                currency: plan.currency.clone(),
                name: plan.name.clone(),
                interval_unit: plan.interval.as_processor_unit().to_string(),
                metadata,
                links: WireMandateLink {
                    mandate: request.mandate_id,
                },
            },
        };
        let builder = self
            .request(Method::POST, "/subscriptions")
            .header(IDEMPOTENCY_HEADER, request.idempotency_key.as_str())
            .json(&body);

        let envelope: SubscriptionsEnvelope<WireSubscription> =
            self.execute("create_subscription", builder).await?;
        envelope.subscriptions.into_domain()
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<ExternalSubscription>, ProcessorError> {
        let path = format!("/subscriptions/{}", subscription_id);
        let envelope: Option<SubscriptionsEnvelope<WireSubscription>> = self
            .execute_optional("get_subscription", self.request(Method::GET, &path))
            .await?;
        envelope.map(|e| e.subscriptions.into_domain()).transpose()
    }

    async fn update_subscription(
        &self,
        subscription_id: &str,
        update: SubscriptionUpdate,
    ) -> Result<ExternalSubscription, ProcessorError> {
        match update {
            SubscriptionUpdate::Pause => {
                self.subscription_action(subscription_id, "pause", HashMap::new())
                    .await
            }
            SubscriptionUpdate::Resume => {
                self.subscription_action(subscription_id, "resume", HashMap::new())
                    .await
            }
            SubscriptionUpdate::Metadata { metadata } => {
                let path = format!("/subscriptions/{}", subscription_id);
                let body = SubscriptionsEnvelope {
                    subscriptions: WireSubscriptionUpdate {
                        metadata: Some(metadata),
                        end_date: None,
                    },
                };
                let envelope: SubscriptionsEnvelope<WireSubscription> = self
                    .execute("update_subscription", self.request(Method::PUT, &path).json(&body))
                    .await?;
                envelope.subscriptions.into_domain()
            }
        }
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> Result<ExternalSubscription, ProcessorError> {
        if at_period_end {
            let current = self
                .get_subscription(subscription_id)
                .await?
                .ok_or_else(|| ProcessorError::not_found("subscription"))?;

            // Setting an end date lets the last scheduled charge collect; the
            // processor emits subscriptions.finished afterwards.
            if let Some(end_date) = current.next_charge_date {
                let path = format!("/subscriptions/{}", subscription_id);
                let body = SubscriptionsEnvelope {
                    subscriptions: WireSubscriptionUpdate {
                        metadata: None,
                        end_date: Some(end_date),
                    },
                };
                let envelope: SubscriptionsEnvelope<WireSubscription> = self
                    .execute("cancel_subscription", self.request(Method::PUT, &path).json(&body))
                    .await?;
                return envelope.subscriptions.into_domain();
            }
        }

        self.subscription_action(subscription_id, "cancel", HashMap::new())
            .await
    }

    async fn list_payment_methods(
        &self,
        customer_id: &str,
    ) -> Result<Vec<Mandate>, ProcessorError> {
        let builder = self
            .request(Method::GET, "/mandates")
            .query(&[("customer", customer_id)]);
        let envelope: MandatesEnvelope = self.execute("list_payment_methods", builder).await?;
        envelope
            .mandates
            .into_iter()
            .map(|m| m.into_domain())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::plan::tests::test_catalog;
    use crate::domain::foundation::UserId;
    use crate::ports::IdempotencyKey;

    const SUBSCRIPTION_BODY: &str = r#"{"subscriptions":{"id":"SB1","status":"pending_customer_approval",
        "upcoming_payments":[{"charge_date":"2024-03-01"}],
        "metadata":{"plan_id":"pro","user_id":"user-1"},"links":{"mandate":"MD1"}}}"#;

    fn processor(server: &mockito::Server) -> HttpPaymentProcessor {
        let config = HttpProcessorConfig::new(server.url(), SecretString::new("token".to_string()))
            .with_timeout(Duration::from_secs(5));
        HttpPaymentProcessor::new(config, Arc::new(test_catalog())).unwrap()
    }

    fn subscription_request(plan: &str, key: &str) -> CreateSubscriptionRequest {
        CreateSubscriptionRequest {
            user_id: UserId::new("user-1").unwrap(),
            plan_id: PlanId::new(plan),
            customer_id: "CU1".to_string(),
            mandate_id: "MD1".to_string(),
            metadata: HashMap::new(),
            idempotency_key: IdempotencyKey::from_string(key),
        }
    }

    #[tokio::test]
    async fn create_subscription_sends_plan_price_and_idempotency_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/subscriptions")
            .match_header("authorization", "Bearer token")
            .match_header("idempotency-key", "key-1")
            .match_header("api-version", DEFAULT_API_VERSION)
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"subscriptions":{"amount":1900,"currency":"GBP","interval_unit":"monthly","links":{"mandate":"MD1"}}}"#
                    .to_string(),
            ))
            .with_status(201)
            .with_body(SUBSCRIPTION_BODY)
            .create_async()
            .await;

        let sub = processor(&server)
            .create_subscription(subscription_request("pro", "key-1"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(sub.id, "SB1");
        assert_eq!(sub.plan_id.as_str(), "pro");
    }

    #[tokio::test]
    async fn unknown_plan_fails_without_any_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let err = processor(&server)
            .create_subscription(subscription_request("platinum", "key-1"))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind, ProcessorErrorKind::InvalidPlan);
    }

    #[tokio::test]
    async fn free_plan_cannot_be_subscribed_to() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let err = processor(&server)
            .create_subscription(subscription_request("free", "key-1"))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind, ProcessorErrorKind::InvalidPlan);
    }

    #[tokio::test]
    async fn rate_limit_response_is_classified() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/subscriptions")
            .with_status(429)
            .with_body(r#"{"error":{"type":"invalid_api_usage","message":"Rate limit exceeded","errors":[{"reason":"rate_limit_exceeded"}]}}"#)
            .create_async()
            .await;

        let err = processor(&server)
            .create_subscription(subscription_request("pro", "key-1"))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ProcessorErrorKind::RateLimitExceeded);
        assert_eq!(err.status_code, Some(429));
        assert!(err.raw.unwrap().contains("rate_limit_exceeded"));
    }

    #[tokio::test]
    async fn missing_subscription_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/subscriptions/SB404")
            .with_status(404)
            .with_body(r#"{"error":{"type":"invalid_api_usage","errors":[{"reason":"resource_not_found"}]}}"#)
            .create_async()
            .await;

        let result = processor(&server).get_subscription("SB404").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn immediate_cancel_posts_cancel_action() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/subscriptions/SB1/actions/cancel")
            .with_status(200)
            .with_body(SUBSCRIPTION_BODY.replace("pending_customer_approval", "cancelled"))
            .create_async()
            .await;

        let sub = processor(&server).cancel_subscription("SB1", false).await.unwrap();
        mock.assert_async().await;
        assert!(sub.status.is_ended());
    }

    #[tokio::test]
    async fn period_end_cancel_sets_end_date_to_next_charge() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/subscriptions/SB1")
            .with_status(200)
            .with_body(SUBSCRIPTION_BODY)
            .create_async()
            .await;
        let update = server
            .mock("PUT", "/subscriptions/SB1")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"subscriptions":{"end_date":"2024-03-01"}}"#.to_string(),
            ))
            .with_status(200)
            .with_body(SUBSCRIPTION_BODY)
            .create_async()
            .await;

        processor(&server).cancel_subscription("SB1", true).await.unwrap();
        update.assert_async().await;
    }

    #[tokio::test]
    async fn unreachable_host_is_retryable_network_error() {
        let token = SecretString::new("t".to_string());
        let config = HttpProcessorConfig::new("http://127.0.0.1:1", token)
            .with_timeout(Duration::from_millis(500));
        let processor = HttpPaymentProcessor::new(config, Arc::new(test_catalog())).unwrap();

        let err = processor.get_customer("CU1").await.unwrap_err();
        assert!(matches!(
            err.kind,
            ProcessorErrorKind::ServiceUnavailable | ProcessorErrorKind::Timeout
        ));
    }

    #[test]
    fn config_debug_redacts_token() {
        let token = SecretString::new("sk".to_string());
        let config = HttpProcessorConfig::new("https://x.test/", token);
        let debug = format!("{:?}", config);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("\"sk\""));
        assert_eq!(config.base_url(), "https://x.test");
    }
}
