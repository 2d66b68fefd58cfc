//! Decoded webhook envelope.
//!
//! The processor posts `{"events": [...]}`. Each event names a resource type
//! and an action; together they select the reconciliation handler.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

/// An ordered batch of events from one delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    pub events: Vec<WebhookEvent>,
}

impl EventBatch {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Foreign keys carried by an event. Existence is not checked at parse time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mandate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<String>,
}

/// Processor-supplied explanation of why the event happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDetails {
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub cause: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A single state-change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    pub created_at: Timestamp,
    pub resource_type: String,
    pub action: String,
    #[serde(default)]
    pub links: EventLinks,
    #[serde(default)]
    pub details: Option<EventDetails>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl WebhookEvent {
    /// Dispatch key, `None` for combinations this crate does not handle.
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_key(&self.resource_type, &self.action)
    }

    /// `resource_type.action`, for logs.
    pub fn key(&self) -> String {
        format!("{}.{}", self.resource_type, self.action)
    }
}

/// Every (resource type, action) pair with a reconciliation handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    SubscriptionCreated,
    SubscriptionCancelled,
    SubscriptionFinished,
    SubscriptionPaused,
    SubscriptionResumed,
    PaymentConfirmed,
    PaymentFailed,
    PaymentCancelled,
    MandateActive,
    MandateCancelled,
    CustomerCreated,
    CustomerUpdated,
}

impl EventKind {
    pub const ALL: [EventKind; 12] = [
        EventKind::SubscriptionCreated,
        EventKind::SubscriptionCancelled,
        EventKind::SubscriptionFinished,
        EventKind::SubscriptionPaused,
        EventKind::SubscriptionResumed,
        EventKind::PaymentConfirmed,
        EventKind::PaymentFailed,
        EventKind::PaymentCancelled,
        EventKind::MandateActive,
        EventKind::MandateCancelled,
        EventKind::CustomerCreated,
        EventKind::CustomerUpdated,
    ];

    pub fn from_key(resource_type: &str, action: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.key() == (resource_type, action))
    }

    pub fn key(&self) -> (&'static str, &'static str) {
        match self {
            EventKind::SubscriptionCreated => ("subscriptions", "created"),
            EventKind::SubscriptionCancelled => ("subscriptions", "cancelled"),
            EventKind::SubscriptionFinished => ("subscriptions", "finished"),
            EventKind::SubscriptionPaused => ("subscriptions", "paused"),
            EventKind::SubscriptionResumed => ("subscriptions", "resumed"),
            EventKind::PaymentConfirmed => ("payments", "confirmed"),
            EventKind::PaymentFailed => ("payments", "failed"),
            EventKind::PaymentCancelled => ("payments", "cancelled"),
            EventKind::MandateActive => ("mandates", "active"),
            EventKind::MandateCancelled => ("mandates", "cancelled"),
            EventKind::CustomerCreated => ("customers", "created"),
            EventKind::CustomerUpdated => ("customers", "updated"),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (resource, action) = self.key();
        write!(f, "{}.{}", resource, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_round_trips_through_its_key() {
        for kind in EventKind::ALL {
            let (resource, action) = kind.key();
            assert_eq!(EventKind::from_key(resource, action), Some(kind));
        }
    }

    #[test]
    fn unknown_pairs_have_no_kind() {
        assert_eq!(EventKind::from_key("refunds", "created"), None);
        assert_eq!(EventKind::from_key("subscriptions", "amended"), None);
    }

    #[test]
    fn event_decodes_with_optional_fields_missing() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{"id":"EV1","created_at":"2024-01-15T10:30:00.000Z","resource_type":"mandates","action":"active"}"#,
        )
        .unwrap();
        assert_eq!(event.kind(), Some(EventKind::MandateActive));
        assert_eq!(event.links, EventLinks::default());
        assert!(event.metadata.is_empty());
        assert_eq!(event.key(), "mandates.active");
    }

    #[test]
    fn display_uses_dotted_key() {
        assert_eq!(EventKind::PaymentConfirmed.to_string(), "payments.confirmed");
    }
}
