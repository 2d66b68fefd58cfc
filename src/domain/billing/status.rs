//! Billing status state machine.
//!
//! The orchestrator consults these transitions before initiating a
//! processor call. Webhook-driven writes set the status the processor
//! reports and are guarded by event ordering instead.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{StateMachine, ValidationError};

/// Status of a user's billing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    /// No paid subscription. Initial state.
    Free,

    /// Subscription created at the processor, waiting on mandate approval.
    PendingCustomerApproval,

    /// Subscription is being charged.
    Active,

    /// Subscription cancelled by the user or the processor.
    Cancelled,

    /// Subscription reached its end date.
    Finished,

    /// Charging suspended; may be resumed.
    Paused,
}

impl BillingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingStatus::Free => "free",
            BillingStatus::PendingCustomerApproval => "pending_customer_approval",
            BillingStatus::Active => "active",
            BillingStatus::Cancelled => "cancelled",
            BillingStatus::Finished => "finished",
            BillingStatus::Paused => "paused",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "free" => Ok(BillingStatus::Free),
            "pending_customer_approval" => Ok(BillingStatus::PendingCustomerApproval),
            "active" => Ok(BillingStatus::Active),
            "cancelled" => Ok(BillingStatus::Cancelled),
            "finished" => Ok(BillingStatus::Finished),
            "paused" => Ok(BillingStatus::Paused),
            other => Err(ValidationError::unknown("billing_status", other)),
        }
    }

    /// True while a processor subscription exists and has not ended.
    ///
    /// A user in one of these states cannot start another subscription and
    /// keeps the limits of their paid plan.
    pub fn has_live_subscription(&self) -> bool {
        matches!(
            self,
            BillingStatus::PendingCustomerApproval | BillingStatus::Active | BillingStatus::Paused
        )
    }
}

impl std::fmt::Display for BillingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StateMachine for BillingStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use BillingStatus::*;
        matches!(
            (self, target),
            (Free, PendingCustomerApproval)
                | (PendingCustomerApproval, Active)
                | (PendingCustomerApproval, Cancelled)
                | (Active, Cancelled)
                | (Active, Finished)
                | (Active, Paused)
                | (Paused, Active)
                | (Paused, Cancelled)
            // Resubscribe after the previous subscription ended
                | (Cancelled, PendingCustomerApproval)
                | (Finished, PendingCustomerApproval)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use BillingStatus::*;
        match self {
            Free => vec![PendingCustomerApproval],
            PendingCustomerApproval => vec![Active, Cancelled],
            Active => vec![Cancelled, Finished, Paused],
            Paused => vec![Active, Cancelled],
            Cancelled => vec![PendingCustomerApproval],
            Finished => vec![PendingCustomerApproval],
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, BillingStatus::Cancelled | BillingStatus::Finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_moves_to_pending_approval() {
        let result = BillingStatus::Free.transition_to(BillingStatus::PendingCustomerApproval);
        assert_eq!(result, Ok(BillingStatus::PendingCustomerApproval));
    }

    #[test]
    fn free_cannot_jump_to_active() {
        assert!(BillingStatus::Free.transition_to(BillingStatus::Active).is_err());
    }

    #[test]
    fn active_can_pause_and_paused_can_resume() {
        assert!(BillingStatus::Active.can_transition_to(&BillingStatus::Paused));
        assert!(BillingStatus::Paused.can_transition_to(&BillingStatus::Active));
    }

    #[test]
    fn cancelled_cannot_be_cancelled_again() {
        assert!(!BillingStatus::Cancelled.can_transition_to(&BillingStatus::Cancelled));
    }

    #[test]
    fn cancelled_and_finished_are_terminal() {
        assert!(BillingStatus::Cancelled.is_terminal());
        assert!(BillingStatus::Finished.is_terminal());
        assert!(!BillingStatus::Paused.is_terminal());
        assert!(!BillingStatus::Free.is_terminal());
    }

    #[test]
    fn terminal_states_allow_resubscribe() {
        let pending = BillingStatus::PendingCustomerApproval;
        assert!(BillingStatus::Finished.can_transition_to(&pending));
        assert!(BillingStatus::Cancelled.can_transition_to(&pending));
    }

    #[test]
    fn valid_transitions_agree_with_can_transition_to() {
        use BillingStatus::*;
        let all = [Free, PendingCustomerApproval, Active, Cancelled, Finished, Paused];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(&to),
                    from.valid_transitions().contains(&to),
                    "{from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn live_subscription_states() {
        assert!(BillingStatus::PendingCustomerApproval.has_live_subscription());
        assert!(BillingStatus::Paused.has_live_subscription());
        assert!(!BillingStatus::Free.has_live_subscription());
        assert!(!BillingStatus::Finished.has_live_subscription());
    }

    #[test]
    fn parse_round_trips_every_status() {
        use BillingStatus::*;
        for status in [Free, PendingCustomerApproval, Active, Cancelled, Finished, Paused] {
            assert_eq!(BillingStatus::parse(status.as_str()), Ok(status));
        }
        assert!(BillingStatus::parse("past_due").is_err());
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&BillingStatus::PendingCustomerApproval).unwrap();
        assert_eq!(json, "\"pending_customer_approval\"");
    }
}
