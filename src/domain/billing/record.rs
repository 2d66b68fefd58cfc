//! The per-user billing record and its causal ordering guard.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{BillingStatus, Plan, PlanId};
use crate::domain::foundation::{StateMachine, Timestamp, UserId, ValidationError};

/// Prompt usage within the current billing cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompts_used: u64,
    /// Copied from the plan at subscription time. `-1` means unlimited.
    pub monthly_limit: i64,
    pub reset_at: Timestamp,
}

/// The single source of truth for a user's billing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBillingRecord {
    pub user_id: UserId,
    pub external_customer_id: Option<String>,
    pub external_subscription_id: Option<String>,
    pub mandate_id: Option<String>,
    pub plan_id: PlanId,
    pub status: BillingStatus,
    pub next_charge_date: Option<NaiveDate>,
    pub usage: Usage,
    /// `created_at` of the newest webhook event applied to this record.
    pub last_event_at: Option<Timestamp>,
    pub last_event_id: Option<String>,
    /// Bumped by the store on every successful write.
    pub version: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// State change a reconciliation handler applies to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationEffect {
    SetStatus(BillingStatus),
    /// A cycle's charge succeeded: the subscription is active and usage
    /// starts over.
    ConfirmPayment,
}

impl UserBillingRecord {
    /// A fresh record on the free plan, as created at signup.
    pub fn new(user_id: UserId, free_plan: &Plan, now: Timestamp) -> Self {
        Self {
            user_id,
            external_customer_id: None,
            external_subscription_id: None,
            mandate_id: None,
            plan_id: free_plan.id.clone(),
            status: BillingStatus::Free,
            next_charge_date: None,
            usage: Usage {
                prompts_used: 0,
                monthly_limit: free_plan.limits.prompts_per_month,
                reset_at: now,
            },
            last_event_at: None,
            last_event_id: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// True if an event created at `created_at` is causally newer than
    /// everything already applied. Ties are not newer.
    pub fn accepts_event_at(&self, created_at: &Timestamp) -> bool {
        match &self.last_event_at {
            None => true,
            Some(last) => last.is_before(created_at),
        }
    }

    /// Returns the record with `effect` applied and the event recorded as the
    /// newest observed. Does not check ordering; see `accepts_event_at`.
    pub fn with_event_applied(
        &self,
        effect: ReconciliationEffect,
        event_id: &str,
        created_at: Timestamp,
        now: Timestamp,
    ) -> Self {
        let mut next = self.clone();
        match effect {
            ReconciliationEffect::SetStatus(status) => next.status = status,
            ReconciliationEffect::ConfirmPayment => {
                next.status = BillingStatus::Active;
                next.usage.prompts_used = 0;
                next.usage.reset_at = now;
            }
        }
        next.last_event_at = Some(created_at);
        next.last_event_id = Some(event_id.to_string());
        next.updated_at = now;
        next
    }

    pub fn attach_customer(&mut self, customer_id: String, now: Timestamp) {
        self.external_customer_id = Some(customer_id);
        self.updated_at = now;
    }

    /// Stores the customer and mandate produced by a completed redirect flow.
    pub fn attach_mandate(&mut self, customer_id: String, mandate_id: String, now: Timestamp) {
        self.external_customer_id = Some(customer_id);
        self.mandate_id = Some(mandate_id);
        self.updated_at = now;
    }

    /// Records a newly created processor subscription. The only status write
    /// the orchestrator performs.
    pub fn begin_subscription(
        &mut self,
        subscription_id: String,
        plan: &Plan,
        next_charge_date: Option<NaiveDate>,
        now: Timestamp,
    ) -> Result<(), ValidationError> {
        self.status = self
            .status
            .transition_to(BillingStatus::PendingCustomerApproval)?;
        self.external_subscription_id = Some(subscription_id);
        self.plan_id = plan.id.clone();
        self.next_charge_date = next_charge_date;
        self.usage.monthly_limit = plan.limits.prompts_per_month;
        self.updated_at = now;
        Ok(())
    }

    pub fn has_live_subscription(&self) -> bool {
        self.status.has_live_subscription()
    }
}
