//! Prompt quota for a billing record.

use serde::Serialize;

use super::{BillingStatus, PlanCatalog, PlanId, UserBillingRecord};
use crate::domain::foundation::{Timestamp, ValidationError};

/// Length of a usage cycle for records without a live subscription. Paid
/// cycles restart on each confirmed payment instead.
pub const FREE_USAGE_PERIOD_DAYS: i64 = 30;

/// What a user may still do this cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptAllowance {
    /// Plan whose limits apply. Free for users without a live subscription.
    pub plan_id: PlanId,
    pub status: BillingStatus,
    pub allowed: bool,
    pub used: u64,
    /// `None` means unlimited.
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub resets_at: Option<Timestamp>,
}

impl PromptAllowance {
    pub fn for_record(record: &UserBillingRecord, catalog: &PlanCatalog, now: Timestamp) -> Self {
        let (plan_id, limit) = if record.has_live_subscription() {
            let limit = catalog
                .get(&record.plan_id)
                .map(|plan| plan.limits.prompts_per_month)
                .unwrap_or(record.usage.monthly_limit);
            (record.plan_id.clone(), limit)
        } else {
            let free = catalog.free_plan();
            (free.id.clone(), free.limits.prompts_per_month)
        };
        let limit = u64::try_from(limit).ok();

        let (used, resets_at) = if record.has_live_subscription() {
            (record.usage.prompts_used, None)
        } else if free_cycle_lapsed(record, now) {
            (0, Some(now.add_days(FREE_USAGE_PERIOD_DAYS)))
        } else {
            (
                record.usage.prompts_used,
                Some(record.usage.reset_at.add_days(FREE_USAGE_PERIOD_DAYS)),
            )
        };

        let remaining = limit.map(|limit| limit.saturating_sub(used));
        Self {
            plan_id,
            status: record.status,
            allowed: remaining.map_or(true, |r| r > 0),
            used,
            limit,
            remaining,
            resets_at,
        }
    }
}

impl UserBillingRecord {
    /// Returns the record with one more prompt counted, or an error if the
    /// allowance is spent. A lapsed free cycle starts over first.
    pub fn with_prompt_used(
        &self,
        catalog: &PlanCatalog,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        let allowance = PromptAllowance::for_record(self, catalog, now);
        if !allowance.allowed {
            return Err(ValidationError::invalid_format(
                "prompts",
                "monthly prompt limit reached",
            ));
        }

        let mut next = self.clone();
        if !self.has_live_subscription() && free_cycle_lapsed(self, now) {
            next.usage.prompts_used = 0;
            next.usage.reset_at = now;
        }
        next.usage.prompts_used += 1;
        next.updated_at = now;
        Ok(next)
    }
}

fn free_cycle_lapsed(record: &UserBillingRecord, now: Timestamp) -> bool {
    !now.is_before(&record.usage.reset_at.add_days(FREE_USAGE_PERIOD_DAYS))
}
