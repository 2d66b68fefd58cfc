//! Plan catalog.
//!
//! Plans are loaded once from static configuration and never mutated at
//! runtime. Every component that needs price or limit data looks it up here.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::ValidationError;

/// Identifier of a plan in the catalog (e.g. `"pro"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(String);

impl PlanId {
    /// Id of the plan every user starts on.
    pub const FREE: &'static str = "free";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn free() -> Self {
        Self(Self::FREE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_free(&self) -> bool {
        self.0 == Self::FREE
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Billing interval of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanInterval {
    Monthly,
    Yearly,
}

impl PlanInterval {
    /// Interval unit as the processor spells it.
    pub fn as_processor_unit(&self) -> &'static str {
        match self {
            PlanInterval::Monthly => "monthly",
            PlanInterval::Yearly => "yearly",
        }
    }
}

/// Feature limits granted by a plan.
///
/// `-1` in `prompts_per_month` or `saved_prompts` means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub prompts_per_month: i64,
    pub api_calls_per_minute: u32,
    pub saved_prompts: i64,
    pub priority_support: bool,
}

impl PlanLimits {
    /// Sentinel for "no limit".
    pub const UNLIMITED: i64 = -1;

    /// Monthly prompt allowance, `None` when unlimited.
    pub fn prompt_limit(&self) -> Option<u64> {
        if self.prompts_per_month == Self::UNLIMITED {
            None
        } else {
            Some(self.prompts_per_month.max(0) as u64)
        }
    }
}

/// A purchasable plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub price_minor_units: i64,
    pub currency: String,
    pub interval: PlanInterval,
    pub limits: PlanLimits,
}

impl Plan {
    /// True for plans that are charged through the processor.
    pub fn is_paid(&self) -> bool {
        self.price_minor_units > 0
    }
}

/// Immutable lookup of plan id to plan.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: HashMap<PlanId, Plan>,
}

impl PlanCatalog {
    /// Builds a catalog, enforcing exactly one plan per id and the presence of
    /// the `free` plan.
    pub fn from_plans(plans: Vec<Plan>) -> Result<Self, ValidationError> {
        let mut by_id = HashMap::with_capacity(plans.len());
        for plan in plans {
            if plan.id.as_str().trim().is_empty() {
                return Err(ValidationError::empty_field("plan.id"));
            }
            if plan.limits.prompts_per_month < PlanLimits::UNLIMITED {
                return Err(ValidationError::invalid_format(
                    "plan.limits.prompts_per_month",
                    format!("{} is below -1", plan.limits.prompts_per_month),
                ));
            }
            if by_id.contains_key(&plan.id) {
                return Err(ValidationError::invalid_format(
                    "plan.id",
                    format!("duplicate plan id '{}'", plan.id),
                ));
            }
            by_id.insert(plan.id.clone(), plan);
        }
        if !by_id.contains_key(&PlanId::free()) {
            return Err(ValidationError::unknown("plan", PlanId::FREE));
        }
        Ok(Self { plans: by_id })
    }

    /// Looks up a plan by id.
    pub fn get(&self, id: &PlanId) -> Option<&Plan> {
        self.plans.get(id)
    }

    /// Looks up a plan, failing with a validation error if unknown.
    pub fn require(&self, id: &PlanId) -> Result<&Plan, ValidationError> {
        self.get(id)
            .ok_or_else(|| ValidationError::unknown("plan", id.as_str()))
    }

    /// Looks up a plan that can be subscribed to through the processor.
    pub fn require_paid(&self, id: &PlanId) -> Result<&Plan, ValidationError> {
        let plan = self.require(id)?;
        if !plan.is_paid() {
            return Err(ValidationError::invalid_format(
                "plan_id",
                format!("plan '{}' is not billable", id),
            ));
        }
        Ok(plan)
    }

    /// The plan every record falls back to.
    pub fn free_plan(&self) -> &Plan {
        // Presence is checked in `from_plans`.
        &self.plans[&PlanId::free()]
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// All plans, sorted by price.
    pub fn plans(&self) -> Vec<&Plan> {
        let mut plans: Vec<&Plan> = self.plans.values().collect();
        plans.sort_by_key(|p| (p.price_minor_units, p.id.clone()));
        plans
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn plan(id: &str, price: i64, prompts: i64) -> Plan {
        Plan {
            id: PlanId::new(id),
            name: id.to_uppercase(),
            price_minor_units: price,
            currency: "GBP".to_string(),
            interval: PlanInterval::Monthly,
            limits: PlanLimits {
                prompts_per_month: prompts,
                api_calls_per_minute: 60,
                saved_prompts: 100,
                priority_support: false,
            },
        }
    }

    pub(crate) fn test_catalog() -> PlanCatalog {
        PlanCatalog::from_plans(vec![
            plan("free", 0, 20),
            plan("pro", 1900, 500),
            plan("unlimited", 4900, -1),
        ])
        .unwrap()
    }

    #[test]
    fn duplicate_plan_ids_are_rejected() {
        let result = PlanCatalog::from_plans(vec![plan("free", 0, 20), plan("free", 0, 30)]);
        assert!(result.is_err());
    }

    #[test]
    fn catalog_requires_free_plan() {
        let result = PlanCatalog::from_plans(vec![plan("pro", 1900, 500)]);
        assert!(matches!(result, Err(ValidationError::Unknown { .. })));
    }

    #[test]
    fn require_unknown_plan_fails() {
        let catalog = test_catalog();
        assert!(catalog.require(&PlanId::new("nonexistent-plan")).is_err());
    }

    #[test]
    fn free_plan_is_not_billable() {
        let catalog = test_catalog();
        assert!(catalog.require_paid(&PlanId::free()).is_err());
        assert!(catalog.require_paid(&PlanId::new("pro")).is_ok());
    }

    #[test]
    fn minus_one_means_unlimited_prompts() {
        let catalog = test_catalog();
        let unlimited = catalog.require(&PlanId::new("unlimited")).unwrap();
        assert_eq!(unlimited.limits.prompt_limit(), None);
        assert_eq!(catalog.free_plan().limits.prompt_limit(), Some(20));
    }

    #[test]
    fn limits_below_minus_one_are_rejected() {
        let result = PlanCatalog::from_plans(vec![plan("free", 0, -5)]);
        assert!(result.is_err());
    }

    #[test]
    fn plans_are_sorted_by_price() {
        let catalog = test_catalog();
        let ids: Vec<&str> = catalog.plans().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["free", "pro", "unlimited"]);
    }
}
