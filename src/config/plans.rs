//! Plan catalog, compiled into the binary from `config/plans.yaml`.

use serde::Deserialize;

use super::error::ConfigError;
use crate::domain::billing::{Plan, PlanCatalog};

const PLANS_YAML: &str = include_str!("../../config/plans.yaml");

#[derive(Debug, Deserialize)]
struct PlansFile {
    plans: Vec<Plan>,
}

/// The built-in catalog.
pub fn load_plan_catalog() -> Result<PlanCatalog, ConfigError> {
    parse_plan_catalog(PLANS_YAML)
}

/// Parses a catalog from YAML with a top-level `plans` list.
pub fn parse_plan_catalog(yaml: &str) -> Result<PlanCatalog, ConfigError> {
    let file: PlansFile = serde_yaml::from_str(yaml)
        .map_err(|e| ConfigError::InvalidPlanCatalog(e.to_string()))?;
    PlanCatalog::from_plans(file.plans).map_err(|e| ConfigError::InvalidPlanCatalog(e.to_string()))
}
