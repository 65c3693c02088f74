//! Funnel definitions: a named, ordered sequence of event steps a user must
//! complete, each optionally filtered on properties.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use super::properties::PropertyFilter;
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelStep {
    pub event_name: String,
    #[serde(default)]
    pub filter: Option<PropertyFilter>,
    /// Seconds this step must occur within after the previous step. 0 means
    /// unbounded. Ignored for the first step.
    #[serde(default)]
    pub time_window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Funnel {
    pub id: Uuid,
    pub org_id: String,
    pub project_id: String,
    pub name: String,
    pub steps: Vec<FunnelStep>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFunnel {
    pub name: String,
    pub steps: Vec<FunnelStep>,
}

/// A funnel must have 2-10 steps with unique event names — enforced at
/// creation time rather than baked into the type, since deserialized input
/// needs to surface a proper `InvalidInput` error rather than panicking.
pub fn validate_steps(steps: &[FunnelStep]) -> Result<(), AppError> {
    if steps.len() < 2 || steps.len() > 10 {
        return Err(AppError::invalid_input("a funnel must have between 2 and 10 steps"));
    }
    let mut seen = HashSet::new();
    for step in steps {
        if !seen.insert(step.event_name.as_str()) {
            return Err(AppError::invalid_input(format!(
                "duplicate step event name: {}",
                step.event_name
            )));
        }
    }
    Ok(())
}

impl Funnel {
    pub fn new(org_id: impl Into<String>, project_id: impl Into<String>, new: NewFunnel) -> Result<Self, AppError> {
        validate_steps(&new.steps)?;
        Ok(Self {
            id: Uuid::new_v4(),
            org_id: org_id.into(),
            project_id: project_id.into(),
            name: new.name,
            steps: new.steps,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str) -> FunnelStep {
        FunnelStep { event_name: name.to_string(), filter: None, time_window_secs: 0 }
    }

    #[test]
    fn rejects_single_step_funnel() {
        assert!(validate_steps(&[step("signup")]).is_err());
    }

    #[test]
    fn rejects_duplicate_step_names() {
        assert!(validate_steps(&[step("signup"), step("signup")]).is_err());
    }

    #[test]
    fn accepts_well_formed_funnel() {
        assert!(validate_steps(&[step("signup"), step("purchase")]).is_ok());
    }
}
