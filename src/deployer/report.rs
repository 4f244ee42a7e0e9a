//! # Run Report
//!
//! Structured result of a deployment run: one record per step, in order,
//! plus the access instructions shown at the end.

use crate::constants::{ACCESS_PORT_FORWARD_HINT, ACCESS_URL};
use crate::observability::metrics;
use std::fmt;

/// How a non-fatal step ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    /// Failed, but the run carried on
    Warned(String),
    Skipped,
}

impl StepOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            StepOutcome::Succeeded => "succeeded",
            StepOutcome::Warned(_) => "warned",
            StepOutcome::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub step: &'static str,
    pub outcome: StepOutcome,
}

/// How to reach ArgoCD once the run is over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessInstructions {
    pub port_forward: String,
    pub url: String,
    /// Applications deployed by this run
    pub applications: Vec<String>,
}

impl AccessInstructions {
    pub fn new(applications: Vec<String>) -> Self {
        Self {
            port_forward: ACCESS_PORT_FORWARD_HINT.to_string(),
            url: ACCESS_URL.to_string(),
            applications,
        }
    }
}

impl fmt::Display for AccessInstructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Access ArgoCD with: {}", self.port_forward)?;
        write!(f, "Then open {}", self.url)?;
        if !self.applications.is_empty() {
            write!(f, "\nDeployed applications: {}", self.applications.join(", "))?;
        }
        Ok(())
    }
}

/// Ordered record of a successful run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub steps: Vec<StepRecord>,
    pub access: Option<AccessInstructions>,
}

impl RunReport {
    /// Append a step record and count its outcome
    pub fn record(&mut self, step: &'static str, outcome: StepOutcome) {
        metrics::increment_step_outcome(step, outcome.label());
        self.steps.push(StepRecord { step, outcome });
    }

    pub fn outcome(&self, step: &str) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|record| record.step == step)
            .map(|record| &record.outcome)
    }

    pub fn warnings(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.steps.iter().filter_map(|record| match &record.outcome {
            StepOutcome::Warned(reason) => Some((record.step, reason.as_str())),
            _ => None,
        })
    }
}
