//! Remediation plan, step outcome and verification types

use super::lenient;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

fn default_risk_level() -> String {
    "LOW".to_string()
}

/// One ordered step of a remediation plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// 1-based position; renumbered from order when the oracle omits it
    #[serde(rename = "step", default, deserialize_with = "lenient::loose_index")]
    pub index: usize,

    pub action: String,

    #[serde(default, deserialize_with = "lenient::optional_command")]
    pub command: Option<String>,

    #[serde(default)]
    pub expected_outcome: String,

    #[serde(default, deserialize_with = "lenient::optional_command")]
    pub rollback_command: Option<String>,

    #[serde(default = "default_risk_level")]
    pub risk_level: String,
}

impl Step {
    /// A manual step carries no command
    pub fn manual(index: usize, action: impl Into<String>) -> Self {
        Self {
            index,
            action: action.into(),
            command: None,
            expected_outcome: String::new(),
            rollback_command: None,
            risk_level: default_risk_level(),
        }
    }

    pub fn with_command(index: usize, action: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Self::manual(index, action)
        }
    }

    pub fn expecting(mut self, outcome: impl Into<String>) -> Self {
        self.expected_outcome = outcome.into();
        self
    }

    pub fn is_manual(&self) -> bool {
        self.command.is_none()
    }
}

/// Ordered steps proposed for one incident; immutable once produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RemediationPlan {
    #[serde(rename = "remediation_plan")]
    pub steps: Vec<Step>,

    #[serde(default, deserialize_with = "lenient::loose_f64")]
    pub estimated_duration_minutes: Option<f64>,

    #[serde(default, deserialize_with = "lenient::one_or_many")]
    pub prerequisites: Vec<String>,

    #[serde(default, deserialize_with = "lenient::one_or_many")]
    pub potential_side_effects: Vec<String>,

    #[serde(default, deserialize_with = "lenient::one_or_many")]
    pub success_criteria: Vec<String>,
}

impl RemediationPlan {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            ..Self::default()
        }
        .normalized()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Renumber steps 1..=n when the oracle omitted or duplicated indices
    pub fn normalized(mut self) -> Self {
        let mut seen = std::collections::HashSet::new();
        let consistent = self.steps.iter().all(|s| s.index > 0 && seen.insert(s.index));
        if !consistent {
            for (i, step) in self.steps.iter_mut().enumerate() {
                step.index = i + 1;
            }
        }
        self
    }
}

/// Outcome of executing a single step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub index: usize,
    pub action: String,
    pub command: Option<String>,
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn success(step: &Step, output: String, duration_ms: u64) -> Self {
        Self {
            index: step.index,
            action: step.action.clone(),
            command: step.command.clone(),
            success: true,
            output,
            error: None,
            duration_ms,
        }
    }

    pub fn failure(step: &Step, output: String, error: String, duration_ms: u64) -> Self {
        Self {
            index: step.index,
            action: step.action.clone(),
            command: step.command.clone(),
            success: false,
            output,
            error: Some(error),
            duration_ms,
        }
    }
}

/// What an operator should do after a remediation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Resolved,
    NeedsAttention,
    NoPlan,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Recommendation::Resolved => "RESOLVED",
            Recommendation::NeedsAttention => "NEEDS_ATTENTION",
            Recommendation::NoPlan => "NO_PLAN",
        })
    }
}

/// Pass/fail judgment over a remediation's step outcomes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub success: bool,
    pub recommendation: Recommendation,
    pub message: String,
}

impl Verification {
    /// `success` is the conjunction of every step; an empty plan never succeeds
    pub fn from_step_results(results: &[StepResult]) -> Self {
        if results.is_empty() {
            return Self {
                success: false,
                recommendation: Recommendation::NoPlan,
                message: "No remediation steps were proposed".to_string(),
            };
        }

        let failed = results.iter().filter(|r| !r.success).count();
        if failed == 0 {
            Self {
                success: true,
                recommendation: Recommendation::Resolved,
                message: format!("All {} remediation steps completed", results.len()),
            }
        } else {
            Self {
                success: false,
                recommendation: Recommendation::NeedsAttention,
                message: format!("{} of {} remediation steps failed", failed, results.len()),
            }
        }
    }
}

/// A plan, its execution and the verdict, tied to one incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Remediation {
    pub id: String,
    pub incident_id: String,
    pub plan: RemediationPlan,
    pub step_results: Vec<StepResult>,
    pub verification: Verification,
    pub created_at: DateTime<Utc>,
}

impl Remediation {
    /// Verdict derived from `step_results`
    pub fn new(id: String, incident_id: &str, plan: RemediationPlan, step_results: Vec<StepResult>) -> Self {
        let verification = Verification::from_step_results(&step_results);
        Self {
            id,
            incident_id: incident_id.to_string(),
            plan,
            step_results,
            verification,
            created_at: Utc::now(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.verification.success
    }
}
