//! Incident and classification types
//!
//! A `Classification` is what the oracle reports about the current window;
//! each of its failures becomes an `Incident` owned by the record store.

use super::lenient;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Incident severity, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[serde(alias = "critical", alias = "Critical")]
    Critical,
    #[serde(alias = "high", alias = "High")]
    High,
    #[serde(alias = "medium", alias = "Medium")]
    Medium,
    #[serde(alias = "low", alias = "Low")]
    Low,
}

impl Severity {
    /// Only these severities ever bring a remediation into existence
    pub fn is_actionable(&self) -> bool {
        matches!(self, Severity::Critical | Severity::High)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Medium
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incident lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IncidentStatus {
    Active,
    Resolved,
}

fn unknown_failure_type() -> String {
    "UNKNOWN".to_string()
}

/// One failure the oracle believes is happening now
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    #[serde(rename = "type", default = "unknown_failure_type")]
    pub failure_type: String,

    #[serde(default)]
    pub severity: Severity,

    #[serde(default)]
    pub affected_components: BTreeSet<String>,

    #[serde(default, deserialize_with = "lenient::one_or_many")]
    pub evidence: Vec<String>,

    #[serde(default, deserialize_with = "lenient::loose_f64")]
    pub confidence: Option<f64>,
}

/// A failure the oracle predicts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FutureRisk {
    #[serde(default = "unknown_failure_type")]
    pub risk_type: String,

    #[serde(default, deserialize_with = "lenient::loose_f64")]
    pub probability: Option<f64>,

    #[serde(default)]
    pub time_to_failure: Option<String>,

    #[serde(default, deserialize_with = "lenient::one_or_many")]
    pub preventive_actions: Vec<String>,
}

/// Oracle verdict over one detection snapshot
///
/// `current_failures` and `trigger_remediation` are required; everything
/// else defaults so that partial answers still parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub current_failures: Vec<FailureReport>,

    #[serde(default)]
    pub future_risks: Vec<FutureRisk>,

    #[serde(default)]
    pub root_cause_analysis: Option<String>,

    pub trigger_remediation: bool,

    #[serde(default, deserialize_with = "lenient::loose_f64")]
    pub confidence_score: Option<f64>,
}

impl Classification {
    /// The degraded default used whenever the oracle cannot be trusted
    pub fn empty() -> Self {
        Self {
            current_failures: Vec::new(),
            future_risks: Vec::new(),
            root_cause_analysis: None,
            trigger_remediation: false,
            confidence_score: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.current_failures.is_empty() && self.future_risks.is_empty() && !self.trigger_remediation
    }

    /// Failures that may be remediated this cycle
    pub fn actionable(&self) -> impl Iterator<Item = &FailureReport> {
        self.current_failures.iter().filter(|f| f.severity.is_actionable())
    }

    /// Remediation runs only when the oracle asks for it and something is actionable
    pub fn should_remediate(&self) -> bool {
        self.trigger_remediation && self.actionable().next().is_some()
    }
}

/// A detected failure tracked across its lifetime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub incident_type: String,
    pub severity: Severity,
    pub affected_components: BTreeSet<String>,
    pub evidence: Vec<String>,
    pub status: IncidentStatus,
    pub root_cause: Option<String>,
}

impl Incident {
    pub fn from_failure(failure: &FailureReport, root_cause: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            incident_type: failure.failure_type.clone(),
            severity: failure.severity,
            affected_components: failure.affected_components.clone(),
            evidence: failure.evidence.clone(),
            status: IncidentStatus::Active,
            root_cause,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == IncidentStatus::Active
    }

    /// Mark resolved; only a successful verification may call this
    pub fn resolve(&mut self) {
        self.status = IncidentStatus::Resolved;
    }

    /// Short single-line label for logs
    pub fn label(&self) -> String {
        if self.affected_components.is_empty() {
            format!("{} [{}]", self.incident_type, self.severity)
        } else {
            let components: Vec<&str> = self.affected_components.iter().map(String::as_str).collect();
            format!("{} [{}] on {}", self.incident_type, self.severity, components.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parsing_is_case_tolerant() {
        let s: Severity = serde_json::from_str("\"CRITICAL\"").unwrap();
        assert_eq!(s, Severity::Critical);
        let s: Severity = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(s, Severity::High);
        assert!(serde_json::from_str::<Severity>("\"catastrophic\"").is_err());
    }

    #[test]
    fn test_actionable_severities() {
        assert!(Severity::Critical.is_actionable());
        assert!(Severity::High.is_actionable());
        assert!(!Severity::Medium.is_actionable());
        assert!(!Severity::Low.is_actionable());
    }

    #[test]
    fn test_failure_defaults() {
        let f: FailureReport = serde_json::from_str("{}").unwrap();
        assert_eq!(f.failure_type, "UNKNOWN");
        assert_eq!(f.severity, Severity::Medium);
        assert!(f.affected_components.is_empty());
    }

    #[test]
    fn test_classification_requires_trigger() {
        let missing = r#"{"current_failures": []}"#;
        assert!(serde_json::from_str::<Classification>(missing).is_err());

        let ok = r#"{"current_failures": [], "trigger_remediation": false}"#;
        let c: Classification = serde_json::from_str(ok).unwrap();
        assert!(c.is_empty());
    }

    #[test]
    fn test_should_remediate_needs_actionable_failure() {
        let mut c = Classification::empty();
        c.trigger_remediation = true;
        c.current_failures.push(FailureReport {
            failure_type: "Disk Pressure".into(),
            severity: Severity::Medium,
            affected_components: BTreeSet::new(),
            evidence: vec![],
            confidence: None,
        });
        assert!(!c.should_remediate());

        c.current_failures[0].severity = Severity::High;
        assert!(c.should_remediate());

        c.trigger_remediation = false;
        assert!(!c.should_remediate());
    }

    #[test]
    fn test_incident_from_failure() {
        let failure = FailureReport {
            failure_type: "Service Crash".into(),
            severity: Severity::Critical,
            affected_components: ["web-api".to_string()].into_iter().collect(),
            evidence: vec!["web-api marked DOWN".into()],
            confidence: Some(0.9),
        };
        let mut incident = Incident::from_failure(&failure, None);
        assert!(incident.is_active());
        assert_eq!(incident.label(), "Service Crash [CRITICAL] on web-api");
        incident.resolve();
        assert_eq!(incident.status, IncidentStatus::Resolved);
    }
}
