//! Offline, deterministic oracle
//!
//! Reads the JSON embedded in the prompt and answers with rule-based
//! classifications and plans. Used when no model server is configured and
//! as the reference backend in tests.

use super::client::OracleClient;
use super::prompts::{embedded_json, AgentTag, OracleRequest, INCIDENT_MARKER, SNAPSHOT_MARKER};
use crate::errors::{HealError, Result};
use crate::health::analyzer::RESOURCE_THRESHOLD;
use crate::health::{HealthReport, HealthStatus, ServiceMap, ServiceStatus};
use crate::types::{Classification, FailureReport, FutureRisk, RemediationPlan, Severity, Step};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeSet;

/// Resource usage above which a saturation is HIGH rather than MEDIUM
const SEVERE_RESOURCE: f64 = 95.0;

/// Memory usage that starts a resource-exhaustion forecast
const MEMORY_RISK: f64 = 70.0;

#[derive(Debug, Deserialize)]
struct SnapshotView {
    system_health: HealthReport,
    #[serde(default)]
    service_status: ServiceMap,
}

#[derive(Debug, Deserialize)]
struct IncidentView {
    #[serde(rename = "type")]
    incident_type: String,
    #[serde(default)]
    affected_components: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct HeuristicOracle;

impl HeuristicOracle {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(health: &HealthReport, services: &ServiceMap) -> Classification {
        let mut failures = Vec::new();

        for (service, status) in services {
            match status {
                ServiceStatus::Down => failures.push(failure(
                    "Service Crash",
                    Severity::Critical,
                    service,
                    format!("{} marked DOWN by service probe", service),
                    0.9,
                )),
                ServiceStatus::Degraded => failures.push(failure(
                    "Service Degradation",
                    Severity::High,
                    service,
                    format!("{} logged more than 5 error lines in the window", service),
                    0.75,
                )),
                ServiceStatus::Up => {}
            }
        }

        if failures.is_empty() {
            match health.status {
                HealthStatus::Critical => failures.push(failure(
                    "Error Storm",
                    Severity::High,
                    "application",
                    format!("{} error lines in the last {} events", health.error_count, health.window),
                    0.8,
                )),
                HealthStatus::Degraded => failures.push(failure(
                    "Elevated Error Rate",
                    Severity::Medium,
                    "application",
                    format!(
                        "{} errors and {} warnings in the last {} events",
                        health.error_count, health.warning_count, health.window
                    ),
                    0.6,
                )),
                _ => {}
            }
        }

        if health.cpu > RESOURCE_THRESHOLD {
            failures.push(failure(
                "CPU Saturation",
                if health.cpu > SEVERE_RESOURCE { Severity::High } else { Severity::Medium },
                "host",
                format!("CPU utilisation peaked at {:.1}%", health.cpu),
                0.7,
            ));
        }
        if health.memory > RESOURCE_THRESHOLD {
            failures.push(failure(
                "Memory Leak",
                if health.memory > SEVERE_RESOURCE { Severity::High } else { Severity::Medium },
                "host",
                format!("Memory utilisation peaked at {:.1}%", health.memory),
                0.7,
            ));
        }

        let mut future_risks = Vec::new();
        if health.memory > MEMORY_RISK {
            future_risks.push(FutureRisk {
                risk_type: "Resource Exhaustion".to_string(),
                probability: Some((health.memory / 100.0).min(1.0)),
                time_to_failure: Some("hours".to_string()),
                preventive_actions: vec!["Investigate memory growth".to_string()],
            });
        }

        let trigger_remediation = failures.iter().any(|f| f.severity.is_actionable());
        let root_cause_analysis = failures
            .first()
            .map(|f| format!("Primary signal: {}", f.evidence.join("; ")));
        let confidence_score = if failures.is_empty() { 0.95 } else { 0.8 };

        Classification {
            current_failures: failures,
            future_risks,
            root_cause_analysis,
            trigger_remediation,
            confidence_score: Some(confidence_score),
        }
    }

    pub fn plan(incident_type: &str, components: &BTreeSet<String>) -> RemediationPlan {
        let kind = incident_type.to_ascii_lowercase();
        let targets: Vec<&str> = if components.is_empty() {
            vec!["application"]
        } else {
            components.iter().map(String::as_str).collect()
        };

        let mut steps = Vec::new();
        if kind.contains("crash") || kind.contains("degradation") {
            for target in &targets {
                steps.push(
                    Step::with_command(0, format!("Restart {}", target), format!("systemctl restart {}", target))
                        .expecting(format!("{} is running", target)),
                );
                steps.push(
                    Step::with_command(0, format!("Confirm {} is active", target), format!("systemctl is-active {}", target))
                        .expecting("active"),
                );
            }
        } else if kind.contains("cpu") {
            steps.push(
                Step::with_command(0, "Terminate runaway CPU workers", "pkill -f cpu-burn")
                    .expecting("CPU utilisation drops below 85%"),
            );
            steps.push(Step::with_command(0, "Check load average", "uptime").expecting("load average falling"));
        } else if kind.contains("memory") {
            for target in &targets {
                steps.push(
                    Step::with_command(0, format!("Restart {} to release memory", target), format!("systemctl restart {}", target))
                        .expecting("memory utilisation drops"),
                );
            }
            steps.push(Step::with_command(0, "Check free memory", "free -m").expecting("memory available"));
        } else if kind.contains("disk") {
            steps.push(
                Step::with_command(0, "Remove filler files", "rm -f ./logs/disk_filler_*.tmp")
                    .expecting("disk space reclaimed"),
            );
            steps.push(Step::with_command(0, "Check disk usage", "df -h").expecting("usage below 85%"));
        } else if kind.contains("error") {
            steps.push(Step::manual(0, "Review error signatures in recent logs"));
            for target in &targets {
                steps.push(
                    Step::with_command(0, format!("Restart {}", target), format!("systemctl restart {}", target))
                        .expecting("error rate returns to baseline"),
                );
            }
        } else {
            steps.push(Step::manual(0, format!("Escalate {} to the on-call engineer", incident_type)));
        }

        let mut plan = RemediationPlan::new(steps);
        plan.estimated_duration_minutes = Some(5.0);
        plan.success_criteria = vec!["All affected components report healthy".to_string()];
        plan
    }
}

fn failure(kind: &str, severity: Severity, component: &str, evidence: String, confidence: f64) -> FailureReport {
    FailureReport {
        failure_type: kind.to_string(),
        severity,
        affected_components: [component.to_string()].into_iter().collect(),
        evidence: vec![evidence],
        confidence: Some(confidence),
    }
}

#[async_trait]
impl OracleClient for HeuristicOracle {
    fn model(&self) -> &str {
        "heuristic"
    }

    async fn complete(&self, request: &OracleRequest) -> Result<String> {
        let missing = |what: &str| HealError::OracleParse {
            reason: format!("prompt carries no {}", what),
            raw: String::new(),
        };

        let answer = match request.tag {
            AgentTag::Detection => {
                let value = embedded_json(&request.prompt, SNAPSHOT_MARKER).ok_or_else(|| missing("snapshot"))?;
                let view: SnapshotView = serde_json::from_value(value)?;
                serde_json::to_string(&Self::classify(&view.system_health, &view.service_status))?
            }
            AgentTag::Remediation => {
                let value = embedded_json(&request.prompt, INCIDENT_MARKER).ok_or_else(|| missing("incident"))?;
                let view: IncidentView = serde_json::from_value(value)?;
                serde_json::to_string(&Self::plan(&view.incident_type, &view.affected_components))?
            }
        };
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health(status: HealthStatus, errors: usize) -> HealthReport {
        HealthReport {
            status,
            error_count: errors,
            warning_count: 0,
            cpu: 0.0,
            memory: 0.0,
            window: errors,
        }
    }

    fn services(down: &[&str]) -> ServiceMap {
        ["web-api", "auth-service", "database", "cache", "worker-queue"]
            .iter()
            .map(|s| {
                let status = if down.contains(s) { ServiceStatus::Down } else { ServiceStatus::Up };
                (s.to_string(), status)
            })
            .collect()
    }

    #[test]
    fn test_down_service_is_critical_crash() {
        let c = HeuristicOracle::classify(&health(HealthStatus::Healthy, 1), &services(&["web-api"]));
        assert_eq!(c.current_failures.len(), 1);
        let f = &c.current_failures[0];
        assert_eq!(f.severity, Severity::Critical);
        assert!(f.affected_components.contains("web-api"));
        assert!(c.trigger_remediation);
    }

    #[test]
    fn test_quiet_system_has_no_failures() {
        let c = HeuristicOracle::classify(&health(HealthStatus::Healthy, 0), &services(&[]));
        assert!(c.current_failures.is_empty());
        assert!(!c.trigger_remediation);
    }

    #[test]
    fn test_storm_without_service_signal_is_high() {
        let c = HeuristicOracle::classify(&health(HealthStatus::Critical, 50), &services(&[]));
        assert_eq!(c.current_failures[0].failure_type, "Error Storm");
        assert_eq!(c.current_failures[0].severity, Severity::High);
        assert!(c.trigger_remediation);
    }

    #[test]
    fn test_degraded_system_is_medium_and_not_triggered() {
        let c = HeuristicOracle::classify(&health(HealthStatus::Degraded, 7), &services(&[]));
        assert_eq!(c.current_failures[0].severity, Severity::Medium);
        assert!(!c.trigger_remediation);
    }

    #[test]
    fn test_cpu_saturation_severity() {
        let mut h = health(HealthStatus::Warning, 0);
        h.cpu = 99.0;
        let c = HeuristicOracle::classify(&h, &services(&[]));
        assert_eq!(c.current_failures[0].failure_type, "CPU Saturation");
        assert_eq!(c.current_failures[0].severity, Severity::High);
        h.cpu = 90.0;
        let c = HeuristicOracle::classify(&h, &services(&[]));
        assert_eq!(c.current_failures[0].severity, Severity::Medium);
    }

    #[test]
    fn test_crash_plan_restarts_component() {
        let components: BTreeSet<String> = ["web-api".to_string()].into_iter().collect();
        let plan = HeuristicOracle::plan("Service Crash", &components);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.steps[0].index, 1);
        assert_eq!(plan.steps[0].command.as_deref(), Some("systemctl restart web-api"));
        assert_eq!(plan.steps[1].index, 2);
    }

    #[test]
    fn test_unknown_incident_escalates_manually() {
        let plan = HeuristicOracle::plan("Cosmic Rays", &BTreeSet::new());
        assert_eq!(plan.len(), 1);
        assert!(plan.steps[0].is_manual());
    }

    #[tokio::test]
    async fn test_complete_without_snapshot_is_parse_error() {
        let oracle = HeuristicOracle::new();
        let err = oracle
            .complete(&OracleRequest::new(AgentTag::Detection, "hello".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, HealError::OracleParse { .. }));
    }
}
