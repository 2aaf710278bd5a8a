//! Prompt construction for detection and planning
//!
//! Inputs are embedded as fenced JSON after a fixed marker line so that any
//! backend, including the offline heuristic, can recover them.

use crate::health::{HealthReport, ServiceMap};
use crate::types::Incident;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SYSTEM_PROMPT: &str =
    "You are an expert system reliability engineer and incident response specialist.";

pub const SNAPSHOT_MARKER: &str = "CURRENT METRICS:";
pub const INCIDENT_MARKER: &str = "INCIDENT:";
pub const STATE_MARKER: &str = "CURRENT SYSTEM STATE:";

/// Sampling temperature for both prompts
pub const TEMPERATURE: f32 = 0.3;

/// Compact view of an already-open incident
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveIncidentSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub incident_type: String,
    pub severity: String,
    pub created_at: DateTime<Utc>,
}

/// Everything the oracle is shown during DETECT
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSnapshot {
    pub timestamp: DateTime<Utc>,
    pub system_health: HealthReport,
    pub service_status: ServiceMap,
    /// Newest window messages, capped
    pub recent_logs: Vec<String>,
    pub active_incidents: Vec<ActiveIncidentSummary>,
}

/// Which loop phase is asking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentTag {
    Detection,
    Remediation,
}

impl AgentTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentTag::Detection => "DETECTION",
            AgentTag::Remediation => "REMEDIATION",
        }
    }
}

/// One request to an oracle backend
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub tag: AgentTag,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
}

impl OracleRequest {
    pub fn new(tag: AgentTag, prompt: String) -> Self {
        Self {
            tag,
            system: SYSTEM_PROMPT.to_string(),
            prompt,
            temperature: TEMPERATURE,
        }
    }
}

fn pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

pub fn detection_prompt(snapshot: &DetectionSnapshot) -> String {
    format!(
        r#"You are an Incident Detection and Future Risk Prediction Agent.

Your task is to analyze the current system state and:
1. Detect any active failures or anomalies
2. Predict what will break next based on current trends
3. Assess urgency and priority

{marker}
```json
{snapshot}
```

Respond with JSON ONLY (no markdown, no code blocks):
{{
    "current_failures": [
        {{
            "type": "Service Crash | CPU Saturation | Memory Leak | Disk Full | Error Storm",
            "severity": "CRITICAL | HIGH | MEDIUM | LOW",
            "affected_components": ["component1"],
            "evidence": ["observation1"],
            "confidence": 0.0
        }}
    ],
    "future_risks": [
        {{
            "risk_type": "Resource Exhaustion | Cascading Failure | Data Loss",
            "probability": 0.0,
            "time_to_failure": "immediate | minutes | hours | days",
            "preventive_actions": ["action1"]
        }}
    ],
    "root_cause_analysis": "Brief analysis of root causes",
    "trigger_remediation": true,
    "confidence_score": 0.0
}}"#,
        marker = SNAPSHOT_MARKER,
        snapshot = pretty(snapshot),
    )
}

pub fn plan_prompt(incident: &Incident, system_state: &serde_json::Value) -> String {
    format!(
        r#"You are a Remediation Planning Agent.

Your task is to create a detailed remediation plan for the following incident:

{incident_marker}
```json
{incident}
```

{state_marker}
```json
{state}
```

Respond with JSON ONLY (no markdown, no code blocks):
{{
    "remediation_plan": [
        {{
            "step": 1,
            "action": "Detailed action description",
            "command": "exact command to execute (or null for manual action)",
            "expected_outcome": "what should happen",
            "rollback_command": "command to undo this step if needed",
            "risk_level": "LOW | MEDIUM | HIGH"
        }}
    ],
    "estimated_duration_minutes": 5,
    "prerequisites": ["prerequisite1"],
    "potential_side_effects": ["effect1"],
    "success_criteria": ["criterion1"]
}}"#,
        incident_marker = INCIDENT_MARKER,
        incident = pretty(incident),
        state_marker = STATE_MARKER,
        state = pretty(system_state),
    )
}

/// Recover the JSON object embedded after `marker`
pub fn embedded_json(prompt: &str, marker: &str) -> Option<serde_json::Value> {
    let start = prompt.find(marker)? + marker.len();
    let object = super::parser::find_json_object(&prompt[start..])?;
    serde_json::from_str(object).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{HealthStatus, ServiceStatus};
    use crate::types::{FailureReport, Severity};

    fn snapshot() -> DetectionSnapshot {
        DetectionSnapshot {
            timestamp: Utc::now(),
            system_health: HealthReport {
                status: HealthStatus::Critical,
                error_count: 12,
                warning_count: 0,
                cpu: 0.0,
                memory: 0.0,
                window: 12,
            },
            service_status: [("web-api".to_string(), ServiceStatus::Down)].into_iter().collect(),
            recent_logs: vec!["{\"note\": \"brace } in a log\"}".to_string()],
            active_incidents: vec![],
        }
    }

    #[test]
    fn test_snapshot_recoverable_from_prompt() {
        let prompt = detection_prompt(&snapshot());
        let value = embedded_json(&prompt, SNAPSHOT_MARKER).unwrap();
        assert_eq!(value["system_health"]["status"], "CRITICAL");
        assert_eq!(value["service_status"]["web-api"], "DOWN");
    }

    #[test]
    fn test_incident_recoverable_from_plan_prompt() {
        let failure = FailureReport {
            failure_type: "Service Crash".into(),
            severity: Severity::Critical,
            affected_components: ["cache".to_string()].into_iter().collect(),
            evidence: vec![],
            confidence: None,
        };
        let incident = Incident::from_failure(&failure, None);
        let prompt = plan_prompt(&incident, &serde_json::json!({"recent_metrics": []}));
        let value = embedded_json(&prompt, INCIDENT_MARKER).unwrap();
        assert_eq!(value["type"], "Service Crash");
        assert!(embedded_json(&prompt, STATE_MARKER).is_some());
    }

    #[test]
    fn test_missing_marker() {
        assert!(embedded_json("nothing here", SNAPSHOT_MARKER).is_none());
    }
}
