//! Oracle gateway
//!
//! The only path from the control loop to the reasoning oracle. Applies the
//! call timeout, audits every call, and hands back a typed `OracleOutcome`
//! that never carries an error out of the gateway.

use super::audit::{OracleAuditor, OracleCall};
use super::client::OracleClient;
use super::parser::{parse_response, OracleOutcome};
use super::prompts::{detection_prompt, plan_prompt, AgentTag, DetectionSnapshot, OracleRequest};
use crate::errors::HealError;
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use crate::types::{Classification, Incident, RemediationPlan};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default bound on one oracle call
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(60);

pub struct OracleGateway {
    client: Arc<dyn OracleClient>,
    auditor: OracleAuditor,
    timeout: Duration,
    telemetry: TelemetryCollector,
}

impl OracleGateway {
    pub fn new(client: Arc<dyn OracleClient>, auditor: OracleAuditor) -> Self {
        Self {
            client,
            auditor,
            timeout: DEFAULT_ORACLE_TIMEOUT,
            telemetry: TelemetryCollector::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Classify a detection snapshot
    pub async fn analyze(&self, snapshot: &DetectionSnapshot) -> OracleOutcome<Classification> {
        let outcome = self.call(AgentTag::Detection, detection_prompt(snapshot)).await;
        self.settle(AgentTag::Detection, outcome)
    }

    /// Propose a plan for one incident
    pub async fn plan(&self, incident: &Incident, system_state: &serde_json::Value) -> OracleOutcome<RemediationPlan> {
        let outcome = self.call(AgentTag::Remediation, plan_prompt(incident, system_state)).await;
        self.settle::<RemediationPlan>(AgentTag::Remediation, outcome)
            .map(RemediationPlan::normalized)
    }

    fn settle<T: serde::de::DeserializeOwned>(&self, tag: AgentTag, raw: OracleOutcome<String>) -> OracleOutcome<T> {
        let outcome = match raw {
            OracleOutcome::Parsed(text) => parse_response::<T>(&text),
            OracleOutcome::ParseError { raw, reason } => OracleOutcome::ParseError { raw, reason },
            OracleOutcome::Unavailable { reason } => OracleOutcome::Unavailable { reason },
        };
        match &outcome {
            OracleOutcome::Parsed(_) => debug!(agent = tag.as_str(), "Oracle response parsed"),
            OracleOutcome::ParseError { reason, raw } => {
                let head: String = raw.chars().take(200).collect();
                warn!(agent = tag.as_str(), %reason, response = %head, "Oracle response unparseable, degrading");
            }
            OracleOutcome::Unavailable { reason } => {
                warn!(agent = tag.as_str(), %reason, "Oracle unavailable, degrading");
            }
        }
        outcome
    }

    async fn call(&self, tag: AgentTag, prompt: String) -> OracleOutcome<String> {
        let request = OracleRequest::new(tag, prompt);
        let timestamp = Utc::now();
        let started = Instant::now();

        let result = tokio::time::timeout(self.timeout, self.client.complete(&request)).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let (outcome, response, error) = match result {
            Ok(Ok(text)) => (OracleOutcome::Parsed(text.clone()), text, None),
            Ok(Err(HealError::OracleParse { reason, raw })) => (
                OracleOutcome::ParseError { raw: raw.clone(), reason: reason.clone() },
                raw,
                Some(reason),
            ),
            Ok(Err(HealError::Serialization(e))) => (
                OracleOutcome::ParseError { raw: String::new(), reason: e.to_string() },
                String::new(),
                Some(e.to_string()),
            ),
            Ok(Err(e)) => (
                OracleOutcome::Unavailable { reason: e.to_string() },
                String::new(),
                Some(e.to_string()),
            ),
            Err(_) => {
                let err = HealError::Timeout {
                    duration_ms: self.timeout.as_millis() as u64,
                };
                (
                    OracleOutcome::Unavailable { reason: err.to_string() },
                    String::new(),
                    Some(err.to_string()),
                )
            }
        };

        let success = error.is_none();
        self.auditor.record(&OracleCall {
            action_id: Uuid::new_v4().to_string(),
            timestamp,
            agent_type: tag,
            model: self.client.model().to_string(),
            prompt: request.prompt,
            response,
            latency_ms,
            success,
            error,
        });
        self.telemetry.record(TelemetryEvent::OracleCall {
            agent: tag.as_str(),
            latency_ms,
            success,
        });
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Result;
    use crate::health::{HealthReport, HealthStatus};
    use crate::oracle::heuristic::HeuristicOracle;
    use crate::store::{MemoryRecordStore, MemoryTraceStore, RecordStore, Table};
    use async_trait::async_trait;

    struct Canned(&'static str);

    #[async_trait]
    impl OracleClient for Canned {
        fn model(&self) -> &str {
            "canned"
        }
        async fn complete(&self, _request: &OracleRequest) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Slow;

    #[async_trait]
    impl OracleClient for Slow {
        fn model(&self) -> &str {
            "slow"
        }
        async fn complete(&self, _request: &OracleRequest) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    struct Down;

    #[async_trait]
    impl OracleClient for Down {
        fn model(&self) -> &str {
            "down"
        }
        async fn complete(&self, _request: &OracleRequest) -> Result<String> {
            Err(HealError::OracleUnavailable("connection refused".into()))
        }
    }

    fn gateway(client: Arc<dyn OracleClient>) -> (Arc<MemoryRecordStore>, OracleGateway) {
        let records = Arc::new(MemoryRecordStore::new());
        let auditor = OracleAuditor::new(records.clone(), Arc::new(MemoryTraceStore::new()));
        (records, OracleGateway::new(client, auditor))
    }

    fn snapshot() -> DetectionSnapshot {
        DetectionSnapshot {
            timestamp: Utc::now(),
            system_health: HealthReport {
                status: HealthStatus::Healthy,
                error_count: 0,
                warning_count: 0,
                cpu: 0.0,
                memory: 0.0,
                window: 0,
            },
            service_status: Default::default(),
            recent_logs: vec![],
            active_incidents: vec![],
        }
    }

    #[tokio::test]
    async fn test_garbage_degrades_to_empty_classification() {
        let (records, gw) = gateway(Arc::new(Canned("the system looks sad")));
        let outcome = gw.analyze(&snapshot()).await;
        assert_eq!(outcome.label(), "parse_error");
        let classification = outcome.unwrap_or_else(Classification::empty);
        assert!(classification.is_empty());
        assert_eq!(records.scan(Table::LlmActions, 10).unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_degrades_like_parse_error() {
        let (records, gw) = gateway(Arc::new(Slow));
        let gw = gw.with_timeout(Duration::from_secs(5));
        let outcome = gw.analyze(&snapshot()).await;
        assert_eq!(outcome.label(), "unavailable");
        assert!(outcome.unwrap_or_else(Classification::empty).is_empty());

        let rows = records.scan(Table::LlmActions, 10).unwrap();
        assert_eq!(rows[0].fields["success"], false);
        assert!(rows[0].field_str("error").unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_unreachable_oracle_is_unavailable() {
        let (_records, gw) = gateway(Arc::new(Down));
        assert_eq!(gw.analyze(&snapshot()).await.label(), "unavailable");
    }

    #[tokio::test]
    async fn test_heuristic_round_trip() {
        let (_records, gw) = gateway(Arc::new(HeuristicOracle::new()));
        let outcome = gw.analyze(&snapshot()).await;
        assert!(outcome.is_parsed());
    }

    #[tokio::test]
    async fn test_plan_is_normalized() {
        let (_records, gw) = gateway(Arc::new(Canned(
            r#"```json
{"remediation_plan": [{"action": "a"}, {"action": "b", "command": "null"}]}
```"#,
        )));
        let failure = crate::types::FailureReport {
            failure_type: "Service Crash".into(),
            severity: crate::types::Severity::High,
            affected_components: Default::default(),
            evidence: vec![],
            confidence: None,
        };
        let incident = Incident::from_failure(&failure, None);
        match gw.plan(&incident, &serde_json::json!({})).await {
            OracleOutcome::Parsed(plan) => {
                assert_eq!(plan.steps[0].index, 1);
                assert_eq!(plan.steps[1].index, 2);
                assert!(plan.steps[1].is_manual());
            }
            other => panic!("expected a plan, got {:?}", other),
        }
    }
}
