//! Plan execution
//!
//! Runs a remediation plan step by step against a `StepExecutor`, records
//! every commanded step, and produces the verified `Remediation`.

use super::executor::StepExecutor;
use crate::store::{
    capped_json, truncate_blob, EventLog, LogGroup, Record, RecordStore, Table, BLOB_LIMIT, COMMAND_LIMIT,
};
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use crate::types::{Incident, Remediation, RemediationPlan, Step, StepResult};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct RemediationEngine {
    executor: Arc<dyn StepExecutor>,
    events: Arc<dyn EventLog>,
    records: Arc<dyn RecordStore>,
    telemetry: TelemetryCollector,
}

impl RemediationEngine {
    pub fn new(executor: Arc<dyn StepExecutor>, events: Arc<dyn EventLog>, records: Arc<dyn RecordStore>) -> Self {
        Self {
            executor,
            events,
            records,
            telemetry: TelemetryCollector::new(),
        }
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Execute `plan` for `incident`. Steps run strictly in order and a
    /// failed step never stops the ones after it.
    pub async fn execute(&self, incident: &Incident, plan: RemediationPlan) -> Remediation {
        let remediation_id = Uuid::new_v4().to_string();
        info!(
            remediation_id = %remediation_id,
            incident_id = %incident.id,
            steps = plan.len(),
            executor = self.executor.name(),
            "Executing remediation plan"
        );
        self.log(json!({
            "event": "REMEDIATION_START",
            "remediation_id": remediation_id,
            "incident_id": incident.id,
            "steps": plan.len(),
            "timestamp": Utc::now().to_rfc3339(),
        }));

        let mut step_results = Vec::with_capacity(plan.len());
        for step in &plan.steps {
            let result = self.run_step(&remediation_id, step).await;
            self.telemetry.record(TelemetryEvent::StepCompleted {
                success: result.success,
                duration_ms: result.duration_ms,
            });
            self.log(json!({
                "event": "STEP_COMPLETED",
                "remediation_id": remediation_id,
                "step": result.index,
                "success": result.success,
                "duration_ms": result.duration_ms,
            }));
            step_results.push(result);
        }

        let remediation = Remediation::new(remediation_id, &incident.id, plan, step_results);

        self.persist(incident, &remediation);
        self.log(json!({
            "event": "REMEDIATION_COMPLETE",
            "remediation_id": remediation.id,
            "incident_id": incident.id,
            "success": remediation.verification.success,
            "recommendation": remediation.verification.recommendation,
            "timestamp": Utc::now().to_rfc3339(),
        }));
        info!(
            remediation_id = %remediation.id,
            success = remediation.verification.success,
            recommendation = %remediation.verification.recommendation,
            "Remediation finished"
        );
        remediation
    }

    async fn run_step(&self, remediation_id: &str, step: &Step) -> StepResult {
        let started = Instant::now();
        let command = match step.command.as_deref() {
            Some(c) if !c.trim().is_empty() && !c.eq_ignore_ascii_case("null") => c,
            _ => {
                debug!(step = step.index, action = %step.action, "Manual action recorded");
                return StepResult::success(step, format!("Manual action: {}", step.action), 0);
            }
        };

        debug!(step = step.index, command = %command, "Running step");
        let outcome = self.executor.execute(command).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (exit_code, result) = match outcome {
            Ok(out) if out.succeeded() => (out.exit_code, StepResult::success(step, out.output, duration_ms)),
            Ok(out) => {
                let error = out.error.unwrap_or_else(|| format!("exited with status {}", out.exit_code));
                (out.exit_code, StepResult::failure(step, out.output, error, duration_ms))
            }
            Err(e) => (1, StepResult::failure(step, String::new(), e.to_string(), duration_ms)),
        };
        if !result.success {
            warn!(step = step.index, exit_code, "Remediation step failed");
        }

        let record = Record::new(
            Table::CommandExecutions,
            Uuid::new_v4().to_string(),
            json!({
                "remediation_id": remediation_id,
                "command": truncate_blob(command, COMMAND_LIMIT),
                "exit_code": exit_code,
                "output": truncate_blob(&result.output, BLOB_LIMIT),
                "error": truncate_blob(result.error.as_deref().unwrap_or(""), BLOB_LIMIT),
                "status": if result.success { "SUCCESS" } else { "FAILED" },
            }),
        );
        if let Err(e) = self.records.put(record) {
            warn!(error = %e, "Could not record command execution");
        }
        result
    }

    fn persist(&self, incident: &Incident, remediation: &Remediation) {
        let record = Record::new(
            Table::Remediations,
            remediation.id.clone(),
            json!({
                "incident_id": incident.id,
                "incident": capped_json(incident, BLOB_LIMIT),
                "plan": capped_json(&remediation.plan, BLOB_LIMIT),
                "execution_results": capped_json(&remediation.step_results, BLOB_LIMIT),
                "verification": capped_json(&remediation.verification, BLOB_LIMIT),
                "success": remediation.verification.success,
            }),
        )
        .at(remediation.created_at.timestamp_millis());
        if let Err(e) = self.records.put(record) {
            warn!(remediation_id = %remediation.id, error = %e, "Could not store remediation");
        }
    }

    fn log(&self, value: serde_json::Value) {
        if let Err(e) = self.events.append_json(LogGroup::RemediationAgent, &value) {
            warn!(error = %e, "Could not write remediation event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{HealError, Result};
    use crate::remediation::executor::{CommandOutcome, SimulatedExecutor};
    use crate::store::{MemoryEventLog, MemoryRecordStore};
    use crate::types::{FailureReport, Recommendation, Severity};
    use async_trait::async_trait;

    /// Fails any command containing "fail"
    struct Picky;

    #[async_trait]
    impl StepExecutor for Picky {
        fn name(&self) -> &'static str {
            "picky"
        }
        async fn execute(&self, command: &str) -> Result<CommandOutcome> {
            if command.contains("boom") {
                return Err(HealError::StepExecution {
                    index: 0,
                    reason: "spawn failed".into(),
                });
            }
            let exit_code = if command.contains("fail") { 2 } else { 0 };
            Ok(CommandOutcome {
                exit_code,
                output: format!("ran {}", command),
                error: None,
            })
        }
    }

    fn incident() -> Incident {
        Incident::from_failure(
            &FailureReport {
                failure_type: "Service Crash".into(),
                severity: Severity::Critical,
                affected_components: ["web-api".to_string()].into_iter().collect(),
                evidence: vec![],
                confidence: None,
            },
            None,
        )
    }

    fn engine(executor: Arc<dyn StepExecutor>) -> (Arc<MemoryEventLog>, Arc<MemoryRecordStore>, RemediationEngine) {
        let events = Arc::new(MemoryEventLog::new());
        let records = Arc::new(MemoryRecordStore::new());
        let engine = RemediationEngine::new(executor, events.clone(), records.clone());
        (events, records, engine)
    }

    #[tokio::test]
    async fn test_simulated_plan_resolves() {
        let (events, records, engine) = engine(Arc::new(SimulatedExecutor::new()));
        let plan = RemediationPlan::new(vec![
            Step::with_command(1, "Restart web-api", "systemctl restart web-api"),
            Step::manual(2, "Tell the team"),
        ]);
        let r = engine.execute(&incident(), plan).await;

        assert!(r.succeeded());
        assert_eq!(r.verification.recommendation, Recommendation::Resolved);
        assert_eq!(r.step_results[1].output, "Manual action: Tell the team");
        assert_eq!(records.count(Table::CommandExecutions), 1);
        assert_eq!(records.count(Table::Remediations), 1);

        let log = events.messages(LogGroup::RemediationAgent);
        assert_eq!(log.len(), 4);
        assert!(log[0].contains("REMEDIATION_START"));
        assert!(log[3].contains("REMEDIATION_COMPLETE"));
    }

    #[tokio::test]
    async fn test_failed_step_does_not_stop_later_steps() {
        let (_events, records, engine) = engine(Arc::new(Picky));
        let plan = RemediationPlan::new(vec![
            Step::with_command(1, "a", "fail please"),
            Step::with_command(2, "b", "boom"),
            Step::with_command(3, "c", "fine"),
        ]);
        let r = engine.execute(&incident(), plan).await;

        assert_eq!(r.step_results.len(), 3);
        assert!(!r.step_results[0].success);
        assert!(!r.step_results[1].success);
        assert!(r.step_results[2].success);
        assert!(!r.succeeded());
        assert_eq!(r.verification.recommendation, Recommendation::NeedsAttention);

        let rows = records.scan(Table::CommandExecutions, 10).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows.iter().filter(|r| r.field_str("status") == Some("FAILED")).count(), 2);
    }

    #[tokio::test]
    async fn test_empty_plan_is_not_success() {
        let (_events, records, engine) = engine(Arc::new(SimulatedExecutor::new()));
        let r = engine.execute(&incident(), RemediationPlan::empty()).await;
        assert!(!r.succeeded());
        assert_eq!(r.verification.recommendation, Recommendation::NoPlan);
        assert_eq!(records.count(Table::CommandExecutions), 0);
        assert_eq!(records.count(Table::Remediations), 1);
    }

    #[tokio::test]
    async fn test_null_command_is_manual() {
        let (_events, records, engine) = engine(Arc::new(Picky));
        let mut step = Step::manual(1, "Page someone");
        step.command = Some("NULL".into());
        let r = engine.execute(&incident(), RemediationPlan::new(vec![step])).await;
        assert!(r.succeeded());
        assert_eq!(records.count(Table::CommandExecutions), 0);
    }

    #[tokio::test]
    async fn test_events_carry_no_severity_words() {
        let (events, _records, engine) = engine(Arc::new(Picky));
        let plan = RemediationPlan::new(vec![Step::with_command(1, "a", "fail")]);
        engine.execute(&incident(), plan).await;
        for line in events.messages(LogGroup::RemediationAgent) {
            assert!(!line.contains("CRITICAL"));
            assert!(!line.contains("ERROR"));
            assert!(!line.to_lowercase().contains("crash"));
        }
    }
}
