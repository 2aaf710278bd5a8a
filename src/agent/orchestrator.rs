//! Cycle orchestrator - main coordinator
//!
//! Runs one incident-response cycle at a time:
//! - maybe inject a fault, then let it settle
//! - read the health window and ask the oracle for a classification
//! - plan and execute remediation for CRITICAL/HIGH incidents
//! - re-check health, update statistics, reverse every fault
//!
//! Cleanup is unconditional. The normal path runs it in the CLEANUP phase;
//! errors abort into CLEANUP; a panic or a dropped cycle future releases the
//! faults through `CleanupGuard`.

use super::state::{CyclePhase, PhaseEvent};
use super::status::StatusCell;
use crate::errors::{HealError, Result};
use crate::faults::{CleanupReport, Fault, FaultInjector, FaultKind, FaultProfile};
use crate::health::{HealthAnalyzer, HealthReport, HealthSettings, MetricsProbe};
use crate::oracle::{
    ActiveIncidentSummary, DetectionSnapshot, HeuristicOracle, OracleAuditor, OracleClient, OracleGateway,
    DEFAULT_ORACLE_TIMEOUT,
};
use crate::remediation::{RemediationEngine, SimulatedExecutor, StepExecutor};
use crate::store::{capped_json, LogGroup, Record, Stores, Table, DECISION_BLOB_LIMIT};
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use crate::types::{Classification, CycleStats, Decision, Incident, IncidentStatus, Remediation, RemediationPlan};
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, info_span, warn, Instrument};

/// Window lines shown to the oracle
pub const RECENT_LOG_LINES: usize = 20;

/// Incidents older than this are no longer reported as active
pub const ACTIVE_INCIDENT_HOURS: i64 = 1;

/// Rows read when looking for active incidents
const ACTIVE_INCIDENT_SCAN: usize = 100;

/// Rows of each table summarised for planning
const PLANNING_STATE_ROWS: usize = 10;

/// Cycle cadence and timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleSettings {
    pub cycle_interval_secs: u64,
    pub max_cycles: Option<u64>,
    pub settle_secs: u64,
    pub manual_settle_secs: u64,
    /// Scheduled cycle N injects when `(N - 1) % inject_every == 0`; 0 never injects
    pub inject_every: u64,
    pub metrics_probe: bool,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 300,
            max_cycles: None,
            settle_secs: 2,
            manual_settle_secs: 5,
            inject_every: 3,
            metrics_probe: true,
        }
    }
}

impl CycleSettings {
    /// No waiting and no host probing; for tests and dry runs
    pub fn instant() -> Self {
        Self {
            cycle_interval_secs: 0,
            settle_secs: 0,
            manual_settle_secs: 0,
            metrics_probe: false,
            ..Self::default()
        }
    }

    pub fn injects_on(&self, cycle: u64) -> bool {
        self.inject_every > 0 && cycle > 0 && (cycle - 1) % self.inject_every == 0
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }
}

/// What started a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleTrigger {
    /// Driver loop; injects on the configured cadence
    Scheduled,
    /// Operator request; always injects, random kind when `None`
    Manual(Option<FaultKind>),
}

/// Everything one cycle observed and did
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub injected: Option<Fault>,
    pub injection_error: Option<String>,
    pub health_before: Option<HealthReport>,
    pub classification: Classification,
    pub incidents: Vec<Incident>,
    pub remediations: Vec<Remediation>,
    pub health_after: Option<HealthReport>,
    pub cleanup: CleanupReport,
    pub duration_ms: u64,
}

impl CycleReport {
    fn new(cycle: u64) -> Self {
        Self {
            cycle,
            injected: None,
            injection_error: None,
            health_before: None,
            classification: Classification::empty(),
            incidents: Vec::new(),
            remediations: Vec::new(),
            health_after: None,
            cleanup: CleanupReport::default(),
            duration_ms: 0,
        }
    }

    pub fn successful_remediations(&self) -> usize {
        self.remediations.iter().filter(|r| r.succeeded()).count()
    }
}

/// Releases every fault if a cycle ends without reaching CLEANUP
struct CleanupGuard {
    injector: Arc<FaultInjector>,
    telemetry: TelemetryCollector,
    status: StatusCell,
    armed: bool,
}

impl CleanupGuard {
    fn arm(injector: Arc<FaultInjector>, telemetry: TelemetryCollector, status: StatusCell) -> Self {
        Self {
            injector,
            telemetry,
            status,
            armed: true,
        }
    }

    /// Run cleanup now and disarm
    fn release(mut self) -> CleanupReport {
        self.armed = false;
        self.cleanup()
    }

    fn cleanup(&self) -> CleanupReport {
        let report = self.injector.cleanup();
        self.telemetry.record(TelemetryEvent::FaultsCleaned {
            released: report.released,
            failures: report.failures.len(),
        });
        report
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if self.armed {
            let report = self.cleanup();
            warn!(
                released = report.released,
                failures = report.failures.len(),
                "Cycle ended early, faults released"
            );
            self.status.idle();
        }
    }
}

/// Main cycle orchestrator
pub struct CycleOrchestrator {
    settings: CycleSettings,
    stores: Stores,
    injector: Arc<FaultInjector>,
    health: HealthAnalyzer,
    probe: Option<MetricsProbe>,
    oracle: OracleGateway,
    engine: RemediationEngine,
    stats: Mutex<CycleStats>,
    status: StatusCell,
    telemetry: TelemetryCollector,
    gate: Arc<AsyncMutex<()>>,
}

impl CycleOrchestrator {
    pub fn builder(stores: Stores) -> OrchestratorBuilder {
        OrchestratorBuilder::new(stores)
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn injector(&self) -> Arc<FaultInjector> {
        Arc::clone(&self.injector)
    }

    pub fn health(&self) -> &HealthAnalyzer {
        &self.health
    }

    pub fn status(&self) -> StatusCell {
        self.status.clone()
    }

    pub fn telemetry(&self) -> TelemetryCollector {
        self.telemetry.clone()
    }

    pub fn stats(&self) -> CycleStats {
        *self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// True while a cycle holds the single-flight gate
    pub fn is_busy(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    /// Run one scheduled cycle; rejected if another cycle is running
    pub async fn run_one_cycle(&self) -> Result<CycleReport> {
        let permit = Arc::clone(&self.gate)
            .try_lock_owned()
            .map_err(|_| HealError::CycleInProgress)?;
        self.run_locked(permit, CycleTrigger::Scheduled).await
    }

    pub(crate) fn gate(&self) -> Arc<AsyncMutex<()>> {
        Arc::clone(&self.gate)
    }

    /// Run a cycle while holding the single-flight permit
    pub(crate) async fn run_locked(&self, permit: OwnedMutexGuard<()>, trigger: CycleTrigger) -> Result<CycleReport> {
        let _permit = permit;
        let cycle = {
            let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
            stats.cycle_count += 1;
            stats.cycle_count
        };
        self.cycle(cycle, trigger)
            .instrument(info_span!("cycle", cycle))
            .await
    }

    async fn cycle(&self, cycle: u64, trigger: CycleTrigger) -> Result<CycleReport> {
        let started = Instant::now();
        info!(trigger = ?trigger, "Cycle starting");
        self.log_event(json!({ "event": "CYCLE_START", "cycle": cycle, "timestamp": Utc::now().to_rfc3339() }));

        let guard = CleanupGuard::arm(self.injector(), self.telemetry.clone(), self.status.clone());
        let mut phase = CyclePhase::Idle;
        let mut report = CycleReport::new(cycle);

        let outcome = self.phases(cycle, trigger, &mut phase, &mut report).await;
        if let Err(e) = &outcome {
            warn!(phase = %phase, reason = %e, "Cycle aborted");
            if phase != CyclePhase::Cleanup {
                phase = self.advance(cycle, phase, PhaseEvent::Abort, "Aborting cycle")?;
            }
        }

        report.cleanup = guard.release();
        if !report.cleanup.is_clean() {
            warn!(failures = report.cleanup.failures.len(), "Some faults could not be reversed");
        }
        self.advance(cycle, phase, PhaseEvent::CleanupDone, "Waiting for next cycle")?;
        outcome?;

        report.duration_ms = started.elapsed().as_millis() as u64;
        self.telemetry.record(TelemetryEvent::CycleCompleted {
            cycle,
            duration_ms: report.duration_ms,
        });
        let stats = self.stats();
        self.log_event(json!({
            "event": "CYCLE_COMPLETE",
            "cycle": cycle,
            "incidents": report.incidents.len(),
            "remediations": report.remediations.len(),
            "total_remediations": stats.total_remediations,
            "successful_remediations": stats.successful_remediations,
            "duration_ms": report.duration_ms,
        }));
        info!(
            incidents = report.incidents.len(),
            remediations = report.remediations.len(),
            resolved = report.successful_remediations(),
            success_rate = %format!("{:.1}%", stats.success_rate() * 100.0),
            duration_ms = report.duration_ms,
            "Cycle complete"
        );
        Ok(report)
    }

    async fn phases(
        &self,
        cycle: u64,
        trigger: CycleTrigger,
        phase: &mut CyclePhase,
        report: &mut CycleReport,
    ) -> Result<()> {
        // INJECT
        *phase = self.advance(cycle, *phase, PhaseEvent::Begin, "Injecting fault")?;
        let injected = match trigger {
            CycleTrigger::Scheduled if !self.settings.injects_on(cycle) => {
                info!("Skipping fault injection this cycle");
                None
            }
            CycleTrigger::Scheduled | CycleTrigger::Manual(None) => Some(self.injector.inject_random().await),
            CycleTrigger::Manual(Some(kind)) => Some(self.injector.inject(kind).await),
        };
        match injected {
            Some(Ok(fault)) => {
                info!(fault = %fault.kind, fault_id = %fault.id, "Fault injected");
                self.telemetry.record(TelemetryEvent::FaultInjected {
                    kind: fault.kind.to_string(),
                });
                report.injected = Some(fault);
            }
            Some(Err(e)) => {
                warn!(reason = %e, "Fault injection failed, continuing without a fault");
                report.injection_error = Some(e.to_string());
            }
            None => {}
        }

        // SETTLE
        *phase = self.advance(cycle, *phase, PhaseEvent::InjectDone, "Waiting for symptoms")?;
        let settle = match trigger {
            CycleTrigger::Scheduled => self.settings.settle_secs,
            CycleTrigger::Manual(_) => self.settings.manual_settle_secs,
        };
        if settle > 0 {
            tokio::time::sleep(Duration::from_secs(settle)).await;
        }

        // DETECT
        *phase = self.advance(cycle, *phase, PhaseEvent::SettleDone, "Detecting incidents")?;
        self.detect(report).await;

        // REMEDIATE
        if report.classification.should_remediate() {
            *phase = self.advance(cycle, *phase, PhaseEvent::RemediationNeeded, "Remediating incidents")?;
            self.remediate(report).await;
        } else {
            info!(
                failures = report.classification.current_failures.len(),
                "No remediation needed"
            );
        }

        // VERIFY
        let event = if *phase == CyclePhase::Remediate {
            PhaseEvent::RemediationDone
        } else {
            PhaseEvent::NothingToRemediate
        };
        *phase = self.advance(cycle, *phase, event, "Verifying health")?;
        self.verify(report);

        *phase = self.advance(cycle, *phase, PhaseEvent::VerifyDone, "Cleaning up faults")?;
        Ok(())
    }

    fn advance(&self, cycle: u64, from: CyclePhase, event: PhaseEvent, operation: &str) -> Result<CyclePhase> {
        let to = from.transition(event)?;
        debug!(from = %from, to = %to, "Phase transition");
        self.telemetry.record(TelemetryEvent::PhaseTransition {
            from: from.as_str(),
            to: to.as_str(),
        });
        if to == CyclePhase::Idle {
            self.status.idle();
        } else {
            self.status.enter(cycle, to, operation);
        }
        Ok(to)
    }

    async fn detect(&self, report: &mut CycleReport) {
        if let Some(probe) = &self.probe {
            match probe.publish(self.stores.events.as_ref(), self.stores.records.as_ref()) {
                Ok(sample) => debug!(cpu = sample.cpu, memory = sample.memory, "Host metrics sampled"),
                Err(e) => warn!(reason = %e, "Metrics probe failed"),
            }
        }

        let window = self.health.window(self.stores.events.as_ref());
        let health = self.health.analyze(&window);
        let services = self.health.service_status(&window);
        info!(
            status = %health.status,
            errors = health.error_count,
            warnings = health.warning_count,
            window = health.window,
            "Health assessed"
        );

        let snapshot = DetectionSnapshot {
            timestamp: Utc::now(),
            system_health: health.clone(),
            service_status: services,
            recent_logs: window.iter().take(RECENT_LOG_LINES).map(|e| e.message.clone()).collect(),
            active_incidents: self.active_incidents(),
        };
        let classification = self.oracle.analyze(&snapshot).await.unwrap_or_else(Classification::empty);

        let metrics_snapshot = serde_json::to_value(&snapshot).unwrap_or(serde_json::Value::Null);
        let decision = Decision::detection(classification.clone(), metrics_snapshot);
        self.persist_decision(&decision);

        let incidents: Vec<Incident> = classification
            .current_failures
            .iter()
            .map(|f| Incident::from_failure(f, classification.root_cause_analysis.clone()))
            .collect();
        for incident in &incidents {
            self.persist_incident(incident);
        }
        {
            let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
            stats.total_incidents += incidents.len() as u64;
        }

        if let Err(e) = self.stores.events.append_json(
            LogGroup::DetectionAgent,
            &json!({
                "event": "DETECTION_COMPLETE",
                "decision_id": decision.id,
                "failures": incidents.len(),
                "risks": classification.future_risks.len(),
                "trigger_remediation": classification.trigger_remediation,
            }),
        ) {
            warn!(reason = %e, "Could not write detection event");
        }
        info!(
            failures = incidents.len(),
            risks = classification.future_risks.len(),
            trigger = classification.trigger_remediation,
            "Detection complete"
        );

        report.health_before = Some(health);
        report.classification = classification;
        report.incidents = incidents;
    }

    async fn remediate(&self, report: &mut CycleReport) {
        let system_state = self.planning_state();
        for incident in &report.incidents {
            if !incident.severity.is_actionable() {
                info!(incident = %incident.id, severity = %incident.severity, "Skipping remediation below HIGH");
                continue;
            }
            info!(incident = %incident.id, label = %incident.label(), "Remediating incident");
            let plan = self
                .oracle
                .plan(incident, &system_state)
                .await
                .unwrap_or_else(RemediationPlan::empty);
            let remediation = self.engine.execute(incident, plan).await;
            report.remediations.push(remediation);
        }
    }

    fn verify(&self, report: &mut CycleReport) {
        let (health, _) = self.health.assess(self.stores.events.as_ref());
        info!(status = %health.status, errors = health.error_count, "Post-cycle health");
        report.health_after = Some(health);

        {
            let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
            for remediation in &report.remediations {
                stats.total_remediations += 1;
                if remediation.succeeded() {
                    stats.successful_remediations += 1;
                }
            }
        }

        let resolved: Vec<String> = report
            .remediations
            .iter()
            .filter(|r| r.succeeded())
            .map(|r| r.incident_id.clone())
            .collect();
        for incident in report.incidents.iter_mut().filter(|i| resolved.contains(&i.id)) {
            incident.resolve();
            self.persist_incident(incident);
        }
    }

    /// ACTIVE incidents created within the last hour
    fn active_incidents(&self) -> Vec<ActiveIncidentSummary> {
        let rows = match self.stores.records.scan(Table::Incidents, ACTIVE_INCIDENT_SCAN) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(reason = %e, "Could not read incidents");
                return Vec::new();
            }
        };
        let cutoff = Utc::now() - ChronoDuration::hours(ACTIVE_INCIDENT_HOURS);
        rows.into_iter()
            .filter_map(|row| serde_json::from_value::<Incident>(row.fields).ok())
            .filter(|i| i.status == IncidentStatus::Active && i.created_at > cutoff)
            .map(|i| ActiveIncidentSummary {
                id: i.id,
                incident_type: i.incident_type,
                severity: i.severity.to_string(),
                created_at: i.created_at,
            })
            .collect()
    }

    /// Recent metric and decision ids handed to the planner
    fn planning_state(&self) -> serde_json::Value {
        let recent = |table: Table| {
            self.stores.records.scan(table, PLANNING_STATE_ROWS).unwrap_or_else(|e| {
                warn!(table = %table, reason = %e, "Could not read planning state");
                Vec::new()
            })
        };
        let metrics: Vec<_> = recent(Table::SystemMetrics)
            .into_iter()
            .map(|r| json!({ "id": r.key.id, "timestamp": r.key.timestamp_ms }))
            .collect();
        let decisions: Vec<_> = recent(Table::AgentDecisions)
            .into_iter()
            .map(|r| {
                json!({
                    "id": r.key.id,
                    "timestamp": r.key.timestamp_ms,
                    "agent_type": r.field_str("agent_type").unwrap_or("unknown"),
                })
            })
            .collect();
        json!({
            "recent_metrics": metrics,
            "recent_decisions": decisions,
            "timestamp": Utc::now().to_rfc3339(),
        })
    }

    fn persist_decision(&self, decision: &Decision) {
        let record = Record::new(
            Table::AgentDecisions,
            decision.id.clone(),
            json!({
                "agent_type": decision.agent_type,
                "classification": capped_json(&decision.classification, DECISION_BLOB_LIMIT),
                "trigger_remediation": decision.trigger_remediation,
                "metrics_snapshot": capped_json(&decision.metrics_snapshot, DECISION_BLOB_LIMIT),
            }),
        )
        .at(decision.timestamp.timestamp_millis());
        if let Err(e) = self.stores.records.put(record) {
            warn!(decision = %decision.id, reason = %e, "Could not store decision");
        }
    }

    fn persist_incident(&self, incident: &Incident) {
        let fields = match serde_json::to_value(incident) {
            Ok(fields) => fields,
            Err(e) => {
                warn!(incident = %incident.id, reason = %e, "Could not serialize incident");
                return;
            }
        };
        let record = Record::new(Table::Incidents, incident.id.clone(), fields).at(incident.created_at.timestamp_millis());
        if let Err(e) = self.stores.records.put(record) {
            warn!(incident = %incident.id, reason = %e, "Could not store incident");
        }
    }

    fn log_event(&self, value: serde_json::Value) {
        if let Err(e) = self.stores.events.append_json(LogGroup::Orchestrator, &value) {
            warn!(reason = %e, "Could not write orchestrator event");
        }
    }
}

/// Wires the orchestrator from its collaborators
pub struct OrchestratorBuilder {
    stores: Stores,
    settings: CycleSettings,
    profile: FaultProfile,
    health: HealthSettings,
    oracle: Arc<dyn OracleClient>,
    oracle_timeout: Duration,
    executor: Arc<dyn StepExecutor>,
    telemetry: TelemetryCollector,
}

impl OrchestratorBuilder {
    pub fn new(stores: Stores) -> Self {
        Self {
            stores,
            settings: CycleSettings::default(),
            profile: FaultProfile::default(),
            health: HealthSettings::default(),
            oracle: Arc::new(HeuristicOracle::new()),
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
            executor: Arc::new(SimulatedExecutor::new()),
            telemetry: TelemetryCollector::new(),
        }
    }

    pub fn settings(mut self, settings: CycleSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn fault_profile(mut self, profile: FaultProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn health(mut self, health: HealthSettings) -> Self {
        self.health = health;
        self
    }

    pub fn oracle(mut self, oracle: Arc<dyn OracleClient>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    pub fn executor(mut self, executor: Arc<dyn StepExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn build(self) -> CycleOrchestrator {
        let auditor = OracleAuditor::new(self.stores.records.clone(), self.stores.traces.clone());
        let oracle = OracleGateway::new(self.oracle, auditor)
            .with_timeout(self.oracle_timeout)
            .with_telemetry(self.telemetry.clone());
        let engine = RemediationEngine::new(self.executor, self.stores.events.clone(), self.stores.records.clone())
            .with_telemetry(self.telemetry.clone());
        let probe = self.settings.metrics_probe.then(MetricsProbe::new);

        CycleOrchestrator {
            injector: Arc::new(FaultInjector::new(self.stores.events.clone(), self.profile)),
            health: HealthAnalyzer::new(self.health),
            probe,
            oracle,
            engine,
            stats: Mutex::new(CycleStats::default()),
            status: StatusCell::new(),
            telemetry: self.telemetry,
            gate: Arc::new(AsyncMutex::new(())),
            settings: self.settings,
            stores: self.stores,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orchestrator(settings: CycleSettings) -> CycleOrchestrator {
        CycleOrchestrator::builder(Stores::in_memory())
            .settings(settings)
            .fault_profile(FaultProfile::instant())
            .build()
    }

    #[test]
    fn test_default_cadence() {
        let s = CycleSettings::default();
        let injected: Vec<u64> = (1..=10).filter(|n| s.injects_on(*n)).collect();
        assert_eq!(injected, vec![1, 4, 7, 10]);
    }

    #[test]
    fn test_cadence_edge_cases() {
        let every = CycleSettings {
            inject_every: 1,
            ..CycleSettings::default()
        };
        assert!((1..=5).all(|n| every.injects_on(n)));
        let never = CycleSettings {
            inject_every: 0,
            ..CycleSettings::default()
        };
        assert!(!(1..=5).any(|n| never.injects_on(n)));
    }

    #[tokio::test]
    async fn test_quiet_cycle_changes_only_cycle_count() {
        let orch = orchestrator(CycleSettings {
            inject_every: 0,
            ..CycleSettings::instant()
        });
        let report = orch.run_one_cycle().await.unwrap();
        assert!(report.injected.is_none());
        assert!(report.incidents.is_empty());
        assert!(report.remediations.is_empty());
        assert_eq!(
            orch.stats(),
            CycleStats {
                cycle_count: 1,
                ..CycleStats::default()
            }
        );
        assert_eq!(orch.status().snapshot().phase, CyclePhase::Idle);
        assert_eq!(orch.injector().active_count(), 0);
    }

    #[tokio::test]
    async fn test_decision_is_persisted_every_cycle() {
        let orch = orchestrator(CycleSettings {
            inject_every: 0,
            ..CycleSettings::instant()
        });
        orch.run_one_cycle().await.unwrap();
        orch.run_one_cycle().await.unwrap();
        let rows = orch.stores().records.scan(Table::AgentDecisions, 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].field_str("agent_type"), Some("detection"));
    }

    #[test]
    fn test_active_incidents_skip_resolved() {
        let orch = orchestrator(CycleSettings::instant());

        let failure = crate::types::FailureReport {
            failure_type: "Service Crash".into(),
            severity: crate::types::Severity::Critical,
            affected_components: Default::default(),
            evidence: vec![],
            confidence: None,
        };
        let open = Incident::from_failure(&failure, None);
        let mut closed = Incident::from_failure(&failure, None);
        closed.resolve();
        let mut stale = Incident::from_failure(&failure, None);
        stale.created_at = Utc::now() - ChronoDuration::hours(2);
        for i in [&open, &closed, &stale] {
            orch.persist_incident(i);
        }

        let active = orch.active_incidents();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, open.id);
    }

    #[tokio::test]
    async fn test_overlapping_run_is_rejected() {
        let orch = orchestrator(CycleSettings::instant());
        let _held = orch.gate().try_lock_owned().unwrap();
        assert!(orch.is_busy());
        let err = orch.run_one_cycle().await.unwrap_err();
        assert!(matches!(err, HealError::CycleInProgress));
        assert_eq!(orch.stats().cycle_count, 0);
    }

    #[tokio::test]
    async fn test_dropped_cycle_still_cleans_up() {
        let orch = orchestrator(CycleSettings {
            manual_settle_secs: 3600,
            ..CycleSettings::instant()
        });
        let permit = orch.gate().try_lock_owned().unwrap();
        let cycle = orch.run_locked(permit, CycleTrigger::Manual(Some(FaultKind::MemoryLeak)));
        // the settle sleep never finishes inside the timeout
        let _ = tokio::time::timeout(Duration::from_millis(50), cycle).await;

        assert_eq!(orch.injector().active_count(), 0);
        assert_eq!(orch.status().snapshot().phase, CyclePhase::Idle);
        assert!(!orch.is_busy());
    }

    fn orchestrator_with(profile: FaultProfile) -> CycleOrchestrator {
        CycleOrchestrator::builder(Stores::in_memory())
            .settings(CycleSettings::instant())
            .fault_profile(profile)
            .build()
    }

    /// Drop a manual cycle 50ms in, while its injection is still running
    async fn drop_mid_inject(orch: &CycleOrchestrator, kind: FaultKind) {
        let permit = orch.gate().try_lock_owned().unwrap();
        let cycle = orch.run_locked(permit, CycleTrigger::Manual(Some(kind)));
        assert!(tokio::time::timeout(Duration::from_millis(50), cycle).await.is_err());
    }

    #[tokio::test]
    async fn test_cycle_dropped_mid_disk_injection_removes_filler() {
        let dir = tempfile::TempDir::new().unwrap();
        let orch = orchestrator_with(FaultProfile {
            disk_path: dir.path().to_path_buf(),
            disk_mb: 4096,
            ..FaultProfile::instant()
        });
        drop_mid_inject(&orch, FaultKind::DiskExhaustion).await;

        assert_eq!(orch.injector().active_count(), 0);
        assert_eq!(orch.status().snapshot().phase, CyclePhase::Idle);
        assert!(!orch.is_busy());

        let mut empty = false;
        for _ in 0..250 {
            if std::fs::read_dir(dir.path()).unwrap().count() == 0 {
                empty = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(empty, "filler survived the cancelled cycle");
    }

    #[tokio::test]
    async fn test_cycle_dropped_mid_error_storm_leaves_no_entry() {
        let orch = orchestrator_with(FaultProfile {
            storm_secs: crate::faults::Span::fixed(3600),
            ..FaultProfile::instant()
        });
        drop_mid_inject(&orch, FaultKind::ErrorStorm).await;

        assert_eq!(orch.injector().active_count(), 0);
        assert_eq!(orch.status().snapshot().phase, CyclePhase::Idle);
        assert!(!orch.is_busy());
        assert_eq!(orch.stats().cycle_count, 1);
    }
}
