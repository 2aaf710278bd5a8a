//! Continuous driver and manual trigger

use super::orchestrator::{CycleOrchestrator, CycleReport, CycleTrigger};
use crate::errors::{HealError, Result};
use crate::faults::FaultKind;
use crate::types::CycleStats;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Why a driver loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxCycles,
    Interrupted,
}

impl CycleOrchestrator {
    /// Run scheduled cycles every `interval` until `max_cycles` have run in
    /// this call or Ctrl-C arrives. Waits for any manual cycle in flight
    /// rather than rejecting. Faults are always released before returning.
    pub async fn run_cycles(&self, interval: Duration, max_cycles: Option<u64>) -> Result<(CycleStats, StopReason)> {
        info!(
            interval_secs = interval.as_secs(),
            max_cycles = ?max_cycles,
            "Starting continuous operation"
        );
        let mut completed: u64 = 0;

        let reason = loop {
            if max_cycles.is_some_and(|max| completed >= max) {
                info!(completed, "Reached maximum cycles, stopping");
                break StopReason::MaxCycles;
            }

            let outcome = tokio::select! {
                outcome = self.scheduled_cycle() => outcome,
                _ = tokio::signal::ctrl_c() => break StopReason::Interrupted,
            };
            if let Err(e) = outcome {
                error!(reason = %e, "Cycle failed, stopping");
                self.final_cleanup();
                return Err(e);
            }
            completed += 1;

            if max_cycles.is_some_and(|max| completed >= max) {
                continue;
            }
            info!(secs = interval.as_secs(), next = self.stats().cycle_count + 1, "Waiting before next cycle");
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = tokio::signal::ctrl_c() => break StopReason::Interrupted,
            }
        };

        if reason == StopReason::Interrupted {
            warn!("Stopped by user");
        }
        self.final_cleanup();
        let stats = self.stats();
        info!(
            cycles = stats.cycle_count,
            incidents = stats.total_incidents,
            remediations = stats.total_remediations,
            successful = stats.successful_remediations,
            success_rate = %format!("{:.1}%", stats.success_rate() * 100.0),
            "Final statistics"
        );
        Ok((stats, reason))
    }

    /// `run_cycles` without a cycle limit
    pub async fn run_forever(&self, interval: Duration) -> Result<(CycleStats, StopReason)> {
        self.run_cycles(interval, None).await
    }

    /// Start a manual cycle on its own task. Rejected with
    /// `CycleInProgress` if a cycle already holds the gate.
    pub fn trigger(self: &Arc<Self>, kind: Option<FaultKind>) -> Result<JoinHandle<Result<CycleReport>>> {
        let permit = self.gate().try_lock_owned().map_err(|_| HealError::CycleInProgress)?;
        let this = Arc::clone(self);
        info!(fault = ?kind, "Manual cycle triggered");
        Ok(tokio::spawn(async move {
            this.run_locked(permit, CycleTrigger::Manual(kind)).await
        }))
    }

    async fn scheduled_cycle(&self) -> Result<CycleReport> {
        let permit = self.gate().lock_owned().await;
        self.run_locked(permit, CycleTrigger::Scheduled).await
    }

    fn final_cleanup(&self) {
        let report = self.injector().cleanup();
        if report.released > 0 || !report.is_clean() {
            info!(released = report.released, failures = report.failures.len(), "Final cleanup");
        }
    }
}
