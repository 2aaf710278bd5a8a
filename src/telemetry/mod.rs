//! Telemetry for autoheal
//!
//! In-process counters over cycle events plus the terminal summary printed
//! when a run ends. Structured logs go through `tracing`; see `logging`.

pub mod logging;

pub use logging::init_tracing;

use crate::types::CycleStats;
use colored::Colorize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Events retained for `recent_events`
const EVENT_HISTORY: usize = 1_000;

/// Telemetry event types
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    PhaseTransition {
        from: &'static str,
        to: &'static str,
    },
    FaultInjected {
        kind: String,
    },
    FaultsCleaned {
        released: usize,
        failures: usize,
    },
    OracleCall {
        agent: &'static str,
        latency_ms: u64,
        success: bool,
    },
    StepCompleted {
        success: bool,
        duration_ms: u64,
    },
    CycleCompleted {
        cycle: u64,
        duration_ms: u64,
    },
}

/// Telemetry statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryStats {
    pub phase_transitions: usize,
    pub faults_injected: usize,
    pub faults_released: usize,
    pub cleanup_failures: usize,
    pub oracle_calls: usize,
    pub oracle_failures: usize,
    pub oracle_latency_ms: u64,
    pub steps_succeeded: usize,
    pub steps_failed: usize,
    pub cycles_completed: usize,
}

/// Telemetry collector
#[derive(Clone)]
pub struct TelemetryCollector {
    events: Arc<Mutex<VecDeque<TelemetryEvent>>>,
    stats: Arc<Mutex<TelemetryStats>>,
    start_time: Instant,
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            stats: Arc::new(Mutex::new(TelemetryStats::default())),
            start_time: Instant::now(),
        }
    }

    /// Record an event
    pub fn record(&self, event: TelemetryEvent) {
        {
            let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
            match &event {
                TelemetryEvent::PhaseTransition { .. } => stats.phase_transitions += 1,
                TelemetryEvent::FaultInjected { .. } => stats.faults_injected += 1,
                TelemetryEvent::FaultsCleaned { released, failures } => {
                    stats.faults_released += released;
                    stats.cleanup_failures += failures;
                }
                TelemetryEvent::OracleCall { latency_ms, success, .. } => {
                    stats.oracle_calls += 1;
                    stats.oracle_latency_ms += latency_ms;
                    if !success {
                        stats.oracle_failures += 1;
                    }
                }
                TelemetryEvent::StepCompleted { success, .. } => {
                    if *success {
                        stats.steps_succeeded += 1;
                    } else {
                        stats.steps_failed += 1;
                    }
                }
                TelemetryEvent::CycleCompleted { .. } => stats.cycles_completed += 1,
            }
        }

        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        if events.len() >= EVENT_HISTORY {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub fn get_stats(&self) -> TelemetryStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Last `n` events, oldest first
    pub fn recent_events(&self, n: usize) -> Vec<TelemetryEvent> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let start = events.len().saturating_sub(n);
        events.iter().skip(start).cloned().collect()
    }

    /// Mean oracle latency; 0 before the first call
    pub fn mean_oracle_latency_ms(&self) -> u64 {
        let stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        if stats.oracle_calls == 0 {
            0
        } else {
            stats.oracle_latency_ms / stats.oracle_calls as u64
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// End-of-run summary
pub struct TelemetryDisplay {
    collector: TelemetryCollector,
}

impl TelemetryDisplay {
    pub fn new(collector: TelemetryCollector) -> Self {
        Self { collector }
    }

    pub fn render_summary(&self, cycle: &CycleStats) -> String {
        let stats = self.collector.get_stats();
        let rate = format!("{:.1}%", cycle.success_rate() * 100.0);
        let rate = if cycle.total_remediations == 0 {
            rate.dimmed()
        } else if cycle.successful_remediations == cycle.total_remediations {
            rate.green()
        } else {
            rate.yellow()
        };

        let mut out = String::new();
        out.push_str(&format!("\n{}\n", "Session Summary".bold()));
        out.push_str("─────────────────────────────────────\n");
        out.push_str(&format!("Duration:              {:?}\n", self.collector.elapsed()));
        out.push_str(&format!("Cycles:                {}\n", cycle.cycle_count));
        out.push_str(&format!("Incidents:             {}\n", cycle.total_incidents));
        out.push_str(&format!(
            "Remediations:          {} ({} successful)\n",
            cycle.total_remediations, cycle.successful_remediations
        ));
        out.push_str(&format!("Success rate:          {}\n", rate));
        out.push_str(&format!("Faults injected:       {}\n", stats.faults_injected));
        out.push_str(&format!(
            "Oracle calls:          {} ({} degraded, mean {}ms)\n",
            stats.oracle_calls,
            stats.oracle_failures,
            self.collector.mean_oracle_latency_ms()
        ));
        if stats.cleanup_failures > 0 {
            out.push_str(&format!(
                "{}\n",
                format!("Cleanup failures:      {}", stats.cleanup_failures).red()
            ));
        }
        out
    }

    pub fn display_summary(&self, cycle: &CycleStats) {
        println!("{}", self.render_summary(cycle));
    }
}
