//! Shared, transient view of what the orchestrator is doing right now

use super::state::CyclePhase;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStatus {
    pub phase: CyclePhase,
    pub operation: String,
    pub cycle: u64,
    pub started_at: Option<DateTime<Utc>>,
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self {
            phase: CyclePhase::Idle,
            operation: "Waiting for next cycle".to_string(),
            cycle: 0,
            started_at: None,
        }
    }
}

impl AgentStatus {
    pub fn is_busy(&self) -> bool {
        self.phase.is_active()
    }
}

/// Readers always get a whole snapshot
#[derive(Debug, Clone, Default)]
pub struct StatusCell {
    inner: Arc<RwLock<AgentStatus>>,
}

impl StatusCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> AgentStatus {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Record the phase a cycle just entered
    pub fn enter(&self, cycle: u64, phase: CyclePhase, operation: impl Into<String>) {
        let mut status = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if status.cycle != cycle || status.started_at.is_none() {
            status.started_at = Some(Utc::now());
        }
        status.cycle = cycle;
        status.phase = phase;
        status.operation = operation.into();
    }

    /// Back to idle, keeping the last cycle number
    pub fn idle(&self) {
        let mut status = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let cycle = status.cycle;
        *status = AgentStatus {
            cycle,
            ..AgentStatus::default()
        };
    }
}
