//! Process-wide cycle statistics and persisted detection decisions

use super::incident::Classification;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Monotonic counters for one run; never reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStats {
    pub cycle_count: u64,
    pub total_incidents: u64,
    pub total_remediations: u64,
    pub successful_remediations: u64,
}

impl CycleStats {
    /// Share of remediations that verified; 0 when none ran
    pub fn success_rate(&self) -> f64 {
        if self.total_remediations == 0 {
            0.0
        } else {
            self.successful_remediations as f64 / self.total_remediations as f64
        }
    }
}

/// Snapshot of one DETECT phase as stored in `agent_decisions`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub agent_type: String,
    pub classification: Classification,
    pub trigger_remediation: bool,
    pub metrics_snapshot: serde_json::Value,
}

impl Decision {
    pub fn detection(classification: Classification, metrics_snapshot: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            agent_type: "detection".to_string(),
            trigger_remediation: classification.trigger_remediation,
            classification,
            metrics_snapshot,
        }
    }
}
