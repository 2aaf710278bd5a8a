//! Fault records and their lifecycle

use crate::errors::{HealError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kinds of synthetic failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultKind {
    CpuSaturation,
    MemoryLeak,
    ErrorStorm,
    ServiceCrash,
    DiskExhaustion,
}

impl FaultKind {
    pub const ALL: [FaultKind; 5] = [
        FaultKind::CpuSaturation,
        FaultKind::MemoryLeak,
        FaultKind::ErrorStorm,
        FaultKind::ServiceCrash,
        FaultKind::DiskExhaustion,
    ];

    /// Kinds drawn by scheduled cycles; cheap to undo
    pub const RANDOM_POOL: [FaultKind; 3] = [
        FaultKind::CpuSaturation,
        FaultKind::ErrorStorm,
        FaultKind::ServiceCrash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::CpuSaturation => "CPU_SATURATION",
            FaultKind::MemoryLeak => "MEMORY_LEAK",
            FaultKind::ErrorStorm => "ERROR_STORM",
            FaultKind::ServiceCrash => "SERVICE_CRASH",
            FaultKind::DiskExhaustion => "DISK_EXHAUSTION",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FaultKind {
    type Err = HealError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "cpu" | "cpu_spike" | "cpu_saturation" => Ok(FaultKind::CpuSaturation),
            "memory" | "memory_leak" => Ok(FaultKind::MemoryLeak),
            "errors" | "error_storm" => Ok(FaultKind::ErrorStorm),
            "crash" | "service_crash" => Ok(FaultKind::ServiceCrash),
            "disk" | "disk_full" | "disk_exhaustion" => Ok(FaultKind::DiskExhaustion),
            other => Err(HealError::Config(format!("Unknown fault kind: {}", other))),
        }
    }
}

/// Fault lifecycle: REGISTERED → ACTIVE → (EXPIRED | CLEANED)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FaultState {
    Registered,
    Active,
    Expired,
    Cleaned,
}

impl FaultState {
    pub fn can_become(&self, next: FaultState) -> bool {
        use FaultState::*;
        matches!(
            (self, next),
            (Registered, Active) | (Registered, Cleaned) | (Active, Expired) | (Active, Cleaned) | (Expired, Cleaned)
        )
    }
}

/// Public view of one injected fault
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fault {
    pub id: String,
    pub kind: FaultKind,
    pub params: serde_json::Value,
    pub started_at: DateTime<Utc>,
    /// Planned end of the effect; `None` means until cleanup
    pub ends_at: Option<DateTime<Utc>>,
    pub state: FaultState,
}

impl Fault {
    pub fn new(kind: FaultKind, params: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            params,
            started_at: Utc::now(),
            ends_at: None,
            state: FaultState::Registered,
        }
    }

    pub fn ending_after(mut self, duration: std::time::Duration) -> Self {
        let span = chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        self.ends_at = Some(self.started_at + span);
        self
    }

    pub(crate) fn advance(&mut self, next: FaultState) -> Result<()> {
        if !self.state.can_become(next) {
            return Err(HealError::InvalidTransition {
                from: format!("{:?}", self.state),
                to: format!("{:?}", next),
                reason: format!("fault {} ({})", self.id, self.kind),
            });
        }
        self.state = next;
        Ok(())
    }

    /// Report EXPIRED once the planned end has passed
    pub(crate) fn refresh(&mut self, now: DateTime<Utc>) {
        if self.state == FaultState::Active && self.ends_at.map(|end| now >= end).unwrap_or(false) {
            self.state = FaultState::Expired;
        }
    }
}

/// Outcome of one cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub released: usize,
    pub failures: Vec<String>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("cpu".parse::<FaultKind>().unwrap(), FaultKind::CpuSaturation);
        assert_eq!("SERVICE_CRASH".parse::<FaultKind>().unwrap(), FaultKind::ServiceCrash);
        assert_eq!("disk-full".parse::<FaultKind>().unwrap(), FaultKind::DiskExhaustion);
        assert!("meteor".parse::<FaultKind>().is_err());
    }

    #[test]
    fn test_state_machine() {
        let mut fault = Fault::new(FaultKind::MemoryLeak, serde_json::json!({}));
        assert_eq!(fault.state, FaultState::Registered);
        assert!(fault.advance(FaultState::Expired).is_err());
        fault.advance(FaultState::Active).unwrap();
        fault.advance(FaultState::Expired).unwrap();
        fault.advance(FaultState::Cleaned).unwrap();
        assert!(fault.advance(FaultState::Active).is_err());
    }

    #[test]
    fn test_unstarted_fault_can_be_cleaned() {
        let mut fault = Fault::new(FaultKind::DiskExhaustion, serde_json::json!({}));
        fault.advance(FaultState::Cleaned).unwrap();
        assert!(fault.advance(FaultState::Active).is_err());
    }

    #[test]
    fn test_refresh_expires_after_end() {
        let mut fault = Fault::new(FaultKind::CpuSaturation, serde_json::json!({}))
            .ending_after(std::time::Duration::from_secs(0));
        fault.advance(FaultState::Active).unwrap();
        fault.refresh(Utc::now());
        assert_eq!(fault.state, FaultState::Expired);
    }

    #[test]
    fn test_refresh_keeps_open_ended_active() {
        let mut fault = Fault::new(FaultKind::DiskExhaustion, serde_json::json!({}));
        fault.advance(FaultState::Active).unwrap();
        fault.refresh(Utc::now());
        assert_eq!(fault.state, FaultState::Active);
    }
}
