//! Cycle phase state machine
//!
//! One cycle walks a fixed path through the phases:
//!
//! ```text
//! Idle -> Inject -> Settle -> Detect -> (Remediate)? -> Verify -> Cleanup -> Idle
//! ```
//!
//! `Abort` moves any active phase straight to `Cleanup`, so cleanup is
//! reachable from everywhere the cycle can fail.

use crate::errors::{HealError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cycle phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CyclePhase {
    /// Between cycles
    #[default]
    Idle,

    /// Maybe start a fault
    Inject,

    /// Let the fault show up in the logs
    Settle,

    /// Read the window and classify
    Detect,

    /// Plan and execute for actionable incidents
    Remediate,

    /// Re-check health and update statistics
    Verify,

    /// Reverse every fault
    Cleanup,
}

/// Events that trigger phase transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    Begin,
    InjectDone,
    SettleDone,
    RemediationNeeded,
    NothingToRemediate,
    RemediationDone,
    VerifyDone,
    CleanupDone,
    Abort,
}

impl CyclePhase {
    pub const ALL: [CyclePhase; 7] = [
        CyclePhase::Idle,
        CyclePhase::Inject,
        CyclePhase::Settle,
        CyclePhase::Detect,
        CyclePhase::Remediate,
        CyclePhase::Verify,
        CyclePhase::Cleanup,
    ];

    /// Inside a cycle
    pub fn is_active(&self) -> bool {
        !matches!(self, CyclePhase::Idle)
    }

    /// Attempt a phase transition
    ///
    /// Valid transitions:
    /// 1.  Idle      -> Inject     (Begin)
    /// 2.  Inject    -> Settle     (InjectDone)
    /// 3.  Settle    -> Detect     (SettleDone)
    /// 4.  Detect    -> Remediate  (RemediationNeeded)
    /// 5.  Detect    -> Verify     (NothingToRemediate)
    /// 6.  Remediate -> Verify     (RemediationDone)
    /// 7.  Verify    -> Cleanup    (VerifyDone)
    /// 8.  Cleanup   -> Idle       (CleanupDone)
    /// 9.  active    -> Cleanup    (Abort)
    pub fn transition(&self, event: PhaseEvent) -> Result<CyclePhase> {
        use CyclePhase::*;
        use PhaseEvent::*;

        let next = match (self, event) {
            (Idle, Begin) => Inject,
            (Inject, InjectDone) => Settle,
            (Settle, SettleDone) => Detect,
            (Detect, RemediationNeeded) => Remediate,
            (Detect, NothingToRemediate) => Verify,
            (Remediate, RemediationDone) => Verify,
            (Verify, VerifyDone) => Cleanup,
            (Cleanup, CleanupDone) => Idle,

            (from, Abort) if from.is_active() => Cleanup,

            (from, event) => {
                return Err(HealError::InvalidTransition {
                    from: from.as_str().to_string(),
                    to: format!("(via {:?})", event),
                    reason: format!("No valid transition from {} on {:?}", from, event),
                });
            }
        };

        Ok(next)
    }

    /// Get all valid events from this phase
    pub fn valid_events(&self) -> Vec<PhaseEvent> {
        use CyclePhase::*;
        use PhaseEvent::*;

        match self {
            Idle => vec![Begin],
            Inject => vec![InjectDone, Abort],
            Settle => vec![SettleDone, Abort],
            Detect => vec![RemediationNeeded, NothingToRemediate, Abort],
            Remediate => vec![RemediationDone, Abort],
            Verify => vec![VerifyDone, Abort],
            Cleanup => vec![CleanupDone, Abort],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CyclePhase::Idle => "IDLE",
            CyclePhase::Inject => "INJECT",
            CyclePhase::Settle => "SETTLE",
            CyclePhase::Detect => "DETECT",
            CyclePhase::Remediate => "REMEDIATE",
            CyclePhase::Verify => "VERIFY",
            CyclePhase::Cleanup => "CLEANUP",
        }
    }

    /// Human-readable phase name
    pub fn display_name(&self) -> &'static str {
        match self {
            CyclePhase::Idle => "Idle",
            CyclePhase::Inject => "Injecting Fault",
            CyclePhase::Settle => "Waiting for Symptoms",
            CyclePhase::Detect => "Detecting Incidents",
            CyclePhase::Remediate => "Remediating",
            CyclePhase::Verify => "Verifying Health",
            CyclePhase::Cleanup => "Cleaning Up",
        }
    }
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
