//! Type definitions module
//!
//! Domain records shared by detection, remediation and the cycle driver.

pub mod incident;
pub mod plan;
pub mod cycle;
pub(crate) mod lenient;

// Re-export commonly used types
pub use incident::{Classification, FailureReport, FutureRisk, Incident, IncidentStatus, Severity};
pub use plan::{Recommendation, Remediation, RemediationPlan, Step, StepResult, Verification};
pub use cycle::{CycleStats, Decision};
