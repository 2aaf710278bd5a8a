//! Remediation execution
//!
//! `engine` walks a plan; `executor` decides whether a command touches the host.

pub mod engine;
pub mod executor;

pub use engine::RemediationEngine;
pub use executor::{
    CommandClass, CommandOutcome, ExecutorKind, ProcessExecutor, SimulatedExecutor, StepExecutor,
    DEFAULT_STEP_TIMEOUT,
};
