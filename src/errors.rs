//! Error types for autoheal
//!
//! One enum covers every boundary of the control loop. Most variants are
//! degraded to empty defaults by the component that sees them first; only
//! the cycle driver surfaces them to callers.

use thiserror::Error;

/// Main error type for the self-healing control loop
#[derive(Error, Debug)]
pub enum HealError {
    /// Record store or event log could not be read or written
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Reasoning oracle could not be reached
    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// Oracle answered with text that is not the expected JSON shape
    #[error("Oracle output could not be parsed: {reason}")]
    OracleParse { reason: String, raw: String },

    /// A fault could not be started
    #[error("Fault injection failed: {0}")]
    FaultInjection(String),

    /// A fault's reversal handle could not be released
    #[error("Fault cleanup failed for {fault}: {reason}")]
    FaultCleanup { fault: String, reason: String },

    /// A remediation step could not be executed
    #[error("Step {index} failed: {reason}")]
    StepExecution { index: usize, reason: String },

    /// Cycle phase transition not allowed by the state machine
    #[error("Invalid phase transition from {from:?} to {to:?}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    /// Another cycle already holds the single-flight guard
    #[error("A cycle is already in progress")]
    CycleInProgress,

    /// Timeout errors
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Cycle-level failure surfaced by the driver
    #[error("Orchestration error: {0}")]
    Orchestration(String),
}

/// Result type alias for autoheal operations
pub type Result<T> = std::result::Result<T, HealError>;

impl From<anyhow::Error> for HealError {
    fn from(err: anyhow::Error) -> Self {
        HealError::Orchestration(format!("{:#}", err))
    }
}

impl HealError {
    /// Transport-level failures worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HealError::Timeout { .. } | HealError::Http(_) | HealError::OracleUnavailable(_)
        )
    }
}
