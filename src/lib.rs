//! autoheal v0.5.0 - Self-Healing Infrastructure Simulator
//!
//! Injects synthetic faults into the host, detects them from a structured
//! event log, asks a reasoning oracle to classify and plan, executes the
//! plan and verifies the outcome. Every cycle leaves the host clean.
//!
//! # Architecture
//!
//! - **store**: event log, record tables, oracle traces
//! - **faults**: fault injection and guaranteed release
//! - **health**: windowed health analysis and host metrics probe
//! - **oracle**: classification and planning behind a timeout gateway
//! - **remediation**: step execution and verification
//! - **agent**: cycle state machine, orchestrator, scheduling

pub mod errors;
pub mod types;
pub mod store;
pub mod faults;
pub mod health;
pub mod oracle;
pub mod remediation;
pub mod agent;

// Re-export commonly used types
pub use errors::{HealError, Result};

// Interface layer
pub mod telemetry;
pub mod cli;
pub mod config;
