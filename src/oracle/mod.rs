//! Reasoning oracle adapter
//!
//! Backends implement `OracleClient`; the control loop only ever talks to
//! `OracleGateway`, which bounds, audits and normalizes every call.

pub mod audit;
pub mod client;
pub mod gateway;
pub mod heuristic;
pub mod parser;
pub mod prompts;
pub mod retry;

pub use audit::{OracleAuditor, OracleCall};
pub use client::{HttpOracle, OracleClient, OracleProvider};
pub use gateway::{OracleGateway, DEFAULT_ORACLE_TIMEOUT};
pub use heuristic::HeuristicOracle;
pub use parser::OracleOutcome;
pub use prompts::{ActiveIncidentSummary, AgentTag, DetectionSnapshot, OracleRequest};
pub use retry::RetryPolicy;
