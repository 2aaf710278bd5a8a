//! Cycle orchestration module
//!
//! Phase state machine, the shared status cell, the orchestrator that runs
//! one cycle, and the drivers that schedule cycles.

pub mod driver;
pub mod orchestrator;
pub mod state;
pub mod status;

// Re-export commonly used types
pub use driver::StopReason;
pub use orchestrator::{CycleOrchestrator, CycleReport, CycleSettings, CycleTrigger, OrchestratorBuilder};
pub use state::{CyclePhase, PhaseEvent};
pub use status::{AgentStatus, StatusCell};
