//! Fault injection
//!
//! Synthetic, time-bounded failures with a defined reversal.

pub mod injector;
pub mod profile;
pub mod types;

pub use injector::FaultInjector;
pub use profile::{FaultProfile, Span};
pub use types::{CleanupReport, Fault, FaultKind, FaultState};
