//! Health analysis
//!
//! `analyzer` classifies a bounded event window; `probe` optionally feeds
//! host metrics into that window.

pub mod analyzer;
pub mod probe;

pub use analyzer::{HealthAnalyzer, HealthReport, HealthSettings, HealthStatus, ServiceMap, ServiceStatus};
pub use probe::{MetricsProbe, MetricsSample};
