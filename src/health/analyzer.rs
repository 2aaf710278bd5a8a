//! Deterministic health classification over a bounded event window
//!
//! Thresholds are part of the contract:
//! errors > 10 → CRITICAL; errors > 5 or warnings > 20 → DEGRADED;
//! cpu or memory > 85 → WARNING; otherwise HEALTHY.

use crate::store::{EventLog, LogEvent, LogGroup};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

pub const CRITICAL_ERROR_THRESHOLD: usize = 10;
pub const DEGRADED_ERROR_THRESHOLD: usize = 5;
pub const DEGRADED_WARNING_THRESHOLD: usize = 20;
pub const RESOURCE_THRESHOLD: f64 = 85.0;
pub const SERVICE_ERROR_THRESHOLD: usize = 5;

/// Services probed on every detection
pub const MONITORED_SERVICES: [&str; 5] = ["web-api", "auth-service", "database", "cache", "worker-queue"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Degraded,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Warning => "WARNING",
            HealthStatus::Degraded => "DEGRADED",
            HealthStatus::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceStatus {
    Up,
    Degraded,
    Down,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ServiceStatus::Up => "UP",
            ServiceStatus::Degraded => "DEGRADED",
            ServiceStatus::Down => "DOWN",
        })
    }
}

/// Verdict over one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub error_count: usize,
    pub warning_count: usize,
    pub cpu: f64,
    pub memory: f64,
    /// Events the verdict was computed from
    pub window: usize,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

pub type ServiceMap = BTreeMap<String, ServiceStatus>;

/// Window settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    /// Events kept after merging groups
    pub window: usize,
    /// Events read from each group
    pub per_group_limit: usize,
    /// Ignore events older than this; 0 keeps everything
    pub max_age_secs: u64,
    pub services: Vec<String>,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            window: 100,
            per_group_limit: 50,
            max_age_secs: 300,
            services: MONITORED_SERVICES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn is_error_line(message: &str) -> bool {
    message.contains("ERROR") || message.contains("CRITICAL")
}

fn is_warning_line(message: &str) -> bool {
    message.contains("WARNING") || message.contains("WARN")
}

fn is_crash_line(message: &str) -> bool {
    message.contains("CRASH") || message.contains("crash")
}

/// Pure classifier plus the window read that feeds it
#[derive(Debug, Clone, Default)]
pub struct HealthAnalyzer {
    settings: HealthSettings,
}

impl HealthAnalyzer {
    pub fn new(settings: HealthSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &HealthSettings {
        &self.settings
    }

    /// Newest events of the health groups, bounded by count and age
    ///
    /// A failing event source yields an empty window.
    pub fn window(&self, log: &dyn EventLog) -> Vec<LogEvent> {
        let mut events = match log.recent(&LogGroup::HEALTH_SOURCES, self.settings.per_group_limit) {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "Event source unavailable, using empty window");
                Vec::new()
            }
        };
        if self.settings.max_age_secs > 0 {
            let horizon = chrono::Utc::now().timestamp_millis() - (self.settings.max_age_secs as i64) * 1000;
            events.retain(|e| e.timestamp_ms >= horizon);
        }
        events.truncate(self.settings.window);
        events
    }

    /// System verdict over a window
    pub fn analyze(&self, events: &[LogEvent]) -> HealthReport {
        let mut error_count = 0;
        let mut warning_count = 0;
        let mut cpu: f64 = 0.0;
        let mut memory: f64 = 0.0;

        for event in events {
            let message = event.message.as_str();
            if is_error_line(message) {
                error_count += 1;
            }
            if is_warning_line(message) {
                warning_count += 1;
            }
            if let Ok(serde_json::Value::Object(fields)) = serde_json::from_str::<serde_json::Value>(message) {
                if let Some(v) = fields.get("cpu").and_then(|v| v.as_f64()) {
                    cpu = cpu.max(v);
                }
                if let Some(v) = fields.get("memory").and_then(|v| v.as_f64()) {
                    memory = memory.max(v);
                }
            }
        }

        let status = if error_count > CRITICAL_ERROR_THRESHOLD {
            HealthStatus::Critical
        } else if error_count > DEGRADED_ERROR_THRESHOLD || warning_count > DEGRADED_WARNING_THRESHOLD {
            HealthStatus::Degraded
        } else if cpu > RESOURCE_THRESHOLD || memory > RESOURCE_THRESHOLD {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            error_count,
            warning_count,
            cpu,
            memory,
            window: events.len(),
        }
    }

    /// Per-service verdict over a window
    pub fn service_status(&self, events: &[LogEvent]) -> ServiceMap {
        self.settings
            .services
            .iter()
            .map(|service| {
                let mentions = events.iter().filter(|e| e.message.contains(service.as_str()));
                let mut errors = 0;
                let mut crashed = false;
                for event in mentions {
                    crashed |= is_crash_line(&event.message);
                    if is_error_line(&event.message) {
                        errors += 1;
                    }
                }
                let status = if crashed {
                    ServiceStatus::Down
                } else if errors > SERVICE_ERROR_THRESHOLD {
                    ServiceStatus::Degraded
                } else {
                    ServiceStatus::Up
                };
                (service.clone(), status)
            })
            .collect()
    }

    /// Read the window and classify it
    pub fn assess(&self, log: &dyn EventLog) -> (HealthReport, ServiceMap) {
        let events = self.window(log);
        (self.analyze(&events), self.service_status(&events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryEventLog;

    fn lines(messages: &[&str]) -> Vec<LogEvent> {
        messages.iter().map(|m| LogEvent::now(LogGroup::Faults, *m)).collect()
    }

    fn repeat(message: &str, n: usize) -> Vec<LogEvent> {
        (0..n).map(|_| LogEvent::now(LogGroup::Faults, message)).collect()
    }

    #[test]
    fn test_twelve_errors_is_critical() {
        let analyzer = HealthAnalyzer::default();
        let report = analyzer.analyze(&repeat("ERROR something broke", 12));
        assert_eq!(report.error_count, 12);
        assert_eq!(report.status, HealthStatus::Critical);
    }

    #[test]
    fn test_boundaries() {
        let analyzer = HealthAnalyzer::default();
        assert_eq!(analyzer.analyze(&repeat("ERROR", 10)).status, HealthStatus::Degraded);
        assert_eq!(analyzer.analyze(&repeat("ERROR", 6)).status, HealthStatus::Degraded);
        assert_eq!(analyzer.analyze(&repeat("ERROR", 5)).status, HealthStatus::Healthy);
        assert_eq!(analyzer.analyze(&repeat("WARN slow", 21)).status, HealthStatus::Degraded);
        assert_eq!(analyzer.analyze(&repeat("WARN slow", 20)).status, HealthStatus::Healthy);
    }

    #[test]
    fn test_cpu_over_threshold_is_warning() {
        let analyzer = HealthAnalyzer::default();
        let report = analyzer.analyze(&lines(&[r#"{"cpu": 90, "memory": 40}"#, "all good"]));
        assert_eq!(report.error_count, 0);
        assert_eq!(report.cpu, 90.0);
        assert_eq!(report.status, HealthStatus::Warning);

        let report = analyzer.analyze(&lines(&[r#"{"cpu": 85}"#]));
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_critical_counts_as_error_and_malformed_json_is_skipped() {
        let analyzer = HealthAnalyzer::default();
        let report = analyzer.analyze(&lines(&["CRITICAL disk", "{not json", r#"[1,2]"#, r#"{"memory": "high"}"#]));
        assert_eq!(report.error_count, 1);
        assert_eq!(report.memory, 0.0);
    }

    #[test]
    fn test_warning_line_counts_once() {
        let analyzer = HealthAnalyzer::default();
        let report = analyzer.analyze(&lines(&["WARNING: latency"]));
        assert_eq!(report.warning_count, 1);
    }

    #[test]
    fn test_service_down_on_crash() {
        let analyzer = HealthAnalyzer::default();
        let events = lines(&[r#"{"level":"CRITICAL","event":"SERVICE_CRASH","service":"web-api"}"#]);
        let services = analyzer.service_status(&events);
        assert_eq!(services["web-api"], ServiceStatus::Down);
        assert_eq!(services["database"], ServiceStatus::Up);
        assert_eq!(services.len(), 5);
    }

    #[test]
    fn test_service_degraded_on_errors() {
        let analyzer = HealthAnalyzer::default();
        let events = repeat("ERROR timeout talking to database", 6);
        let services = analyzer.service_status(&events);
        assert_eq!(services["database"], ServiceStatus::Degraded);
        let events = repeat("ERROR timeout talking to database", 5);
        assert_eq!(analyzer.service_status(&events)["database"], ServiceStatus::Up);
    }

    #[test]
    fn test_window_is_bounded() {
        let log = MemoryEventLog::new();
        for _ in 0..80 {
            log.append(LogGroup::Faults, "ERROR a").unwrap();
            log.append(LogGroup::Metrics, "ok").unwrap();
        }
        let analyzer = HealthAnalyzer::default();
        let window = analyzer.window(&log);
        assert_eq!(window.len(), 100);
    }

    #[test]
    fn test_window_drops_stale_events() {
        let log = MemoryEventLog::new();
        log.push(LogEvent {
            group: LogGroup::Faults,
            timestamp_ms: 1_000,
            message: "SERVICE_CRASH web-api".to_string(),
        });
        log.append(LogGroup::Faults, "fresh").unwrap();
        let analyzer = HealthAnalyzer::default();
        let (_, services) = analyzer.assess(&log);
        assert_eq!(services["web-api"], ServiceStatus::Up);

        let keep_all = HealthAnalyzer::new(HealthSettings {
            max_age_secs: 0,
            ..HealthSettings::default()
        });
        let (_, services) = keep_all.assess(&log);
        assert_eq!(services["web-api"], ServiceStatus::Down);
    }

    #[test]
    fn test_empty_window_is_healthy() {
        let analyzer = HealthAnalyzer::default();
        let report = analyzer.analyze(&[]);
        assert!(report.is_healthy());
        assert_eq!(report.window, 0);
    }
}
