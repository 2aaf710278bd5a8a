//! Parameter ranges for randomly drawn faults

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Services a crash or storm may be attributed to
pub const DEFAULT_SERVICES: [&str; 4] = ["web-api", "auth-service", "database", "cache"];

/// Exception names used by the error storm
pub const ERROR_TYPES: [&str; 8] = [
    "DatabaseConnectionTimeout",
    "NullPointerException",
    "OutOfMemoryError",
    "FileNotFoundException",
    "NetworkTimeoutException",
    "AuthenticationFailure",
    "RateLimitExceeded",
    "ServiceUnavailable",
];

/// Exit codes reported by a crashed service
pub const CRASH_EXIT_CODES: [i32; 4] = [1, 137, 139, 255];

/// Maximum events emitted per storm batch
pub const STORM_BATCH_LIMIT: u32 = 50;

/// Inclusive integer range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub min: u64,
    pub max: u64,
}

impl Span {
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub const fn fixed(value: u64) -> Self {
        Self::new(value, value)
    }

    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        if self.min >= self.max {
            self.min
        } else {
            rng.gen_range(self.min..=self.max)
        }
    }
}

/// How large and how long injected faults are
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultProfile {
    pub cpu_secs: Span,
    pub storm_rate: Span,
    pub storm_secs: Span,
    pub memory_mb: u64,
    pub memory_secs: u64,
    pub disk_mb: u64,
    pub disk_path: PathBuf,
    pub services: Vec<String>,
    /// Upper bound on waiting for CPU workers during cleanup
    pub join_timeout_ms: u64,
}

impl Default for FaultProfile {
    fn default() -> Self {
        Self {
            cpu_secs: Span::new(30, 90),
            storm_rate: Span::new(50, 200),
            storm_secs: Span::new(30, 90),
            memory_mb: 500,
            memory_secs: 120,
            disk_mb: 1000,
            disk_path: PathBuf::from("./logs"),
            services: DEFAULT_SERVICES.iter().map(|s| s.to_string()).collect(),
            join_timeout_ms: 2000,
        }
    }
}

impl FaultProfile {
    /// Zero-length, tiny faults for tests and dry runs
    pub fn instant() -> Self {
        Self {
            cpu_secs: Span::fixed(0),
            storm_rate: Span::fixed(1),
            storm_secs: Span::fixed(0),
            memory_mb: 1,
            memory_secs: 0,
            disk_mb: 1,
            join_timeout_ms: 500,
            ..Self::default()
        }
    }

    pub fn pick_service<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        self.services
            .choose(rng)
            .cloned()
            .unwrap_or_else(|| DEFAULT_SERVICES[0].to_string())
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        for (name, span) in [
            ("cpu_secs", self.cpu_secs),
            ("storm_rate", self.storm_rate),
            ("storm_secs", self.storm_secs),
        ] {
            if !span.is_valid() {
                return Err(format!("faults.{}: min {} > max {}", name, span.min, span.max));
            }
        }
        if self.services.is_empty() {
            return Err("faults.services must name at least one service".to_string());
        }
        Ok(())
    }
}
