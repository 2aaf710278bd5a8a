//! Bounded retry with exponential backoff for oracle transports
//!
//! Only transient errors (`HealError::is_transient`) are retried; the delay
//! doubles per attempt, is capped, and carries ±25% jitter.

use crate::errors::{HealError, Result};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Default attempts including the first
pub const MAX_ATTEMPTS: u32 = 3;

const BASE_DELAY_MS: u64 = 500;

const MAX_DELAY_MS: u64 = 8000;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    enable_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: BASE_DELAY_MS,
            max_delay_ms: MAX_DELAY_MS,
            enable_jitter: true,
        }
    }

    /// Fixed, tiny delays for tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: 1,
            max_delay_ms: 1,
            enable_jitter: false,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn run<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() || attempt >= self.max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    debug!(attempt, error = %e, ?delay, "Retrying oracle call");
                    sleep(delay).await;
                }
            }
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        let delay_ms = exponential.min(self.max_delay_ms);

        let final_ms = if self.enable_jitter {
            let jitter = (delay_ms / 4) as i64;
            let offset = ((rand::random::<f64>() * 2.0 - 1.0) * jitter as f64) as i64;
            ((delay_ms as i64) + offset).max(0) as u64
        } else {
            delay_ms
        };
        Duration::from_millis(final_ms)
    }
}

/// Shorthand for a transport failure that is worth retrying
pub fn unavailable(reason: impl Into<String>) -> HealError {
    HealError::OracleUnavailable(reason.into())
}
