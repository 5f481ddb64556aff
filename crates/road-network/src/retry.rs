//! Per-call retry with exponential backoff for transient routing failures.
//!
//! Connection errors, timeouts, HTTP 429 and HTTP 5xx are retried; every
//! other failure (4xx, "no route", unparseable body) is permanent and is
//! returned on the first attempt.

use crate::{Result, RoutingError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Retry settings applied to every single routing call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = try once)
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each subsequent retry
    pub base_delay_ms: u64,
    /// Upper bound on any single backoff delay
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 250,
            max_delay_ms: 4_000,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let millis = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out
    pub fn run<T, F>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries && is_transient(&err) => {
                    let delay = self.delay_for(attempt);
                    attempt += 1;
                    warn!(
                        "Routing call failed (retry {}/{} in {:?}): {}",
                        attempt, self.max_retries, delay, err
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Whether a failure is worth another attempt
pub fn is_transient(err: &RoutingError) -> bool {
    match err {
        RoutingError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        RoutingError::Status(code) => *code == 429 || (500..600).contains(code),
        RoutingError::NoRoute(..) | RoutingError::InvalidResponse(_) => false,
    }
}
