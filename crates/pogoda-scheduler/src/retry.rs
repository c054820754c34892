//! Bounded retry policy for daily deliveries.
//!
//! Retries are not loops with sleeps: a failed attempt stores the instant
//! of its next eligibility, and a later tick claims it. The policy only
//! answers "how many" and "how long until the next one".

use chrono::TimeDelta;
use pogoda_core::config::{BackoffKind, SchedulerConfig};
use std::time::Duration;

/// Upper bound on a single backoff step.
pub const MAX_BACKOFF: Duration = Duration::from_secs(6 * 3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed per user per day, the first one included.
    pub max_attempts: u32,
    pub base: Duration,
    pub kind: BackoffKind,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3, Duration::from_secs(60))
    }
}

impl RetryPolicy {
    pub fn exponential(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            base,
            kind: BackoffKind::Exponential,
        }
    }

    pub fn linear(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            base,
            kind: BackoffKind::Linear,
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base: Duration::from_secs(config.retry_backoff_secs),
            kind: config.backoff,
        }
    }

    /// Wait after the `attempt`-th failure (1-based) before trying again.
    pub fn delay_after(&self, attempt: u32) -> TimeDelta {
        let attempt = attempt.max(1);
        let base_ms = self.base.as_millis() as u64;
        let ms = match self.kind {
            BackoffKind::Linear => base_ms.saturating_mul(attempt as u64),
            BackoffKind::Exponential => {
                base_ms.saturating_mul(2u64.saturating_pow(attempt - 1))
            }
        };
        let capped = ms.min(MAX_BACKOFF.as_millis() as u64);
        TimeDelta::milliseconds(capped as i64)
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn allows_another(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}
