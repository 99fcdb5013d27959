//! Reconnect Backoff
//!
//! Capped exponential delay between reconnection attempts:
//! `delay = min(base * 2^attempt, max)`.
//!
//! Deterministic (no jitter) so delay sequences can be asserted exactly.

use std::time::Duration;

/// Default base delay (1 second).
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default delay cap (30 seconds).
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default number of automatic attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Failures tolerated before giving up.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Backoff calculator.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    /// Create a calculator at attempt 0.
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay for a given attempt number, without advancing.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        // 2^31 seconds is far past any sane cap; clamp the shift to avoid overflow.
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.config
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.config.max_delay)
            .min(self.config.max_delay)
    }

    /// Register a failure. Returns the delay to wait, or `None` once
    /// `max_attempts` failures have been exceeded.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let delay = self.delay_for(self.attempt);
        self.attempt += 1;
        Some(delay)
    }

    /// Reset on successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Failures registered since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// True when no retries remain.
    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.config.max_attempts
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}
