//! Reconnection policy
//!
//! After a transport drop the client resynchronizes with quadratically
//! growing delays, bounded both by an attempt count and by wall-clock time.
//! Whichever bound trips first ends the recovery and tears the client down.

use std::time::Duration;

use crate::config::ReconnectOptions;

/// Bounded quadratic backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    max_total: Duration,
    backoff_step: Duration,
}

impl RetryPolicy {
    /// Build the policy from configuration
    pub fn new(options: &ReconnectOptions) -> Self {
        Self {
            max_attempts: options.max_attempts,
            max_total: Duration::from_secs(options.max_total_secs),
            backoff_step: Duration::from_millis(options.backoff_step_ms),
        }
    }

    /// Delay before the given attempt, counted from zero
    ///
    /// Attempt n waits n squared times the step: 0, step, 4x, 9x and so on.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt * attempt
    }

    /// Check whether another attempt is allowed
    pub fn exhausted(&self, attempt: u32, elapsed: Duration) -> bool {
        attempt >= self.max_attempts || elapsed >= self.max_total
    }

    /// Attempt bound
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
