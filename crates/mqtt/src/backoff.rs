//! Exponential backoff for broker reconnection.
//!
//! The delay grows geometrically and is clamped to a ceiling:
//!
//! ```text
//! delay[n] = min(initial * multiplier^(n-1), max_delay)
//! ```
//!
//! With the defaults (initial=1s, multiplier=1.5, max=60s):
//! - Attempt 1: wait 1.0s
//! - Attempt 2: wait 1.5s
//! - Attempt 3: wait 2.25s
//! - ...
//! - Attempt 11+: wait 60s (capped)
//!
//! Unlike a give-up policy, the default schedule never runs out: once the cap
//! is reached every further attempt waits `max_delay`. A hard attempt limit can
//! be set explicitly with [`Backoff::set_max_attempts`].

use std::time::Duration;

use thiserror::Error;

/// Error type for backoff exhaustion.
#[derive(Debug, Error)]
pub enum BackoffError {
    /// The explicit attempt limit was reached.
    #[error("Maximum number of attempts exceeded: {0}")]
    MaxAttemptLimitError(u32),
}

/// Exponential backoff controller for connection retry logic.
///
/// Each failed connection attempt advances the schedule; a successful
/// connection calls [`Backoff::reset`] so the next outage starts from the
/// initial delay again.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial_delay: Duration,
    current_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    attempt: u32,
    /// `None` retries forever.
    max_attempts: Option<u32>,
}

impl Backoff {
    /// Creates a new backoff controller.
    ///
    /// A `multiplier` below 1.0 is clamped to 1.0 (constant delay) so the
    /// schedule can never shrink.
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        let max = max.max(initial);
        Self {
            initial_delay: initial,
            current_delay: initial,
            max_delay: max,
            multiplier: multiplier.max(1.0),
            attempt: 0,
            max_attempts: None,
        }
    }

    /// Sets an explicit maximum number of attempts.
    ///
    /// `0` is treated as "unlimited", matching the `max_reconnect_attempts`
    /// configuration key.
    pub fn set_max_attempts(&mut self, max: u32) {
        self.max_attempts = if max == 0 { None } else { Some(max) };
    }

    /// Builder-style variant of [`Backoff::set_max_attempts`].
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.set_max_attempts(max);
        self
    }

    /// Resets the schedule after a successful connection.
    pub fn reset(&mut self) {
        self.current_delay = self.initial_delay;
        self.attempt = 0;
    }

    /// Returns the next sleep duration and advances the schedule.
    ///
    /// # Errors
    /// `BackoffError::MaxAttemptLimitError` once an explicit attempt limit has
    /// been exceeded. Without a limit this never fails.
    pub fn next_sleep(&mut self) -> Result<Duration, BackoffError> {
        self.attempt = self.attempt.saturating_add(1);

        if let Some(limit) = self.max_attempts {
            if self.attempt > limit {
                return Err(BackoffError::MaxAttemptLimitError(limit));
            }
        }

        let sleep = self.current_delay;

        let next_delay_secs = self.current_delay.as_secs_f64() * self.multiplier;
        self.current_delay = Duration::from_secs_f64(next_delay_secs).min(self.max_delay);

        Ok(sleep)
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Number of attempts since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }
}

impl Default for Backoff {
    /// 1s initial delay, 60s ceiling, 50% growth, unlimited attempts.
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60), 1.5)
    }
}
