//! Retry with exponential backoff for remote calls
//!
//! The control flow is an explicit state machine (see [`RetryState`]) and
//! sleeping is delegated to a caller-supplied function, so tests can drive
//! it without real time passing.

use std::time::Duration;

use crate::error::RemoteError;

/// Upper bound for a single backoff delay
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Exponential backoff: `base * 2^(attempt-1)` (1s, 2s, 4s, ... for a 1s base),
/// capped at [`MAX_BACKOFF`].
pub fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    let exp = attempt.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exp)
        .map_or(MAX_BACKOFF, |d| d.min(MAX_BACKOFF))
}

/// States of a retried call. Attempt numbers are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting(u32),
    Backoff(u32),
    Failed,
    Succeeded,
}

impl RetryState {
    /// Transition after attempt `attempt` failed.
    pub fn after_failure(attempt: u32, retryable: bool, max_retries: u32) -> Self {
        if retryable && attempt <= max_retries {
            Self::Backoff(attempt)
        } else {
            Self::Failed
        }
    }
}

/// A call that gave up: the last error and how many attempts were made.
#[derive(Debug)]
pub struct GaveUp {
    pub error: RemoteError,
    pub attempts: u32,
}

/// Retry configuration: at most `max_retries` retries after the first attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Run `attempt_fn` until it succeeds, fails non-retryably, or retries run out.
    ///
    /// `sleep` is called with each backoff delay.
    pub fn run<T>(
        &self,
        label: &str,
        mut sleep: impl FnMut(Duration),
        mut attempt_fn: impl FnMut() -> Result<T, RemoteError>,
    ) -> Result<T, GaveUp> {
        let mut state = RetryState::Attempting(1);
        let mut value = None;
        let mut last_error = None;
        let mut attempts = 0u32;

        loop {
            state = match state {
                RetryState::Attempting(n) => {
                    attempts = n;
                    match attempt_fn() {
                        Ok(v) => {
                            value = Some(v);
                            RetryState::Succeeded
                        }
                        Err(e) => {
                            let next = RetryState::after_failure(n, e.is_retryable(), self.max_retries);
                            if let RetryState::Backoff(_) = next {
                                log::warn!(
                                    "{label}: attempt {n}/{} failed: {e}, retrying...",
                                    self.max_retries + 1
                                );
                            } else {
                                log::error!("{label}: failed permanently after {n} attempt(s): {e}");
                            }
                            last_error = Some(e);
                            next
                        }
                    }
                }
                RetryState::Backoff(n) => {
                    sleep(backoff_delay(n, self.base_delay));
                    RetryState::Attempting(n + 1)
                }
                RetryState::Succeeded => {
                    if let Some(v) = value {
                        return Ok(v);
                    }
                    RetryState::Failed
                }
                RetryState::Failed => {
                    let error = last_error
                        .unwrap_or_else(|| RemoteError::fatal(format!("{label}: no attempt made")));
                    return Err(GaveUp { error, attempts });
                }
            };
        }
    }
}
