//! Retry classification and jittered exponential backoff.

use crate::SinkError;
use rand::Rng;
use std::time::Duration;

/// HTTP statuses worth retrying. Everything else is terminal.
const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Decides whether a failed send should be retried and how long to wait
/// between attempts.
///
/// Delays grow as `initial * factor^(attempt - 1)` with symmetric jitter,
/// clamped to `[initial, max]`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on the computed delay.
    pub max_delay: Duration,
    /// Exponential growth factor.
    pub factor: f64,
    /// Fraction of the un-jittered delay used as symmetric jitter.
    pub jitter: f64,
    /// Maximum attempts for the single-event send path.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
            factor: 2.0,
            jitter: 0.2,
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Whether an HTTP status is worth another attempt.
    pub fn is_retryable_status(status: u16) -> bool {
        RETRYABLE_STATUSES.contains(&status)
    }

    /// Whether the given delivery error is worth another attempt.
    ///
    /// Transport-level failures are retryable; a missing-network answer is
    /// not (it never consumed an attempt in the first place).
    pub fn should_retry(&self, error: &SinkError) -> bool {
        match error {
            SinkError::Http { status, .. } => Self::is_retryable_status(*status),
            SinkError::Transport(_) => true,
            SinkError::NoConnectivity | SinkError::Json(_) => false,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        let initial_ms = self.initial_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let exponent = attempt.saturating_sub(1).min(63);
        let exponential = initial_ms * self.factor.powi(exponent as i32);

        let jitter = exponential * self.jitter * rand::thread_rng().gen_range(-1.0..=1.0);
        let delayed = (exponential + jitter).clamp(initial_ms, max_ms);

        Duration::from_millis(delayed as u64)
    }
}
