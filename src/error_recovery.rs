// src/error_recovery.rs
//! Retry with exponential backoff for API operations.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// How hard a fetch is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Never zero.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::constants::DEFAULT_RETRY_LIMIT,
            base_delay: crate::constants::DEFAULT_BASE_DELAY,
            max_delay: crate::constants::DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// `base_delay * 2^(attempt-1)`, capped at `max_delay`.
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Sleep before the retry that follows failed attempt `attempt`.
    ///
    /// A server-provided `Retry-After` wins over the computed backoff; both
    /// are capped at `max_delay`. Computed delays are jittered into
    /// `[ceiling/2, ceiling]`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint.min(self.max_delay);
        }
        let ceiling = self.backoff_ceiling(attempt);
        let ceiling_micros = ceiling.as_micros() as u64;
        if ceiling_micros < 2 {
            return ceiling;
        }
        let jittered = rand::rng().random_range(ceiling_micros / 2..=ceiling_micros);
        Duration::from_micros(jittered)
    }
}

/// Outcome of one failed attempt, as classified by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// Worth retrying: 429, 408, 5xx, connect errors, timeouts.
    Transient {
        status: Option<u16>,
        message: String,
        retry_after: Option<Duration>,
    },
    /// Retrying would not change the answer.
    Permanent { status: Option<u16>, message: String },
}

impl AttemptFailure {
    pub fn status(&self) -> Option<u16> {
        match self {
            AttemptFailure::Transient { status, .. } | AttemptFailure::Permanent { status, .. } => {
                *status
            }
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AttemptFailure::Transient { message, .. } | AttemptFailure::Permanent { message, .. } => {
                message
            }
        }
    }
}

/// The operation gave up; `last` is the failure that ended it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
    pub last: AttemptFailure,
    pub attempts: u32,
}

/// Retries an async operation with exponential backoff.
///
/// Permanent failures return immediately. Transient ones are retried until
/// `policy.max_attempts` attempts have been made.
pub async fn retry_with_backoff<F, T, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptFailure>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(failure @ AttemptFailure::Permanent { .. }) => {
                return Err(RetryFailure {
                    last: failure,
                    attempts: attempt,
                });
            }
            Err(failure) => {
                if attempt >= max_attempts {
                    return Err(RetryFailure {
                        last: failure,
                        attempts: attempt,
                    });
                }

                let retry_after = match &failure {
                    AttemptFailure::Transient { retry_after, .. } => *retry_after,
                    AttemptFailure::Permanent { .. } => None,
                };
                let delay = policy.delay_for(attempt, retry_after);
                log::warn!(
                    "Attempt {}/{} failed ({}), retrying after {:?}",
                    attempt,
                    max_attempts,
                    failure.message(),
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
