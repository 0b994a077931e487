//! Bounded retry with exponential backoff
//!
//! The driver knows nothing about what "transient" means; each attempt
//! reports whether its failure is worth retrying via [`AttemptError`].

use crate::engine::transient::is_transient;
use crate::error::{InvowkError, InvowkResult};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Attempt count and base delay for one kind of operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for every later retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Image builds: heavier than runs, so fewer attempts with a longer base
    pub const BUILD: Self = Self {
        max_attempts: 3,
        base_delay: Duration::from_secs(2),
    };

    /// Container runs: races are frequent under parallelism and runs are fast
    pub const RUN: Self = Self {
        max_attempts: 5,
        base_delay: Duration::from_secs(1),
    };

    /// Single attempt, no retries
    pub const NONE: Self = Self {
        max_attempts: 1,
        base_delay: Duration::ZERO,
    };
}

/// A failed attempt and whether the driver should try again
#[derive(Debug)]
pub struct AttemptError {
    pub error: InvowkError,
    pub retry: bool,
}

impl AttemptError {
    /// Failure worth retrying
    pub fn transient(error: InvowkError) -> Self {
        Self { error, retry: true }
    }

    /// Failure that must be returned immediately
    pub fn permanent(error: InvowkError) -> Self {
        Self {
            error,
            retry: false,
        }
    }

    /// Let the failure classifier decide
    pub fn classify(error: InvowkError) -> Self {
        let retry = is_transient(&error);
        Self { error, retry }
    }
}

impl From<InvowkError> for AttemptError {
    fn from(error: InvowkError) -> Self {
        Self::classify(error)
    }
}

/// Delay before attempt `attempt` (1-based retry index): `base * 2^(attempt-1)`
pub fn backoff_delay(base_delay: Duration, attempt: u32) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
    base_delay.saturating_mul(factor)
}

/// Run `operation` up to `max_attempts` times with exponential backoff.
///
/// Attempts are numbered from 0. Before every retry the cancellation token
/// is checked, then the backoff sleep runs (itself interruptible). A success
/// returns immediately; a non-retryable failure returns that error without
/// consuming the remaining attempts; exhausting every attempt returns the
/// last error observed. A `max_attempts` of 0 is treated as 1.
pub async fn run_with_backoff<T, F, Fut>(
    cancel: &CancellationToken,
    max_attempts: u32,
    base_delay: Duration,
    mut operation: F,
) -> InvowkResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let attempts = max_attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            if cancel.is_cancelled() {
                return Err(InvowkError::cancelled(format!(
                    "retry before attempt {}/{}",
                    attempt + 1,
                    attempts
                )));
            }

            let delay = backoff_delay(base_delay, attempt);
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(InvowkError::cancelled(format!(
                        "retry backoff before attempt {}/{}",
                        attempt + 1,
                        attempts
                    )));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(AttemptError {
                error,
                retry: false,
            }) => return Err(error),
            Err(AttemptError { error, retry: true }) => {
                debug!(
                    "Transient failure on attempt {}/{}: {}",
                    attempt + 1,
                    attempts,
                    error
                );
                last_error = Some(error);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| InvowkError::Internal("retry loop made no attempts".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    const TEST_DELAY: Duration = Duration::from_millis(10);

    #[test]
    fn backoff_doubles() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::ZERO);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(400));
    }

    #[test]
    fn backoff_saturates() {
        let delay = backoff_delay(Duration::from_secs(1), 64);
        assert!(delay >= Duration::from_secs(u64::from(u32::MAX)));
    }

    #[tokio::test]
    async fn exhausted_retries_return_last_error() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: InvowkResult<()> = run_with_backoff(&cancel, 3, TEST_DELAY, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Err(AttemptError::transient(InvowkError::Internal(format!(
                    "failure {}",
                    attempt
                ))))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Internal error: failure 2");
    }

    #[tokio::test]
    async fn permanent_failure_short_circuits() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: InvowkResult<()> = run_with_backoff(&cancel, 3, TEST_DELAY, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AttemptError::permanent(InvowkError::User("nope".to_string()))) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(InvowkError::User(ref m)) if m == "nope"));
    }

    #[tokio::test]
    async fn cancellation_during_attempt_stops_retries() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: InvowkResult<()> = run_with_backoff(&cancel, 3, TEST_DELAY, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            cancel.cancel();
            async { Err(AttemptError::transient(InvowkError::Internal("race".to_string()))) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(InvowkError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn success_after_transient_failures() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result = run_with_backoff(&cancel, 5, Duration::from_millis(1), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(AttemptError::transient(InvowkError::Internal("flaky".to_string())))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result = run_with_backoff(&cancel, 0, TEST_DELAY, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, AttemptError>("done") }
        })
        .await
        .unwrap();

        assert_eq!(result, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn from_classifies() {
        let err: AttemptError = InvowkError::command_exec("podman run", "ping_group_range").into();
        assert!(err.retry);
        let err: AttemptError = InvowkError::cancelled("run").into();
        assert!(!err.retry);
    }
}
