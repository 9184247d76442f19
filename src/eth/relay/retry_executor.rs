use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::Level;

use crate::GlobalState;
use crate::eth::relay::SubmitError;
use crate::event_with;
use crate::ext::DisplayExt;
use crate::ext::SleepReason;
use crate::ext::traced_sleep;
use crate::infra::tracing::warn_task_cancellation;

#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    /// The destination already applied the transfer. Not retried.
    #[error("{label}: {reason}")]
    AlreadyApplied { label: String, reason: SubmitError },

    /// Retry budget exhausted.
    #[error("{label}: submission failed after {attempts} attempts: {last}")]
    SubmissionFailed { label: String, attempts: u32, last: SubmitError },

    /// Cancelled while waiting for the next attempt. The outcome of the transfer is unknown.
    #[error("{label}: submission interrupted after {attempts} attempts: {last}")]
    Interrupted { label: String, attempts: u32, last: SubmitError },
}

/// Bounded retries with linear backoff (`attempt * base_delay`).
///
/// Backoff waits end early when the cancellation token fires, which defaults to application shutdown.
#[derive(Debug, Clone, derive_new::new)]
pub struct RetryExecutor {
    max_attempts: u32,
    base_delay: Duration,
    #[new(value = "GlobalState::shutdown_child_token()")]
    cancellation: CancellationToken,
}

impl RetryExecutor {
    /// Replaces the token that interrupts backoff waits.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before the attempt that follows `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Executes `submit` until it succeeds, fails with a terminal error, or the attempts are exhausted.
    ///
    /// `submit` receives the 1-based attempt number.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut submit: F) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, SubmitError>>,
    {
        const TASK_NAME: &str = "relay::retry-executor";
        let max_attempts = self.max_attempts();

        let mut attempt = 1;
        loop {
            let e = match submit(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(%label, %attempt, "submission succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if e.is_terminal() {
                tracing::info!(%label, %attempt, reason = %e, "submission not needed because transfer was already applied");
                return Err(RetryError::AlreadyApplied {
                    label: label.to_owned(),
                    reason: e,
                });
            }

            let exhausted = attempt >= max_attempts;
            let level = if exhausted { Level::ERROR } else { Level::WARN };
            event_with!(level, %label, %attempt, %max_attempts, class = %e.class(), reason = %e, "submission attempt failed");
            if exhausted {
                return Err(RetryError::SubmissionFailed {
                    label: label.to_owned(),
                    attempts: attempt,
                    last: e,
                });
            }

            let delay = self.backoff(attempt);
            tracing::debug!(%label, delay = %delay.to_string_ext(), "waiting before next submission attempt");
            let interrupted = tokio::select! {
                _ = traced_sleep(delay, SleepReason::RetryBackoff) => false,
                _ = self.cancellation.cancelled() => true,
            };
            if interrupted {
                warn_task_cancellation(TASK_NAME);
                return Err(RetryError::Interrupted {
                    label: label.to_owned(),
                    attempts: attempt,
                    last: e,
                });
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;

    use super::*;

    fn executor() -> RetryExecutor {
        RetryExecutor::new(5, Duration::from_secs(1))
    }

    #[test]
    fn backoff_is_linear() {
        let executor = executor();
        assert_eq!(executor.backoff(1), Duration::from_secs(1));
        assert_eq!(executor.backoff(4), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_fifth_attempt_after_four_failures() {
        let calls = AtomicU32::new(0);
        let result = executor()
            .execute("mint", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 5 {
                        Err(SubmitError::Transient("timeout".to_owned()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn fails_after_five_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = executor()
            .execute("mint", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SubmitError::Rejected("execution reverted".to_owned())) }
            })
            .await;

        assert!(matches!(result, Err(RetryError::SubmissionFailed { attempts: 5, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn already_applied_is_returned_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = executor()
            .execute("release", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SubmitError::AlreadyApplied("already processed".to_owned())) }
            })
            .await;

        assert!(matches!(result, Err(RetryError::AlreadyApplied { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_interrupts_retries() {
        let cancellation = CancellationToken::new();
        let executor = executor().with_cancellation(cancellation.clone());
        let calls = AtomicU32::new(0);

        let cancel = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            cancellation.cancel();
        });
        let result: Result<(), _> = executor
            .execute("mint", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SubmitError::Transient("timeout".to_owned())) }
            })
            .await;
        cancel.await.unwrap();

        assert!(matches!(result, Err(RetryError::Interrupted { attempts: 2, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let result = RetryExecutor::new(0, Duration::ZERO).execute("mint", |attempt| async move { Ok::<_, SubmitError>(attempt) }).await;
        assert_eq!(result.unwrap(), 1);
    }
}
