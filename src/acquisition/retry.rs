//! Bounded retry with classified backoff.

use std::future::Future;
use std::time::Duration;

use log::info;
use tokio::time::Instant;

use crate::error::{RetryClass, SourceError};

/// Retry budget and delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Base for exponential backoff after a rate-limit response.
    pub base_delay: Duration,
    /// Fixed delay after a transient failure.
    pub transient_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            transient_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
        }
    }
}

/// One scheduled retry, reported to observers before sleeping.
#[derive(Debug, Clone, Copy)]
pub struct RetryEvent<'a> {
    /// The attempt that just failed, starting at 1.
    pub attempt: u32,
    pub delay: Duration,
    pub error: &'a SourceError,
}

fn random_jitter(bound: Duration) -> Duration {
    let bound_nanos = bound.as_nanos().min(u128::from(u64::MAX)) as u64;
    if bound_nanos == 0 {
        return Duration::ZERO;
    }
    let mut bytes = [0u8; 8];
    if getrandom::fill(&mut bytes).is_err() {
        return Duration::ZERO;
    }
    Duration::from_nanos(u64::from_le_bytes(bytes) % bound_nanos)
}

/// Runs fallible source calls under a [`RetryPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Delay before retrying after `attempt` (1-based) failed with `class`;
    /// `None` when the failure must not be retried.
    ///
    /// Rate-limit delays are `base * 2^(attempt - 1)` plus jitter below `base`,
    /// so consecutive delays strictly increase until they reach `max_delay`.
    pub fn backoff_delay(&self, class: RetryClass, attempt: u32) -> Option<Duration> {
        match class {
            RetryClass::Terminal => None,
            RetryClass::Transient => Some(self.policy.transient_delay.min(self.policy.max_delay)),
            RetryClass::RateLimited => {
                let exponent = attempt.saturating_sub(1).min(16);
                let backoff = self
                    .policy
                    .base_delay
                    .checked_mul(1u32 << exponent)
                    .unwrap_or(self.policy.max_delay);
                let jittered = backoff.saturating_add(random_jitter(self.policy.base_delay));
                Some(jittered.min(self.policy.max_delay))
            }
        }
    }

    pub async fn run<T, F, Fut>(&self, operation: F) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        self.run_observed(operation, log_retry).await
    }

    /// Like [`run`](Self::run), but gives up with the last error instead of
    /// sleeping past `deadline`.
    pub async fn run_until<T, F, Fut>(
        &self,
        deadline: Instant,
        operation: F,
    ) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        self.run_inner(operation, log_retry, Some(deadline)).await
    }

    /// Like [`run`](Self::run), reporting every scheduled retry to `observer`.
    pub async fn run_observed<T, F, Fut, O>(
        &self,
        operation: F,
        observer: O,
    ) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
        O: FnMut(&RetryEvent<'_>),
    {
        self.run_inner(operation, observer, None).await
    }

    async fn run_inner<T, F, Fut, O>(
        &self,
        mut operation: F,
        mut observer: O,
        deadline: Option<Instant>,
    ) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
        O: FnMut(&RetryEvent<'_>),
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1u32;
        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            if attempt >= max_attempts {
                return Err(error);
            }
            let Some(delay) = self.backoff_delay(error.retry_class(), attempt) else {
                return Err(error);
            };
            if deadline.is_some_and(|deadline| Instant::now() + delay >= deadline) {
                info!(
                    "Retry: attempt {} failed ({}), no budget left for a {:?} wait",
                    attempt, error, delay
                );
                return Err(error);
            }
            observer(&RetryEvent {
                attempt,
                delay,
                error: &error,
            });
            tokio::time::sleep(delay).await;
            attempt = attempt.saturating_add(1);
        }
    }
}

fn log_retry(event: &RetryEvent<'_>) {
    info!(
        "Retry: attempt {} failed ({}), retrying in {:?}",
        event.attempt, event.error, event.delay
    );
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn executor(max_attempts: u32) -> RetryExecutor {
        RetryExecutor::new(RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(100),
            transient_delay: Duration::from_millis(30),
            max_delay: Duration::from_secs(60),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_backoff_strictly_increases() {
        let calls = AtomicU32::new(0);
        let mut delays = Vec::new();
        let result: Result<(), SourceError> = executor(5)
            .run_observed(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(SourceError::RateLimited("429".into())) }
                },
                |event| delays.push(event.delay),
            )
            .await;

        assert_eq!(result, Err(SourceError::RateLimited("429".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(delays.len(), 4);
        for pair in delays.windows(2) {
            assert!(pair[1] > pair[0], "delays should increase: {delays:?}");
        }
        assert!(delays[0] >= Duration::from_millis(100));
        assert!(delays[0] < Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_use_fixed_delay_then_succeed() {
        let calls = AtomicU32::new(0);
        let mut delays = Vec::new();
        let result = executor(3)
            .run_observed(
                || {
                    let attempt = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt < 2 {
                            Err(SourceError::Transient("timed out".into()))
                        } else {
                            Ok(attempt)
                        }
                    }
                },
                |event| delays.push(event.delay),
            )
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(
            delays,
            vec![Duration::from_millis(30), Duration::from_millis(30)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), SourceError> = executor(4)
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SourceError::Invalid("400".into())) }
            })
            .await;
        assert_eq!(result, Err(SourceError::Invalid("400".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), SourceError> = executor(2)
            .run(|| {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(SourceError::Transient(format!("attempt {attempt}"))) }
            })
            .await;
        assert_eq!(result, Err(SourceError::Transient("attempt 1".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_retrying_with_last_error() {
        let executor = RetryExecutor::new(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            transient_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(8),
        });
        let calls = AtomicU32::new(0);
        let started = Instant::now();
        let deadline = started + Duration::from_millis(1_200);
        let result: Result<(), SourceError> = executor
            .run_until(deadline, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SourceError::RateLimited("429".into())) }
            })
            .await;

        assert_eq!(result, Err(SourceError::RateLimited("429".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(Instant::now() < deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_policy_fits_default_source_budget() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();
        let result: Result<(), SourceError> = RetryExecutor::default()
            .run_until(started + Duration::from_millis(1_500), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SourceError::RateLimited("429".into())) }
            })
            .await;

        assert_eq!(result, Err(SourceError::RateLimited("429".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() < Duration::from_millis(1_500));
    }

    #[test]
    fn test_backoff_is_capped() {
        let executor = RetryExecutor::new(RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            transient_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(4),
        });
        assert_eq!(
            executor.backoff_delay(RetryClass::RateLimited, 8),
            Some(Duration::from_secs(4))
        );
        assert_eq!(
            executor.backoff_delay(RetryClass::Transient, 1),
            Some(Duration::from_secs(4))
        );
        assert_eq!(executor.backoff_delay(RetryClass::Terminal, 1), None);
    }
}
