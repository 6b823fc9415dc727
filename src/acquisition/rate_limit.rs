//! Per-source request admission.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::debug;

/// Token bucket allowing `capacity` requests per `window` to one remote source.
///
/// Replenishment is computed from elapsed time whenever a caller checks in;
/// no background timer runs. The limiter is shared across concurrent
/// resolutions and keeps its accounting in atomics.
pub struct SourceRateLimiter {
    label: String,
    capacity: NonZeroU32,
    window: Duration,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl SourceRateLimiter {
    pub fn new(label: impl Into<String>, capacity: u32, window: Duration) -> Self {
        let capacity = NonZeroU32::new(capacity).unwrap_or(NonZeroU32::MIN);
        let period = window / capacity.get();
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(capacity))
            .allow_burst(capacity);
        Self {
            label: label.into(),
            capacity,
            window,
            limiter: RateLimiter::direct(quota),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn capacity(&self) -> u32 {
        self.capacity.get()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Takes a token if one is available right now.
    pub fn try_admit(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Waits until a token is available, then takes it.
    pub async fn admit(&self) {
        if self.try_admit() {
            return;
        }
        debug!(
            "RateLimit[{}]: bucket empty ({} per {:?}), waiting for refill",
            self.label, self.capacity, self.window
        );
        self.limiter.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;

    #[test]
    fn test_burst_up_to_capacity_then_denies() {
        let limiter = SourceRateLimiter::new("structured", 3, Duration::from_secs(60));
        assert!(limiter.try_admit());
        assert!(limiter.try_admit());
        assert!(limiter.try_admit());
        assert!(!limiter.try_admit());
    }

    #[test]
    fn test_zero_capacity_is_treated_as_one() {
        let limiter = SourceRateLimiter::new("structured", 0, Duration::from_secs(60));
        assert_eq!(limiter.capacity(), 1);
        assert!(limiter.try_admit());
        assert!(!limiter.try_admit());
    }

    #[tokio::test]
    async fn test_admit_waits_for_refill() {
        let limiter = SourceRateLimiter::new("scraped", 1, Duration::from_millis(80));
        limiter.admit().await;
        let started = Instant::now();
        limiter.admit().await;
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_bucket() {
        let limiter = Arc::new(SourceRateLimiter::new(
            "structured",
            4,
            Duration::from_secs(60),
        ));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move { limiter.admit().await }));
        }
        for handle in handles {
            handle.await.expect("admit task should finish");
        }
        assert!(!limiter.try_admit());
    }
}
