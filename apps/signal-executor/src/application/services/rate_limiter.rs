//! Process-wide minimum spacing between broker submissions.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces `1 / max_per_second` between consecutive `acquire` calls.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Limit to `max_per_second` acquisitions per second.
    ///
    /// A rate of zero disables limiting.
    #[must_use]
    pub fn per_second(max_per_second: u32) -> Self {
        let min_interval = if max_per_second == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / max_per_second
        };
        Self::with_interval(min_interval)
    }

    /// Limit to one acquisition per `min_interval`.
    #[must_use]
    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    /// Spacing enforced between acquisitions.
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the next slot is free, then take it.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            if Instant::now() < ready_at {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn submissions_are_spaced_by_the_rate() {
        let limiter = RateLimiter::per_second(10);
        assert_eq!(limiter.min_interval(), Duration::from_millis(100));

        let mut stamps = Vec::new();
        for _ in 0..3 {
            limiter.acquire().await;
            stamps.push(Instant::now());
        }

        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_acquire_does_not_wait() {
        let limiter = RateLimiter::per_second(1);
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn limit_is_shared_across_callers() {
        let limiter = Arc::new(RateLimiter::per_second(10));
        let start = Instant::now();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut stamps = Vec::new();
        for handle in handles {
            stamps.push(handle.await.unwrap());
        }
        stamps.sort();

        assert!(stamps[2] - start >= Duration::from_millis(200));
    }

    #[test]
    fn zero_rate_disables_spacing() {
        assert_eq!(RateLimiter::per_second(0).min_interval(), Duration::ZERO);
    }
}
