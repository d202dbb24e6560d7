//! Reconnection Policy with Linear Backoff

use std::time::Duration;

/// Linear backoff: `min(base * attempt, cap)`, bounded attempt count.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt.
    base_delay: Duration,
    /// Maximum delay between attempts.
    max_delay: Duration,
    /// Maximum attempts before giving up.
    max_attempts: u32,
    /// Attempts made so far.
    current_attempt: u32,
}

impl ReconnectPolicy {
    /// Create with custom parameters.
    #[must_use]
    pub const fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
            current_attempt: 0,
        }
    }

    /// Delay before the next attempt, advancing the attempt count.
    ///
    /// Returns `None` once max attempts have been used.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.current_attempt >= self.max_attempts {
            return None;
        }
        self.current_attempt += 1;
        Some(self.delay_for(self.current_attempt))
    }

    /// Delay for a given 1-based attempt number.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(attempt)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.current_attempt = 0;
    }

    /// Get the current attempt count.
    #[must_use]
    pub const fn current_attempt(&self) -> u32 {
        self.current_attempt
    }

    /// Get the maximum attempts allowed.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(300), 50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_linearly_then_caps() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(2), Duration::from_secs(10));
        assert_eq!(policy.delay_for(60), Duration::from_secs(300));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn exhausts_after_max_attempts() {
        let mut policy =
            ReconnectPolicy::new(Duration::from_millis(100), Duration::from_secs(1), 3);

        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(300)));
        assert_eq!(policy.next_delay(), None);
        assert_eq!(policy.current_attempt(), 3);

        policy.reset();
        assert_eq!(policy.current_attempt(), 0);
        assert!(policy.next_delay().is_some());
    }
}
