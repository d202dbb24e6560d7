//! Empty-queue polling backoff.

use std::time::Duration;

/// Doubling delay for consecutive empty polls, capped, reset on work.
///
/// With the defaults the schedule is 100ms, 200ms, 400ms, 800ms, 1.6s,
/// then 2s for every further empty poll.
#[derive(Debug, Clone)]
pub struct PollBackoff {
    min: Duration,
    max: Duration,
    empty_streak: u32,
}

impl PollBackoff {
    /// Create a backoff between `min` and `max`.
    #[must_use]
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            empty_streak: 0,
        }
    }

    /// Record an empty poll and return how long to sleep.
    pub fn on_empty(&mut self) -> Duration {
        let shift = self.empty_streak.min(16);
        self.empty_streak = self.empty_streak.saturating_add(1);
        self.min
            .checked_mul(1 << shift)
            .map_or(self.max, |d| d.min(self.max))
    }

    /// Record a non-empty poll.
    pub const fn reset(&mut self) {
        self.empty_streak = 0;
    }

    /// Consecutive empty polls so far.
    #[must_use]
    pub const fn empty_streak(&self) -> u32 {
        self.empty_streak
    }
}

impl Default for PollBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(2))
    }
}
