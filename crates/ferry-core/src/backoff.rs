//! Retry backoff policy

use std::time::Duration;

use crate::util::duration_millis;

/// Default retry table, attempt 1 through 5.
pub const DEFAULT_RETRY_INTERVALS_SECS: [u64; 5] = [1, 5, 15, 30, 60];

/// Default upper bound for any single delay.
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Maps a failed attempt count to the delay before the next attempt.
///
/// The table is made non-decreasing at construction time and every value is
/// capped at `max_delay`, so `delay_for` is monotonic and bounded for any
/// input. Attempts past the end of the table repeat its last entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    intervals: Vec<Duration>,
    max_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(intervals: impl IntoIterator<Item = Duration>, max_delay: Duration) -> Self {
        let mut floor = Duration::ZERO;
        let intervals = intervals
            .into_iter()
            .map(|interval| {
                floor = floor.max(interval.min(max_delay));
                floor
            })
            .collect();

        Self {
            intervals,
            max_delay,
        }
    }

    /// Build from whole-second intervals.
    pub fn from_secs(intervals: &[u64], max_delay_secs: u64) -> Self {
        Self::new(
            intervals.iter().copied().map(Duration::from_secs),
            Duration::from_secs(max_delay_secs),
        )
    }

    /// Delay after `attempts` failed attempts (1-based; 0 is treated as 1).
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let index = usize::try_from(attempts.max(1) - 1).unwrap_or(usize::MAX);
        self.intervals
            .get(index)
            .or_else(|| self.intervals.last())
            .copied()
            .unwrap_or(self.max_delay)
    }

    /// `delay_for` in milliseconds, for timestamp arithmetic.
    pub fn delay_millis(&self, attempts: u32) -> i64 {
        duration_millis(self.delay_for(attempts))
    }

    pub const fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_secs(
            &DEFAULT_RETRY_INTERVALS_SECS,
            DEFAULT_MAX_RETRY_DELAY.as_secs(),
        )
    }
}
