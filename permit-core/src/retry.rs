//! Retry backoff schedule for outbound synchronization.

use chrono::{DateTime, Duration, Utc};

/// A fixed sequence of backoff intervals, in seconds.
///
/// Attempt `n` (zero-based) waits `intervals[min(n, len-1)]` before the next
/// try; once every interval has been consumed the unit of work is exhausted
/// and moves to its failed state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrySchedule {
    intervals: Vec<i64>,
}

impl RetrySchedule {
    /// Build a schedule from interval seconds. An empty list degenerates to
    /// a single immediate retry slot.
    pub fn new(intervals: Vec<i64>) -> Self {
        let intervals = if intervals.is_empty() {
            vec![0]
        } else {
            intervals
        };
        Self { intervals }
    }

    /// Interval to wait after the given (zero-based) failed attempt
    pub fn interval_secs(&self, attempt: u32) -> i64 {
        let idx = (attempt as usize).min(self.intervals.len() - 1);
        self.intervals[idx]
    }

    /// Due time of the next try after a failure at `now`
    pub fn next_attempt_at(&self, now: DateTime<Utc>, attempt: u32) -> DateTime<Utc> {
        now + Duration::seconds(self.interval_secs(attempt))
    }

    /// Whether the given number of completed attempts exhausts the schedule
    pub fn exhausted(&self, attempts_made: u32) -> bool {
        attempts_made as usize >= self.intervals.len()
    }

    /// Number of tries the schedule admits
    pub fn max_attempts(&self) -> u32 {
        self.intervals.len() as u32
    }
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::new(vec![60, 300, 1800, 7200])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_interval_sequence() {
        let sched = RetrySchedule::default();
        assert_eq!(sched.interval_secs(0), 60);
        assert_eq!(sched.interval_secs(1), 300);
        assert_eq!(sched.interval_secs(2), 1800);
        assert_eq!(sched.interval_secs(3), 7200);
        // past the end the last interval repeats
        assert_eq!(sched.interval_secs(9), 7200);
    }

    #[test]
    fn test_exhaustion_after_final_interval() {
        let sched = RetrySchedule::default();
        assert!(!sched.exhausted(3));
        assert!(sched.exhausted(4));
        assert_eq!(sched.max_attempts(), 4);
    }

    #[test]
    fn test_next_attempt_at() {
        let sched = RetrySchedule::new(vec![60, 300]);
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        assert_eq!(
            sched.next_attempt_at(now, 0),
            Utc.with_ymd_and_hms(2026, 3, 1, 8, 1, 0).unwrap()
        );
        assert_eq!(
            sched.next_attempt_at(now, 1),
            Utc.with_ymd_and_hms(2026, 3, 1, 8, 5, 0).unwrap()
        );
    }

    #[test]
    fn test_empty_schedule_degenerates() {
        let sched = RetrySchedule::new(vec![]);
        assert_eq!(sched.interval_secs(0), 0);
        assert!(sched.exhausted(1));
    }
}
