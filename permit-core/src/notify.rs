//! Notification scoring and quiet-hours policy.
//!
//! The queue is a sorted set over an integer score; lower score wins and
//! ties fall back to enqueue order. Urgent items bypass the quiet-hours
//! window entirely.

use chrono::{DateTime, NaiveDate, Timelike, Utc};

use crate::types::{NotificationPriority, WorkerId};

/// Score step separating priority classes. Timestamps in seconds stay well
/// below this for the platform's lifetime.
pub const PRIORITY_SCORE_STEP: i64 = 1_000_000_000;

/// Queue score for an item: `priority_class * 10^9 + enqueue_secs`.
pub fn score(priority: NotificationPriority, enqueued_at: DateTime<Utc>) -> i64 {
    priority.class() * PRIORITY_SCORE_STEP + enqueued_at.timestamp()
}

/// Recover the priority class from a stored score.
pub fn class_of_score(score: i64) -> i64 {
    score / PRIORITY_SCORE_STEP
}

/// Whether the wall-clock hour falls inside the delivery window (inclusive
/// on both ends).
pub fn in_allowed_hours(now: DateTime<Utc>, start_hour: u32, end_hour: u32) -> bool {
    let hour = now.hour();
    hour >= start_hour && hour <= end_hour
}

/// Default dedup key: `(worker, type, related, calendar day)`.
pub fn default_dedup_key(
    worker_id: &WorkerId,
    notification_type: &str,
    related_id: Option<&str>,
    day: NaiveDate,
) -> String {
    format!(
        "{}:{}:{}:{}",
        worker_id,
        notification_type,
        related_id.unwrap_or("-"),
        day
    )
}
