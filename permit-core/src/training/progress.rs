//! Training progress validation.
//!
//! Heartbeats report the player position; the validator credits watch time
//! only when the reported progression is physically plausible. Jumps,
//! rewinds, and playback faster than wall-clock time are flagged as
//! suspicious, and enough suspicion fails the session outright.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::PlatformConfig;

/// A coalesced set of half-open `[from, to)` intervals in media seconds.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalSet {
    intervals: Vec<(i64, i64)>,
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an interval, merging any overlap with existing coverage.
    pub fn insert(&mut self, from: i64, to: i64) {
        if to <= from {
            return;
        }
        let (mut from, mut to) = (from, to);
        let mut merged = Vec::with_capacity(self.intervals.len() + 1);
        for &(a, b) in &self.intervals {
            if b < from || a > to {
                merged.push((a, b));
            } else {
                from = from.min(a);
                to = to.max(b);
            }
        }
        merged.push((from, to));
        merged.sort_unstable();
        self.intervals = merged;
    }

    /// Total covered seconds
    pub fn covered_secs(&self) -> i64 {
        self.intervals.iter().map(|(a, b)| b - a).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

/// Kinds of suspicious player behaviour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuspiciousKind {
    /// Position moved backwards beyond the error margin
    PositionBackward,
    /// Position jumped forward past the skip threshold
    LargeSkip,
    /// Watched seconds outpaced wall-clock time
    SpeedAnomaly,
    /// A random identity check was not answered in time
    CheckTimeout,
    /// A random identity check failed verification
    CheckFailed,
}

impl SuspiciousKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PositionBackward => "POSITION_BACKWARD",
            Self::LargeSkip => "LARGE_SKIP",
            Self::SpeedAnomaly => "SPEED_ANOMALY",
            Self::CheckTimeout => "CHECK_TIMEOUT",
            Self::CheckFailed => "CHECK_FAILED",
        }
    }
}

/// Why a session was forced into `FAILED`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailReason {
    TooManySuspiciousEvents,
    HeartbeatTimeout,
    ConsecutiveCheckFailures,
}

impl FailReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TooManySuspiciousEvents => "TOO_MANY_SUSPICIOUS_EVENTS",
            Self::HeartbeatTimeout => "HEARTBEAT_TIMEOUT",
            Self::ConsecutiveCheckFailures => "CONSECUTIVE_CHECK_FAILURES",
        }
    }
}

/// Accumulated progress of a session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressState {
    /// Last reported player position, media seconds
    pub last_position: i64,
    /// Credited watch time, seconds
    pub valid_watch_secs: i64,
    /// Wall-clock time spent in the session, seconds
    pub total_watch_secs: i64,
    /// Time of the last accepted heartbeat
    pub last_heartbeat_at: DateTime<Utc>,
    /// Number of suspicious events so far
    pub suspicious_count: u32,
    /// Coalesced watched coverage
    pub watched: IntervalSet,
}

impl ProgressState {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            last_position: 0,
            valid_watch_secs: 0,
            total_watch_secs: 0,
            last_heartbeat_at: started_at,
            suspicious_count: 0,
            watched: IntervalSet::new(),
        }
    }
}

/// Outcome of applying one heartbeat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeartbeatVerdict {
    /// Heartbeat applied; may carry a suspicious flag
    Accepted {
        credited_secs: i64,
        suspicious: Option<SuspiciousKind>,
    },
    /// Heartbeat gap exceeded the hard expiry; the session is over
    Expired,
    /// The session must transition to FAILED
    Failed(FailReason),
}

/// Anti-cheating validator, configured once per engine.
#[derive(Clone, Debug)]
pub struct ProgressValidator {
    max_skip_percent: f64,
    speed_tolerance: f64,
    position_error_margin: i64,
    heartbeat_timeout_secs: i64,
    heartbeat_expire_secs: i64,
    max_suspicious: u32,
    required_watch_percent: f64,
}

impl ProgressValidator {
    pub fn new() -> Self {
        Self {
            max_skip_percent: 0.05,
            speed_tolerance: 1.2,
            position_error_margin: 2,
            heartbeat_timeout_secs: 60,
            heartbeat_expire_secs: 300,
            max_suspicious: 3,
            required_watch_percent: 0.95,
        }
    }

    pub fn from_config(config: &PlatformConfig) -> Self {
        Self {
            max_skip_percent: config.training_max_skip_percent,
            speed_tolerance: config.training_speed_tolerance,
            position_error_margin: config.training_position_error_margin,
            heartbeat_timeout_secs: config.training_heartbeat_timeout_secs,
            heartbeat_expire_secs: config.training_heartbeat_expire_secs,
            max_suspicious: config.training_max_suspicious,
            required_watch_percent: config.training_required_watch_percent,
        }
    }

    /// Set the suspicious-event threshold
    pub fn with_max_suspicious(mut self, n: u32) -> Self {
        self.max_suspicious = n;
        self
    }

    /// Set the required watched coverage
    pub fn with_required_watch_percent(mut self, p: f64) -> Self {
        self.required_watch_percent = p;
        self
    }

    /// Set the heartbeat timeout and hard expiry, seconds
    pub fn with_heartbeat_bounds(mut self, timeout: i64, expire: i64) -> Self {
        self.heartbeat_timeout_secs = timeout;
        self.heartbeat_expire_secs = expire;
        self
    }

    /// Apply one heartbeat to the state.
    pub fn apply(
        &self,
        state: &mut ProgressState,
        position: i64,
        now: DateTime<Utc>,
        media_len_secs: i64,
    ) -> HeartbeatVerdict {
        let elapsed = (now - state.last_heartbeat_at).num_seconds().max(0);
        if elapsed > self.heartbeat_expire_secs {
            return HeartbeatVerdict::Expired;
        }

        let delta = position - state.last_position;
        let skip_threshold = (media_len_secs as f64 * self.max_skip_percent) as i64;

        let mut suspicious = None;
        let mut credited = 0i64;
        let mut advance_position = true;

        if delta < -self.position_error_margin {
            suspicious = Some(SuspiciousKind::PositionBackward);
            advance_position = false;
        } else if delta > skip_threshold && delta > elapsed {
            // A jump the player could not have reached by normal playback
            suspicious = Some(SuspiciousKind::LargeSkip);
        } else if delta > 0 {
            credited = delta;
            let speed_cap = (elapsed as f64 * self.speed_tolerance) as i64;
            if credited > speed_cap {
                suspicious = Some(SuspiciousKind::SpeedAnomaly);
                credited = speed_cap;
            }
        }

        // A stalled player earns no credit for the gap
        if elapsed > self.heartbeat_timeout_secs {
            credited = 0;
        }

        if credited > 0 {
            state
                .watched
                .insert(state.last_position, state.last_position + credited);
            state.valid_watch_secs += credited;
        }
        state.total_watch_secs += elapsed;
        if advance_position {
            state.last_position = position.clamp(0, media_len_secs);
        }
        state.last_heartbeat_at = now;

        if suspicious.is_some() {
            state.suspicious_count += 1;
            if state.suspicious_count >= self.max_suspicious {
                return HeartbeatVerdict::Failed(FailReason::TooManySuspiciousEvents);
            }
        }

        HeartbeatVerdict::Accepted {
            credited_secs: credited,
            suspicious,
        }
    }

    /// Record an externally detected suspicious event (failed or missed
    /// identity check). Returns the fail reason once the threshold trips.
    pub fn record_suspicious(
        &self,
        state: &mut ProgressState,
        _kind: SuspiciousKind,
    ) -> Option<FailReason> {
        state.suspicious_count += 1;
        if state.suspicious_count >= self.max_suspicious {
            Some(FailReason::TooManySuspiciousEvents)
        } else {
            None
        }
    }

    /// Watched coverage as a fraction of the media length
    pub fn coverage(&self, state: &ProgressState, media_len_secs: i64) -> f64 {
        if media_len_secs <= 0 {
            return 0.0;
        }
        state.watched.covered_secs() as f64 / media_len_secs as f64
    }

    /// Whether the session satisfies the completion criteria
    pub fn is_complete(&self, state: &ProgressState, media_len_secs: i64) -> bool {
        state.last_position >= media_len_secs - self.position_error_margin
            && self.coverage(state, media_len_secs) >= self.required_watch_percent
    }

    /// Whether a session's heartbeat has lapsed past the hard expiry
    pub fn heartbeat_expired(&self, state: &ProgressState, now: DateTime<Utc>) -> bool {
        (now - state.last_heartbeat_at).num_seconds() > self.heartbeat_expire_secs
    }
}

impl Default for ProgressValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    const MEDIA_LEN: i64 = 600;

    #[test]
    fn test_interval_set_coalesces() {
        let mut set = IntervalSet::new();
        set.insert(0, 10);
        set.insert(20, 30);
        set.insert(5, 25);
        assert_eq!(set.covered_secs(), 30);
        set.insert(10, 10); // empty interval ignored
        assert_eq!(set.covered_secs(), 30);
    }

    #[test]
    fn test_normal_playback_credits_time() {
        let v = ProgressValidator::new();
        let mut state = ProgressState::new(t(0));
        let verdict = v.apply(&mut state, 10, t(10), MEDIA_LEN);
        assert_eq!(
            verdict,
            HeartbeatVerdict::Accepted {
                credited_secs: 10,
                suspicious: None
            }
        );
        assert_eq!(state.valid_watch_secs, 10);
        assert_eq!(state.last_position, 10);
    }

    #[test]
    fn test_backward_jump_is_suspicious_and_uncredited() {
        let v = ProgressValidator::new();
        let mut state = ProgressState::new(t(0));
        v.apply(&mut state, 100, t(100), MEDIA_LEN);
        let verdict = v.apply(&mut state, 50, t(110), MEDIA_LEN);
        assert_eq!(
            verdict,
            HeartbeatVerdict::Accepted {
                credited_secs: 0,
                suspicious: Some(SuspiciousKind::PositionBackward)
            }
        );
        // position is not rolled back
        assert_eq!(state.last_position, 100);
        assert_eq!(state.suspicious_count, 1);
    }

    #[test]
    fn test_large_skip_flagged_without_credit() {
        let v = ProgressValidator::new();
        let mut state = ProgressState::new(t(0));
        // 100s jump in 10s of wall clock, threshold is 5% of 600 = 30s
        let verdict = v.apply(&mut state, 100, t(10), MEDIA_LEN);
        assert_eq!(
            verdict,
            HeartbeatVerdict::Accepted {
                credited_secs: 0,
                suspicious: Some(SuspiciousKind::LargeSkip)
            }
        );
        assert_eq!(state.valid_watch_secs, 0);
        assert_eq!(state.last_position, 100);
    }

    #[test]
    fn test_speed_anomaly_clamps_credit() {
        let v = ProgressValidator::new();
        let mut state = ProgressState::new(t(0));
        // 25s of media in 20s of wall clock: above tolerance 1.2? 20*1.2=24 < 25
        let verdict = v.apply(&mut state, 25, t(20), MEDIA_LEN);
        match verdict {
            HeartbeatVerdict::Accepted {
                credited_secs,
                suspicious,
            } => {
                assert_eq!(suspicious, Some(SuspiciousKind::SpeedAnomaly));
                assert_eq!(credited_secs, 24);
            }
            other => panic!("unexpected verdict: {other:?}"),
        }
    }

    #[test]
    fn test_suspicious_threshold_fails_session() {
        let v = ProgressValidator::new().with_max_suspicious(2);
        let mut state = ProgressState::new(t(0));
        v.apply(&mut state, 200, t(10), MEDIA_LEN); // skip 1
        let verdict = v.apply(&mut state, 400, t(20), MEDIA_LEN); // skip 2
        assert_eq!(
            verdict,
            HeartbeatVerdict::Failed(FailReason::TooManySuspiciousEvents)
        );
    }

    #[test]
    fn test_stalled_player_earns_no_credit() {
        let v = ProgressValidator::new();
        let mut state = ProgressState::new(t(0));
        // 90s gap exceeds the 60s timeout but not the 300s expiry
        let verdict = v.apply(&mut state, 30, t(90), MEDIA_LEN);
        assert_eq!(
            verdict,
            HeartbeatVerdict::Accepted {
                credited_secs: 0,
                suspicious: None
            }
        );
        assert_eq!(state.valid_watch_secs, 0);
    }

    #[test]
    fn test_heartbeat_expiry() {
        let v = ProgressValidator::new();
        let mut state = ProgressState::new(t(0));
        let verdict = v.apply(&mut state, 10, t(301), MEDIA_LEN);
        assert_eq!(verdict, HeartbeatVerdict::Expired);
        assert!(v.heartbeat_expired(&state, t(301)));
    }

    #[test]
    fn test_completion_requires_coverage_and_position() {
        let v = ProgressValidator::new();
        let mut state = ProgressState::new(t(0));
        let mut clock = 0;
        let mut pos = 0;
        while pos < MEDIA_LEN {
            clock += 30;
            pos = (pos + 30).min(MEDIA_LEN);
            v.apply(&mut state, pos, t(clock), MEDIA_LEN);
        }
        assert!(v.coverage(&state, MEDIA_LEN) >= 0.95);
        assert!(v.is_complete(&state, MEDIA_LEN));
    }

    #[test]
    fn test_incomplete_when_watched_too_little() {
        let v = ProgressValidator::new();
        let mut state = ProgressState::new(t(0));
        // jump near the end without watching
        v.apply(&mut state, 590, t(10), MEDIA_LEN);
        assert!(!v.is_complete(&state, MEDIA_LEN));
    }
}
