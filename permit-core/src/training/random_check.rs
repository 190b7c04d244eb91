//! Random identity checks.
//!
//! The server issues face-verification probes at random times during a
//! session so a worker cannot start the video and walk away. Probe timing is
//! uniform within the configured interval; consecutive failures beyond the
//! limit fail the session.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::PlatformConfig;
use crate::types::ProbeId;

/// An issued, unanswered probe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCheck {
    pub probe_id: ProbeId,
    pub issued_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

/// Per-session check bookkeeping.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckState {
    /// When the next probe becomes due
    pub next_due: Option<DateTime<Utc>>,
    /// Probe awaiting an answer, if any
    pub pending: Option<PendingCheck>,
    /// Consecutive failed or missed probes
    pub consecutive_failures: u32,
    /// Probes issued over the session lifetime
    pub total_issued: u32,
}

impl CheckState {
    pub fn new() -> Self {
        Self {
            next_due: None,
            pending: None,
            consecutive_failures: 0,
            total_issued: 0,
        }
    }
}

impl Default for CheckState {
    fn default() -> Self {
        Self::new()
    }
}

/// Random-check policy, configured once per engine.
#[derive(Clone, Debug)]
pub struct RandomCheckPolicy {
    min_interval_secs: i64,
    max_interval_secs: i64,
    answer_timeout_secs: i64,
    max_consecutive_failures: u32,
}

impl RandomCheckPolicy {
    pub fn new() -> Self {
        Self {
            min_interval_secs: 180,
            max_interval_secs: 420,
            answer_timeout_secs: 60,
            max_consecutive_failures: 2,
        }
    }

    pub fn from_config(config: &PlatformConfig) -> Self {
        Self {
            min_interval_secs: config.training_random_check_min_secs,
            max_interval_secs: config.training_random_check_max_secs,
            answer_timeout_secs: config.training_check_answer_timeout_secs,
            max_consecutive_failures: config.training_max_consecutive_check_failures,
        }
    }

    /// Set the probe interval bounds, seconds
    pub fn with_interval(mut self, min_secs: i64, max_secs: i64) -> Self {
        self.min_interval_secs = min_secs;
        self.max_interval_secs = max_secs;
        self
    }

    /// Set the consecutive-failure limit
    pub fn with_max_consecutive_failures(mut self, n: u32) -> Self {
        self.max_consecutive_failures = n;
        self
    }

    /// Draw the due time of the next probe, uniform in the interval
    pub fn schedule_next(&self, after: DateTime<Utc>, rng: &mut impl Rng) -> DateTime<Utc> {
        let span = rng.gen_range(self.min_interval_secs..=self.max_interval_secs);
        after + Duration::seconds(span)
    }

    /// Initialize scheduling for a fresh session
    pub fn start(&self, state: &mut CheckState, started_at: DateTime<Utc>, rng: &mut impl Rng) {
        state.next_due = Some(self.schedule_next(started_at, rng));
    }

    /// Issue a probe if one is due and none is pending.
    pub fn maybe_issue(
        &self,
        state: &mut CheckState,
        now: DateTime<Utc>,
        rng: &mut impl Rng,
    ) -> Option<ProbeId> {
        if state.pending.is_some() {
            return None;
        }
        let due = state.next_due?;
        if now < due {
            return None;
        }
        let probe_id = ProbeId::new(random_probe_id(rng));
        state.pending = Some(PendingCheck {
            probe_id: probe_id.clone(),
            issued_at: now,
            deadline: now + Duration::seconds(self.answer_timeout_secs),
        });
        state.total_issued += 1;
        state.next_due = None;
        Some(probe_id)
    }

    /// Whether the pending probe (if any) ran past its deadline
    pub fn pending_timed_out(&self, state: &CheckState, now: DateTime<Utc>) -> bool {
        state
            .pending
            .as_ref()
            .map(|p| now > p.deadline)
            .unwrap_or(false)
    }

    /// Record a passed probe; resets the failure run and schedules the next
    pub fn record_pass(&self, state: &mut CheckState, now: DateTime<Utc>, rng: &mut impl Rng) {
        state.pending = None;
        state.consecutive_failures = 0;
        state.next_due = Some(self.schedule_next(now, rng));
    }

    /// Record a failed or missed probe. Returns `true` when the consecutive
    /// limit is reached and the session must fail.
    pub fn record_failure(
        &self,
        state: &mut CheckState,
        now: DateTime<Utc>,
        rng: &mut impl Rng,
    ) -> bool {
        state.pending = None;
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.max_consecutive_failures {
            return true;
        }
        state.next_due = Some(self.schedule_next(now, rng));
        false
    }
}

impl Default for RandomCheckPolicy {
    fn default() -> Self {
        Self::new()
    }
}

fn random_probe_id(rng: &mut impl Rng) -> String {
    let mut bytes = [0u8; 8];
    rng.fill(&mut bytes);
    format!("probe_{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn test_schedule_within_bounds() {
        let policy = RandomCheckPolicy::new();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let due = policy.schedule_next(t(0), &mut rng);
            let span = (due - t(0)).num_seconds();
            assert!((180..=420).contains(&span), "span {span} out of bounds");
        }
    }

    #[test]
    fn test_issue_only_when_due() {
        let policy = RandomCheckPolicy::new().with_interval(100, 100);
        let mut rng = StdRng::seed_from_u64(7);
        let mut state = CheckState::new();
        policy.start(&mut state, t(0), &mut rng);

        assert!(policy.maybe_issue(&mut state, t(50), &mut rng).is_none());
        let probe = policy.maybe_issue(&mut state, t(100), &mut rng);
        assert!(probe.is_some());
        // no second probe while one is pending
        assert!(policy.maybe_issue(&mut state, t(200), &mut rng).is_none());
        assert_eq!(state.total_issued, 1);
    }

    #[test]
    fn test_pass_resets_failures() {
        let policy = RandomCheckPolicy::new().with_interval(10, 10);
        let mut rng = StdRng::seed_from_u64(7);
        let mut state = CheckState::new();
        policy.start(&mut state, t(0), &mut rng);
        policy.maybe_issue(&mut state, t(10), &mut rng);

        assert!(!policy.record_failure(&mut state, t(20), &mut rng));
        assert_eq!(state.consecutive_failures, 1);

        policy.maybe_issue(&mut state, t(30), &mut rng);
        policy.record_pass(&mut state, t(40), &mut rng);
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn test_consecutive_failures_fail_session() {
        let policy = RandomCheckPolicy::new()
            .with_interval(10, 10)
            .with_max_consecutive_failures(2);
        let mut rng = StdRng::seed_from_u64(7);
        let mut state = CheckState::new();
        policy.start(&mut state, t(0), &mut rng);

        policy.maybe_issue(&mut state, t(10), &mut rng);
        assert!(!policy.record_failure(&mut state, t(20), &mut rng));
        policy.maybe_issue(&mut state, t(30), &mut rng);
        assert!(policy.record_failure(&mut state, t(40), &mut rng));
    }

    #[test]
    fn test_pending_timeout() {
        let policy = RandomCheckPolicy::new().with_interval(10, 10);
        let mut rng = StdRng::seed_from_u64(7);
        let mut state = CheckState::new();
        policy.start(&mut state, t(0), &mut rng);
        policy.maybe_issue(&mut state, t(10), &mut rng);

        assert!(!policy.pending_timed_out(&state, t(60)));
        assert!(policy.pending_timed_out(&state, t(71)));
    }
}
