//! Training session entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use permit_core::training::{CheckState, ProgressState};
use permit_core::{
    DailyTicketId, FanoutId, SessionId, SessionStatus, SessionToken, SiteId, WorkerId,
};

use super::Record;
use crate::schema::tables;

/// Durable record of a worker's progress through the mandatory safety video
/// for one daily ticket.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingSessionEntity {
    pub session_id: SessionId,
    pub fanout_id: FanoutId,
    pub daily_ticket_id: DailyTicketId,
    pub site_id: SiteId,
    pub worker_id: WorkerId,
    /// Opaque token; serialization key for all session mutations
    pub token: SessionToken,
    pub status: SessionStatus,
    pub fail_reason: Option<String>,
    /// Media length in seconds
    pub media_len_secs: i64,
    /// Accumulated progress and anti-cheat counters
    pub progress: ProgressState,
    /// Random identity-check bookkeeping
    pub checks: CheckState,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for TrainingSessionEntity {
    const TABLE: &'static str = tables::TRAINING_SESSION;

    fn record_id(&self) -> &str {
        self.session_id.as_str()
    }

    fn site(&self) -> Option<&SiteId> {
        Some(&self.site_id)
    }
}

impl TrainingSessionEntity {
    pub fn new(
        session_id: SessionId,
        fanout_id: FanoutId,
        daily_ticket_id: DailyTicketId,
        site_id: SiteId,
        worker_id: WorkerId,
        media_len_secs: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            fanout_id,
            daily_ticket_id,
            site_id,
            worker_id,
            token: SessionToken::generate(),
            status: SessionStatus::InProgress,
            fail_reason: None,
            media_len_secs,
            progress: ProgressState::new(now),
            checks: CheckState::new(),
            started_at: now,
            ended_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Close the session in a terminal state
    pub fn finish(&mut self, status: SessionStatus, reason: Option<String>, now: DateTime<Utc>) {
        self.status = status;
        self.fail_reason = reason;
        self.ended_at = Some(now);
        self.updated_at = now;
    }
}
