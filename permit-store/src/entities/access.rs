//! Access grant and access event entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use permit_core::{
    AreaId, DailyTicketId, EventId, FanoutId, GrantId, GrantStatus, RevokeReason, SiteId, WorkerId,
};

use super::Record;
use crate::schema::tables;

/// Authorization for one worker to enter one area during one time window,
/// synchronized to the external access-control provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessGrantEntity {
    pub grant_id: GrantId,
    pub site_id: SiteId,
    pub worker_id: WorkerId,
    pub area_id: AreaId,
    pub daily_ticket_id: DailyTicketId,
    pub fanout_id: FanoutId,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub status: GrantStatus,
    /// Reference returned by the provider on successful sync
    pub provider_ref: Option<String>,
    /// Failed sync attempts so far
    pub sync_attempts: u32,
    /// Due time of the next sync try; the drainer's selection key
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub sync_error: Option<String>,
    /// Row-level reservation taken by a drainer worker
    pub claimed: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoke_reason: Option<RevokeReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for AccessGrantEntity {
    const TABLE: &'static str = tables::ACCESS_GRANT;

    fn record_id(&self) -> &str {
        self.grant_id.as_str()
    }

    fn site(&self) -> Option<&SiteId> {
        Some(&self.site_id)
    }
}

impl AccessGrantEntity {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        grant_id: GrantId,
        site_id: SiteId,
        worker_id: WorkerId,
        area_id: AreaId,
        daily_ticket_id: DailyTicketId,
        fanout_id: FanoutId,
        valid_from: DateTime<Utc>,
        valid_to: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            grant_id,
            site_id,
            worker_id,
            area_id,
            daily_ticket_id,
            fanout_id,
            valid_from,
            valid_to,
            status: GrantStatus::Pending,
            provider_ref: None,
            sync_attempts: 0,
            next_attempt_at: Some(now),
            last_sync_at: None,
            sync_error: None,
            claimed: false,
            revoked_at: None,
            revoke_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the validity window covers the given instant
    pub fn window_covers(&self, now: DateTime<Utc>) -> bool {
        self.valid_from <= now && now <= self.valid_to
    }

    /// Whether the window has already closed
    pub fn window_passed(&self, now: DateTime<Utc>) -> bool {
        self.valid_to < now
    }

    /// Mark revoked
    pub fn revoke(&mut self, reason: RevokeReason, now: DateTime<Utc>) {
        self.status = GrantStatus::Revoked;
        self.revoked_at = Some(now);
        self.revoke_reason = Some(reason);
        self.next_attempt_at = None;
        self.claimed = false;
        self.updated_at = now;
    }
}

/// Result of a gate passage as reported by the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatePassResult {
    Pass,
    Deny,
}

/// A physical gate record imported from the access system. Append-only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessEventEntity {
    pub event_id: EventId,
    pub site_id: SiteId,
    /// Provider-side event id; unique, dedups repeated callbacks
    pub vendor_event_id: Option<String>,
    pub device_id: String,
    pub worker_id: Option<WorkerId>,
    pub area_id: Option<AreaId>,
    pub event_time: DateTime<Utc>,
    /// IN or OUT when the provider reports it
    pub direction: Option<String>,
    pub result: GatePassResult,
    pub reason_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Record for AccessEventEntity {
    const TABLE: &'static str = tables::ACCESS_EVENT;

    fn record_id(&self) -> &str {
        self.event_id.as_str()
    }

    fn site(&self) -> Option<&SiteId> {
        Some(&self.site_id)
    }
}
