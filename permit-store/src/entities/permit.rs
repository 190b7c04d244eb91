//! Work permit, daily ticket, and fanout entities.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use permit_core::{
    ActorId, AreaId, ContractorId, DailyTicketId, DailyTicketStatus, FanoutId, PermitId,
    PermitStatus, SiteId, TrainingStatus, WorkerId,
};

use super::Record;
use crate::schema::tables;

/// The approved plan of a piece of on-site work.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkPermitEntity {
    pub permit_id: PermitId,
    pub site_id: SiteId,
    pub contractor_id: ContractorId,
    pub title: String,
    pub remark: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: PermitStatus,
    /// Reason attached to rejection or termination
    pub status_reason: Option<String>,
    pub area_ids: Vec<AreaId>,
    pub worker_ids: Vec<WorkerId>,
    /// Daily access window start
    pub access_start: NaiveTime,
    /// Daily access window end
    pub access_end: NaiveTime,
    pub created_by: ActorId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for WorkPermitEntity {
    const TABLE: &'static str = tables::WORK_PERMIT;

    fn record_id(&self) -> &str {
        self.permit_id.as_str()
    }

    fn site(&self) -> Option<&SiteId> {
        Some(&self.site_id)
    }
}

impl WorkPermitEntity {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        permit_id: PermitId,
        site_id: SiteId,
        contractor_id: ContractorId,
        title: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        created_by: ActorId,
        now: DateTime<Utc>,
    ) -> Self {
        let start = NaiveTime::from_hms_opt(6, 0, 0).unwrap_or_default();
        let end = NaiveTime::from_hms_opt(20, 0, 0).unwrap_or_default();
        Self {
            permit_id,
            site_id,
            contractor_id,
            title: title.into(),
            remark: None,
            start_date,
            end_date,
            status: PermitStatus::Draft,
            status_reason: None,
            area_ids: Vec::new(),
            worker_ids: Vec::new(),
            access_start: start,
            access_end: end,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// All dates in the permit's `[start, end]` window, inclusive
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates = Vec::new();
        let mut d = self.start_date;
        while d <= self.end_date {
            dates.push(d);
            if let Some(next) = d.succ_opt() {
                d = next;
            } else {
                break;
            }
        }
        dates
    }
}

/// A permit's instantiation for one calendar day.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DailyTicketEntity {
    pub daily_ticket_id: DailyTicketId,
    pub permit_id: PermitId,
    pub site_id: SiteId,
    pub date: NaiveDate,
    pub status: DailyTicketStatus,
    pub access_start: NaiveTime,
    pub access_end: NaiveTime,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for DailyTicketEntity {
    const TABLE: &'static str = tables::DAILY_TICKET;

    fn record_id(&self) -> &str {
        self.daily_ticket_id.as_str()
    }

    fn site(&self) -> Option<&SiteId> {
        Some(&self.site_id)
    }
}

impl DailyTicketEntity {
    /// The concrete access window of this day, clamped to the same day.
    pub fn access_window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let from = self.date.and_time(self.access_start).and_utc();
        let end_time = self.access_end.max(self.access_start);
        let to = self.date.and_time(end_time).and_utc();
        (from, to)
    }
}

/// Per-worker fanout row of a daily ticket; drives training and grants.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DailyTicketWorkerEntity {
    pub fanout_id: FanoutId,
    pub daily_ticket_id: DailyTicketId,
    pub permit_id: PermitId,
    pub site_id: SiteId,
    pub worker_id: WorkerId,
    pub training_status: TrainingStatus,
    pub training_fail_reason: Option<String>,
    /// Set once training passed and grants were created
    pub authorized: bool,
    /// Set when a change removed the worker from the permit
    pub removed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for DailyTicketWorkerEntity {
    const TABLE: &'static str = tables::DAILY_TICKET_WORKER;

    fn record_id(&self) -> &str {
        self.fanout_id.as_str()
    }

    fn site(&self) -> Option<&SiteId> {
        Some(&self.site_id)
    }
}

impl DailyTicketWorkerEntity {
    pub fn new(
        fanout_id: FanoutId,
        ticket: &DailyTicketEntity,
        worker_id: WorkerId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            fanout_id,
            daily_ticket_id: ticket.daily_ticket_id.clone(),
            permit_id: ticket.permit_id.clone(),
            site_id: ticket.site_id.clone(),
            worker_id,
            training_status: TrainingStatus::NotStarted,
            training_fail_reason: None,
            authorized: false,
            removed: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A permit with its full child graph, assembled by the repository.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PermitAggregate {
    pub permit: WorkPermitEntity,
    /// Daily tickets with their fanouts, ordered by date
    pub days: Vec<(DailyTicketEntity, Vec<DailyTicketWorkerEntity>)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_permit_dates_inclusive() {
        let now = Utc.with_ymd_and_hms(2026, 2, 20, 8, 0, 0).unwrap();
        let permit = WorkPermitEntity::new(
            PermitId::new("p1"),
            SiteId::new("s1"),
            ContractorId::new("c1"),
            "demolition",
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 3).unwrap(),
            ActorId::new("admin"),
            now,
        );
        let dates = permit.dates();
        assert_eq!(dates.len(), 3);
        assert_eq!(dates[0], NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(dates[2], NaiveDate::from_ymd_opt(2026, 3, 3).unwrap());
    }

    #[test]
    fn test_single_day_permit() {
        let now = Utc.with_ymd_and_hms(2026, 2, 20, 8, 0, 0).unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let permit = WorkPermitEntity::new(
            PermitId::new("p1"),
            SiteId::new("s1"),
            ContractorId::new("c1"),
            "scaffolding",
            day,
            day,
            ActorId::new("admin"),
            now,
        );
        assert_eq!(permit.dates(), vec![day]);
    }

    #[test]
    fn test_aggregate_snapshot_round_trip() {
        let now = Utc.with_ymd_and_hms(2026, 2, 20, 8, 0, 0).unwrap();
        let permit = WorkPermitEntity::new(
            PermitId::new("p1"),
            SiteId::new("s1"),
            ContractorId::new("c1"),
            "demolition",
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            ActorId::new("admin"),
            now,
        );
        let ticket = DailyTicketEntity {
            daily_ticket_id: DailyTicketId::new("dt1"),
            permit_id: permit.permit_id.clone(),
            site_id: permit.site_id.clone(),
            date: permit.start_date,
            status: DailyTicketStatus::Published,
            access_start: permit.access_start,
            access_end: permit.access_end,
            created_at: now,
            updated_at: now,
        };
        let fanout = DailyTicketWorkerEntity::new(
            FanoutId::new("f1"),
            &ticket,
            WorkerId::new("w1"),
            now,
        );
        let aggregate = PermitAggregate {
            permit,
            days: vec![(ticket, vec![fanout])],
        };

        let json = serde_json::to_string(&aggregate).unwrap();
        let restored: PermitAggregate = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.permit.permit_id, aggregate.permit.permit_id);
        assert_eq!(restored.permit.status, aggregate.permit.status);
        assert_eq!(restored.days.len(), 1);
        assert_eq!(restored.days[0].0.date, aggregate.days[0].0.date);
        assert_eq!(
            restored.days[0].1[0].training_status,
            aggregate.days[0].1[0].training_status
        );
    }

    #[test]
    fn test_daily_ticket_access_window() {
        let now = Utc.with_ymd_and_hms(2026, 2, 20, 8, 0, 0).unwrap();
        let ticket = DailyTicketEntity {
            daily_ticket_id: DailyTicketId::new("dt1"),
            permit_id: PermitId::new("p1"),
            site_id: SiteId::new("s1"),
            date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            status: DailyTicketStatus::Published,
            access_start: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            access_end: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            created_at: now,
            updated_at: now,
        };
        let (from, to) = ticket.access_window();
        assert_eq!(from, Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).unwrap());
    }
}
