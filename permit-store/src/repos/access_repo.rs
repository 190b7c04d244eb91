//! Access grant and access event repository.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use permit_core::{
    AreaId, CoreError, CoreResult, DailyTicketId, FanoutId, GrantId, SiteFilter, SiteId, WorkerId,
};

use crate::entities::{AccessEventEntity, AccessGrantEntity};

/// Access repository trait
#[async_trait]
pub trait AccessRepository: Send + Sync {
    async fn create_grant(&self, entity: AccessGrantEntity) -> CoreResult<AccessGrantEntity>;

    async fn get_grant(
        &self,
        filter: &SiteFilter,
        grant_id: &GrantId,
    ) -> CoreResult<Option<AccessGrantEntity>>;

    async fn get_grant_required(
        &self,
        filter: &SiteFilter,
        grant_id: &GrantId,
    ) -> CoreResult<AccessGrantEntity> {
        self.get_grant(filter, grant_id)
            .await?
            .ok_or_else(|| CoreError::not_found("AccessGrant", grant_id.as_str()))
    }

    async fn update_grant(&self, entity: AccessGrantEntity) -> CoreResult<AccessGrantEntity>;

    /// Existing grant of a fanout for one area, regardless of status
    async fn find_grant(
        &self,
        filter: &SiteFilter,
        fanout_id: &FanoutId,
        area_id: &AreaId,
    ) -> CoreResult<Option<AccessGrantEntity>>;

    async fn list_grants_for_fanout(
        &self,
        filter: &SiteFilter,
        fanout_id: &FanoutId,
    ) -> CoreResult<Vec<AccessGrantEntity>>;

    async fn list_grants_for_ticket(
        &self,
        filter: &SiteFilter,
        daily_ticket_id: &DailyTicketId,
    ) -> CoreResult<Vec<AccessGrantEntity>>;

    async fn list_grants_for_worker(
        &self,
        filter: &SiteFilter,
        worker_id: &WorkerId,
    ) -> CoreResult<Vec<AccessGrantEntity>>;

    /// Claim up to `limit` grants due for sync, FIFO by `next_attempt_at`.
    /// Claimed rows are reserved so a concurrent drainer skips them; the
    /// claim is released by the status update that follows delivery.
    async fn claim_due_grants(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> CoreResult<Vec<AccessGrantEntity>>;

    /// Grants stuck in a pre-active state for longer than the threshold
    async fn list_stuck_grants(
        &self,
        now: DateTime<Utc>,
        threshold_secs: i64,
    ) -> CoreResult<Vec<AccessGrantEntity>>;

    /// Active, unexpired grants of a site, for provider reconciliation
    async fn list_active_grants_for_site(
        &self,
        site_id: &SiteId,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<AccessGrantEntity>>;

    /// Append an event. Returns `false` when the vendor event id was seen
    /// before (duplicate callback), leaving the stream untouched.
    async fn insert_event(&self, entity: AccessEventEntity) -> CoreResult<bool>;

    /// Events of a site inside a time window, ordered by event time
    async fn list_events_window(
        &self,
        filter: &SiteFilter,
        site_id: &SiteId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CoreResult<Vec<AccessEventEntity>>;
}

#[derive(Default)]
struct AccessState {
    grants: BTreeMap<GrantId, AccessGrantEntity>,
    events: Vec<AccessEventEntity>,
}

/// In-memory access repository.
#[derive(Default)]
pub struct MemoryAccessRepo {
    state: RwLock<AccessState>,
}

impl MemoryAccessRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccessRepository for MemoryAccessRepo {
    async fn create_grant(&self, entity: AccessGrantEntity) -> CoreResult<AccessGrantEntity> {
        let mut state = self.state.write().await;
        if state.grants.contains_key(&entity.grant_id) {
            return Err(CoreError::conflict(format!(
                "grant {} already exists",
                entity.grant_id
            )));
        }
        state.grants.insert(entity.grant_id.clone(), entity.clone());
        Ok(entity)
    }

    async fn get_grant(
        &self,
        filter: &SiteFilter,
        grant_id: &GrantId,
    ) -> CoreResult<Option<AccessGrantEntity>> {
        Ok(self
            .state
            .read()
            .await
            .grants
            .get(grant_id)
            .filter(|g| filter.allows(&g.site_id))
            .cloned())
    }

    async fn update_grant(&self, entity: AccessGrantEntity) -> CoreResult<AccessGrantEntity> {
        let mut state = self.state.write().await;
        if !state.grants.contains_key(&entity.grant_id) {
            return Err(CoreError::not_found("AccessGrant", entity.grant_id.as_str()));
        }
        state.grants.insert(entity.grant_id.clone(), entity.clone());
        Ok(entity)
    }

    async fn find_grant(
        &self,
        filter: &SiteFilter,
        fanout_id: &FanoutId,
        area_id: &AreaId,
    ) -> CoreResult<Option<AccessGrantEntity>> {
        Ok(self
            .state
            .read()
            .await
            .grants
            .values()
            .find(|g| {
                &g.fanout_id == fanout_id && &g.area_id == area_id && filter.allows(&g.site_id)
            })
            .cloned())
    }

    async fn list_grants_for_fanout(
        &self,
        filter: &SiteFilter,
        fanout_id: &FanoutId,
    ) -> CoreResult<Vec<AccessGrantEntity>> {
        Ok(self
            .state
            .read()
            .await
            .grants
            .values()
            .filter(|g| &g.fanout_id == fanout_id && filter.allows(&g.site_id))
            .cloned()
            .collect())
    }

    async fn list_grants_for_ticket(
        &self,
        filter: &SiteFilter,
        daily_ticket_id: &DailyTicketId,
    ) -> CoreResult<Vec<AccessGrantEntity>> {
        Ok(self
            .state
            .read()
            .await
            .grants
            .values()
            .filter(|g| &g.daily_ticket_id == daily_ticket_id && filter.allows(&g.site_id))
            .cloned()
            .collect())
    }

    async fn list_grants_for_worker(
        &self,
        filter: &SiteFilter,
        worker_id: &WorkerId,
    ) -> CoreResult<Vec<AccessGrantEntity>> {
        Ok(self
            .state
            .read()
            .await
            .grants
            .values()
            .filter(|g| &g.worker_id == worker_id && filter.allows(&g.site_id))
            .cloned()
            .collect())
    }

    async fn claim_due_grants(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> CoreResult<Vec<AccessGrantEntity>> {
        let mut state = self.state.write().await;
        let mut due: Vec<GrantId> = state
            .grants
            .values()
            .filter(|g| {
                g.status.needs_sync()
                    && !g.claimed
                    && g.next_attempt_at.map_or(false, |t| t <= now)
            })
            .map(|g| g.grant_id.clone())
            .collect();
        due.sort_by_key(|id| {
            state
                .grants
                .get(id)
                .and_then(|g| g.next_attempt_at)
                .unwrap_or(now)
        });
        due.truncate(limit);

        let mut claimed = Vec::with_capacity(due.len());
        for id in due {
            if let Some(grant) = state.grants.get_mut(&id) {
                grant.claimed = true;
                claimed.push(grant.clone());
            }
        }
        Ok(claimed)
    }

    async fn list_stuck_grants(
        &self,
        now: DateTime<Utc>,
        threshold_secs: i64,
    ) -> CoreResult<Vec<AccessGrantEntity>> {
        let cutoff = now - Duration::seconds(threshold_secs);
        Ok(self
            .state
            .read()
            .await
            .grants
            .values()
            .filter(|g| g.status.needs_sync() && g.created_at <= cutoff)
            .cloned()
            .collect())
    }

    async fn list_active_grants_for_site(
        &self,
        site_id: &SiteId,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<AccessGrantEntity>> {
        Ok(self
            .state
            .read()
            .await
            .grants
            .values()
            .filter(|g| {
                &g.site_id == site_id
                    && g.status == permit_core::GrantStatus::Active
                    && !g.window_passed(now)
            })
            .cloned()
            .collect())
    }

    async fn insert_event(&self, entity: AccessEventEntity) -> CoreResult<bool> {
        let mut state = self.state.write().await;
        if let Some(vendor_id) = &entity.vendor_event_id {
            let duplicate = state
                .events
                .iter()
                .any(|e| e.vendor_event_id.as_deref() == Some(vendor_id.as_str()));
            if duplicate {
                return Ok(false);
            }
        }
        state.events.push(entity);
        Ok(true)
    }

    async fn list_events_window(
        &self,
        filter: &SiteFilter,
        site_id: &SiteId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CoreResult<Vec<AccessEventEntity>> {
        let state = self.state.read().await;
        let mut events: Vec<_> = state
            .events
            .iter()
            .filter(|e| {
                &e.site_id == site_id
                    && filter.allows(&e.site_id)
                    && e.event_time >= from
                    && e.event_time <= to
            })
            .cloned()
            .collect();
        events.sort_by_key(|e| e.event_time);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use permit_core::GrantStatus;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn grant(id: &str, next_attempt: DateTime<Utc>) -> AccessGrantEntity {
        AccessGrantEntity::new(
            GrantId::new(id),
            SiteId::new("s1"),
            WorkerId::new("w1"),
            AreaId::new("a1"),
            DailyTicketId::new("dt1"),
            FanoutId::new("f1"),
            t(0),
            t(3600),
            next_attempt,
        )
    }

    #[tokio::test]
    async fn test_claim_is_fifo_and_exclusive() {
        let repo = MemoryAccessRepo::new();
        repo.create_grant(grant("g2", t(20))).await.unwrap();
        repo.create_grant(grant("g1", t(10))).await.unwrap();
        repo.create_grant(grant("g3", t(9999))).await.unwrap();

        let claimed = repo.claim_due_grants(t(30), 10).await.unwrap();
        let ids: Vec<_> = claimed.iter().map(|g| g.grant_id.as_str()).collect();
        assert_eq!(ids, vec!["g1", "g2"]);

        // already claimed rows are not handed out again
        let again = repo.claim_due_grants(t(30), 10).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_vendor_event_dedup() {
        let repo = MemoryAccessRepo::new();
        let event = AccessEventEntity {
            event_id: permit_core::EventId::new("e1"),
            site_id: SiteId::new("s1"),
            vendor_event_id: Some("vendor-1".to_string()),
            device_id: "gate-1".to_string(),
            worker_id: Some(WorkerId::new("w1")),
            area_id: Some(AreaId::new("a1")),
            event_time: t(0),
            direction: Some("IN".to_string()),
            result: crate::entities::GatePassResult::Pass,
            reason_code: None,
            created_at: t(0),
        };
        assert!(repo.insert_event(event.clone()).await.unwrap());
        let mut dup = event;
        dup.event_id = permit_core::EventId::new("e2");
        assert!(!repo.insert_event(dup).await.unwrap());
    }

    #[tokio::test]
    async fn test_stuck_grants_detection() {
        let repo = MemoryAccessRepo::new();
        let mut old = grant("g1", t(0));
        old.created_at = t(0);
        repo.create_grant(old).await.unwrap();

        let stuck = repo.list_stuck_grants(t(700), 600).await.unwrap();
        assert_eq!(stuck.len(), 1);
        let not_yet = repo.list_stuck_grants(t(300), 600).await.unwrap();
        assert!(not_yet.is_empty());
    }

    #[tokio::test]
    async fn test_active_grants_exclude_expired_windows() {
        let repo = MemoryAccessRepo::new();
        let mut g = grant("g1", t(0));
        g.status = GrantStatus::Active;
        repo.create_grant(g).await.unwrap();

        let active = repo
            .list_active_grants_for_site(&SiteId::new("s1"), t(1800))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);

        let after_window = repo
            .list_active_grants_for_site(&SiteId::new("s1"), t(4000))
            .await
            .unwrap();
        assert!(after_window.is_empty());
    }
}
