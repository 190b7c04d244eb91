//! Access grant synchronization drainer.
//!
//! Grants are created locally in `PENDING` and pushed to the access-control
//! provider by this loop. A claim on the row keeps concurrent drainers off
//! it; transient provider failures reschedule the grant on the backoff
//! schedule, and exhaustion or a permanent rejection parks it in `FAILED`
//! with a HIGH alert. The same loop dispatches staged outbox intents:
//! provider-side revocations and deferred notification enqueues.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use permit_core::logging::operations;
use permit_core::{
    alert_types, notification_types, AccessProvider, AlertPriority, CoreResult, GrantStatus,
    IssueGrantRequest, NotificationPriority, RetrySchedule, SiteFilter,
};
use permit_store::entities::AccessGrantEntity;
use permit_store::outbox::OutboxPayload;
use permit_store::repos::{AccessRepository, CatalogRepository, OutboxRepository};
use permit_store::services::{AuditService, NotificationService};

/// Outcome of one drain pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Grants that reached `ACTIVE`
    pub synced: usize,
    /// Grants rescheduled on the backoff schedule
    pub retried: usize,
    /// Grants parked in `FAILED`
    pub failed: usize,
}

/// The sync drainer.
pub struct SyncDrainer {
    access_repo: Arc<dyn AccessRepository>,
    catalog_repo: Arc<dyn CatalogRepository>,
    outbox_repo: Arc<dyn OutboxRepository>,
    provider: Arc<dyn AccessProvider>,
    notifications: Arc<NotificationService>,
    audit: Arc<AuditService>,
    schedule: RetrySchedule,
}

impl SyncDrainer {
    pub fn new(
        access_repo: Arc<dyn AccessRepository>,
        catalog_repo: Arc<dyn CatalogRepository>,
        outbox_repo: Arc<dyn OutboxRepository>,
        provider: Arc<dyn AccessProvider>,
        notifications: Arc<NotificationService>,
        audit: Arc<AuditService>,
        schedule: RetrySchedule,
    ) -> Self {
        Self {
            access_repo,
            catalog_repo,
            outbox_repo,
            provider,
            notifications,
            audit,
            schedule,
        }
    }

    /// Claim due grants and push them to the provider.
    pub async fn drain(&self, batch: usize, now: DateTime<Utc>) -> CoreResult<SyncReport> {
        let due = self.access_repo.claim_due_grants(now, batch).await?;
        let mut report = SyncReport::default();
        for grant in due {
            match self.sync_one(grant, now).await {
                Ok(GrantStatus::Active) => report.synced += 1,
                Ok(GrantStatus::Failed) => report.failed += 1,
                Ok(_) => report.retried += 1,
                Err(err) => {
                    // repo failure; the claim stays and a later pass retries
                    warn!(error = %err, operation = operations::GRANT_SYNC, "Grant sync pass error");
                }
            }
        }
        if report != SyncReport::default() {
            info!(
                operation = operations::GRANT_SYNC,
                synced = report.synced,
                retried = report.retried,
                failed = report.failed,
                "Sync drain pass finished"
            );
        }
        Ok(report)
    }

    async fn sync_one(
        &self,
        mut grant: AccessGrantEntity,
        now: DateTime<Utc>,
    ) -> CoreResult<GrantStatus> {
        grant.status = GrantStatus::Syncing;
        grant.updated_at = now;
        let mut grant = self.access_repo.update_grant(grant).await?;

        let area = self
            .catalog_repo
            .get_area_required(&SiteFilter::All, &grant.area_id)
            .await?;
        let request = IssueGrantRequest {
            worker_external_id: grant.worker_id.to_string(),
            area_external_id: area.external_id.clone(),
            valid_from: grant.valid_from,
            valid_to: grant.valid_to,
        };

        match self.provider.issue_grant(request).await {
            Ok(provider_ref) => {
                grant.status = GrantStatus::Active;
                grant.provider_ref = Some(provider_ref);
                grant.last_sync_at = Some(now);
                grant.sync_error = None;
                grant.next_attempt_at = None;
                grant.claimed = false;
                grant.updated_at = now;
                let grant = self.access_repo.update_grant(grant).await?;
                self.notifications
                    .enqueue(
                        &grant.site_id,
                        &grant.worker_id,
                        notification_types::ACCESS_READY,
                        NotificationPriority::Normal,
                        serde_json::json!({ "area": area.name }),
                        Some(grant.grant_id.to_string()),
                        None,
                        now,
                    )
                    .await?;
                Ok(GrantStatus::Active)
            }
            Err(err) => {
                let attempts_made = grant.sync_attempts + 1;
                grant.sync_attempts = attempts_made;
                grant.sync_error = Some(err.to_string());
                grant.claimed = false;
                grant.updated_at = now;
                if err.is_transient() && !self.schedule.exhausted(attempts_made) {
                    grant.status = GrantStatus::Pending;
                    grant.next_attempt_at =
                        Some(self.schedule.next_attempt_at(now, attempts_made - 1));
                    let grant = self.access_repo.update_grant(grant).await?;
                    Ok(grant.status)
                } else {
                    grant.status = GrantStatus::Failed;
                    grant.next_attempt_at = None;
                    let grant = self.access_repo.update_grant(grant).await?;
                    self.audit
                        .raise_alert(
                            &grant.site_id,
                            alert_types::SYNC_FAILED,
                            AlertPriority::High,
                            "Access grant sync failed",
                            format!(
                                "grant {} failed after {} attempts: {}",
                                grant.grant_id, attempts_made, err
                            ),
                            "access_sync",
                            Some(grant.grant_id.to_string()),
                            now,
                        )
                        .await?;
                    Ok(GrantStatus::Failed)
                }
            }
        }
    }

    /// Dispatch staged outbox intents. Returns the number dispatched.
    /// Transient provider failures leave the entry pending for the next
    /// pass; a permanent rejection is alerted and dropped.
    pub async fn dispatch_outbox(&self, limit: usize, now: DateTime<Utc>) -> CoreResult<usize> {
        let pending = self.outbox_repo.list_pending(limit).await?;
        let mut dispatched = 0;
        for entry in pending {
            match &entry.payload {
                OutboxPayload::Notification {
                    worker_id,
                    notification_type,
                    priority,
                    payload,
                    related_id,
                    dedup_key,
                } => {
                    self.notifications
                        .enqueue(
                            &entry.site_id,
                            worker_id,
                            notification_type,
                            *priority,
                            payload.clone(),
                            related_id.clone(),
                            dedup_key.clone(),
                            now,
                        )
                        .await?;
                }
                OutboxPayload::RevokeAccess {
                    grant_id,
                    provider_ref,
                } => match self.provider.revoke_grant(provider_ref).await {
                    Ok(()) => {}
                    Err(err) if err.is_transient() => {
                        warn!(
                            grant_id = %grant_id,
                            error = %err,
                            operation = operations::GRANT_SYNC,
                            "Provider revoke deferred"
                        );
                        continue;
                    }
                    Err(err) => {
                        self.audit
                            .raise_alert(
                                &entry.site_id,
                                alert_types::SYNC_FAILED,
                                AlertPriority::Medium,
                                "Provider revoke rejected",
                                format!("grant {grant_id}: {err}"),
                                "access_sync",
                                Some(grant_id.to_string()),
                                now,
                            )
                            .await?;
                    }
                },
            }
            self.outbox_repo
                .mark_dispatched(&entry.outbox_id, now)
                .await?;
            dispatched += 1;
        }
        Ok(dispatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use permit_core::{
        AreaId, ContractorId, DailyTicketId, FanoutId, GrantId, PlatformConfig, SiteId, WorkerId,
    };
    use permit_store::entities::{AreaEntity, SiteEntity, WorkerEntity};
    use permit_store::outbox::OutboxEntry;
    use permit_store::repos::{
        AuditRepository, MemoryAccessRepo, MemoryAuditRepo, MemoryCatalogRepo,
        MemoryNotificationRepo, MemoryOutboxRepo,
    };
    use permit_store::sequence::IdGenerator;

    use crate::mocks::{MockAccessProvider, MockOutcome, MockPushProvider};

    struct Fixture {
        drainer: SyncDrainer,
        access_repo: Arc<MemoryAccessRepo>,
        outbox_repo: Arc<MemoryOutboxRepo>,
        audit_repo: Arc<MemoryAuditRepo>,
        provider: Arc<MockAccessProvider>,
        notifications: Arc<NotificationService>,
    }

    async fn fixture() -> Fixture {
        let ids = Arc::new(IdGenerator::new());
        let access_repo = Arc::new(MemoryAccessRepo::new());
        let catalog = Arc::new(MemoryCatalogRepo::new());
        let outbox_repo = Arc::new(MemoryOutboxRepo::new());
        let audit_repo = Arc::new(MemoryAuditRepo::new());
        let provider = Arc::new(MockAccessProvider::new());
        let notifications = Arc::new(NotificationService::new(
            Arc::new(MemoryNotificationRepo::new()),
            Arc::new(MockPushProvider::new()),
            ids.clone(),
            PlatformConfig::default(),
        ));
        let audit = Arc::new(AuditService::new(audit_repo.clone(), ids.clone()));
        let drainer = SyncDrainer::new(
            access_repo.clone(),
            catalog.clone(),
            outbox_repo.clone(),
            provider.clone(),
            notifications.clone(),
            audit,
            RetrySchedule::default(),
        );

        let now = t(8, 0);
        catalog
            .create_site(SiteEntity::new(SiteId::new("s1"), "north yard", now))
            .await
            .unwrap();
        catalog
            .create_worker(WorkerEntity::new(
                WorkerId::new("w1"),
                SiteId::new("s1"),
                ContractorId::new("c1"),
                "alice",
                "110101",
                now,
            ))
            .await
            .unwrap();
        catalog
            .create_area(AreaEntity::new(
                AreaId::new("a1"),
                SiteId::new("s1"),
                "zone A",
                now,
            ))
            .await
            .unwrap();

        Fixture {
            drainer,
            access_repo,
            outbox_repo,
            audit_repo,
            provider,
            notifications,
        }
    }

    fn t(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, min, 0).unwrap()
    }

    fn grant(now: DateTime<Utc>) -> AccessGrantEntity {
        AccessGrantEntity::new(
            GrantId::new("g1"),
            SiteId::new("s1"),
            WorkerId::new("w1"),
            AreaId::new("a1"),
            DailyTicketId::new("dt1"),
            FanoutId::new("f1"),
            t(6, 0),
            t(20, 0),
            now,
        )
    }

    #[tokio::test]
    async fn test_pending_grant_activates_on_first_attempt() {
        let fx = fixture().await;
        let now = t(8, 0);
        fx.access_repo.create_grant(grant(now)).await.unwrap();

        let report = fx.drainer.drain(10, now).await.unwrap();
        assert_eq!(report.synced, 1);

        let grant = fx
            .access_repo
            .get_grant_required(&SiteFilter::All, &GrantId::new("g1"))
            .await
            .unwrap();
        assert_eq!(grant.status, GrantStatus::Active);
        assert_eq!(grant.provider_ref.as_deref(), Some("ref-0001"));
        assert_eq!(grant.sync_attempts, 0);
        assert!(!grant.claimed);

        // the worker hears about it
        let stats = fx.notifications.queue_stats().await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.normal, 1);

        let issued = fx.provider.issued().await;
        assert_eq!(issued.len(), 1);
        assert_eq!(issued[0].area_external_id, "a1");
    }

    #[tokio::test]
    async fn test_backoff_schedule_then_failed_with_alert() {
        let fx = fixture().await;
        fx.provider
            .script(&[
                MockOutcome::Transient,
                MockOutcome::Transient,
                MockOutcome::Transient,
                MockOutcome::Transient,
            ])
            .await;
        let mut now = t(8, 0);
        fx.access_repo.create_grant(grant(now)).await.unwrap();

        // failures one to three reschedule on 60, 300, 1800 seconds
        for expected_wait in [60, 300, 1800] {
            let report = fx.drainer.drain(10, now).await.unwrap();
            assert_eq!(report.retried, 1);
            let g = fx
                .access_repo
                .get_grant_required(&SiteFilter::All, &GrantId::new("g1"))
                .await
                .unwrap();
            assert_eq!(g.status, GrantStatus::Pending);
            assert_eq!(
                g.next_attempt_at,
                Some(now + Duration::seconds(expected_wait))
            );

            // not due yet: an early pass claims nothing
            let early = fx.drainer.drain(10, now + Duration::seconds(1)).await.unwrap();
            assert_eq!(early, SyncReport::default());

            now += Duration::seconds(expected_wait);
        }

        // the fourth failure exhausts the schedule
        let report = fx.drainer.drain(10, now).await.unwrap();
        assert_eq!(report.failed, 1);
        let g = fx
            .access_repo
            .get_grant_required(&SiteFilter::All, &GrantId::new("g1"))
            .await
            .unwrap();
        assert_eq!(g.status, GrantStatus::Failed);
        assert_eq!(g.sync_attempts, 4);
        assert!(g.next_attempt_at.is_none());

        let alert = fx
            .audit_repo
            .find_open_alert(&SiteId::new("s1"), alert_types::SYNC_FAILED, Some("g1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alert.priority, AlertPriority::High);
    }

    #[tokio::test]
    async fn test_permanent_rejection_fails_immediately() {
        let fx = fixture().await;
        fx.provider.script(&[MockOutcome::Permanent]).await;
        let now = t(8, 0);
        fx.access_repo.create_grant(grant(now)).await.unwrap();

        let report = fx.drainer.drain(10, now).await.unwrap();
        assert_eq!(report.failed, 1);
        let g = fx
            .access_repo
            .get_grant_required(&SiteFilter::All, &GrantId::new("g1"))
            .await
            .unwrap();
        assert_eq!(g.status, GrantStatus::Failed);
        assert_eq!(g.sync_attempts, 1);
    }

    #[tokio::test]
    async fn test_outbox_revoke_dispatch_and_transient_deferral() {
        let fx = fixture().await;
        let now = t(9, 0);
        fx.outbox_repo
            .stage(OutboxEntry::new(
                "ob1".to_string(),
                SiteId::new("s1"),
                OutboxPayload::RevokeAccess {
                    grant_id: GrantId::new("g1"),
                    provider_ref: "ref-0001".to_string(),
                },
                now,
            ))
            .await
            .unwrap();

        fx.provider.script(&[MockOutcome::Transient]).await;
        let dispatched = fx.drainer.dispatch_outbox(10, now).await.unwrap();
        assert_eq!(dispatched, 0);
        assert_eq!(fx.outbox_repo.list_pending(10).await.unwrap().len(), 1);

        let dispatched = fx.drainer.dispatch_outbox(10, now).await.unwrap();
        assert_eq!(dispatched, 1);
        assert!(fx.outbox_repo.list_pending(10).await.unwrap().is_empty());
        assert_eq!(fx.provider.revoked().await, vec!["ref-0001".to_string()]);
    }
}
