//! Consistency watchdog.
//!
//! Two layers. The first is local only: grants stuck in a pre-active state
//! past the configured threshold raise a `SYNC_STUCK` alert per site. The
//! second needs a provider that can report its grant set back: the local
//! active set is diffed against the provider's, and gate events are audited
//! against the grants that should explain them. Every finding goes through
//! the idempotent alert path, so a standing problem produces one open alert
//! rather than one per pass.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use permit_core::logging::operations;
use permit_core::{
    alert_types, provider_grant_key, AccessProvider, AlertPriority, CoreResult, GrantStatus,
    PlatformConfig, SiteFilter, SiteId,
};
use permit_store::entities::{AccessGrantEntity, GatePassResult};
use permit_store::repos::{AccessRepository, CatalogRepository};
use permit_store::services::AuditService;

/// Stuck-grant count beyond which the alert escalates to HIGH.
const STUCK_ESCALATION_COUNT: usize = 10;
/// Grant-set difference beyond which the alert escalates to HIGH.
const MISMATCH_ESCALATION_COUNT: usize = 20;

/// Findings of one reconciliation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Local active grants the provider does not know
    pub missing_at_provider: usize,
    /// Provider grants with no local counterpart
    pub extra_at_provider: usize,
    /// Pass events no grant explains
    pub unauthorized_events: usize,
    /// Active grants with no entry in their window
    pub unused_grants: usize,
}

/// The reconciler.
pub struct Reconciler {
    access_repo: Arc<dyn AccessRepository>,
    catalog_repo: Arc<dyn CatalogRepository>,
    audit: Arc<AuditService>,
    provider: Arc<dyn AccessProvider>,
    config: PlatformConfig,
}

impl Reconciler {
    pub fn new(
        access_repo: Arc<dyn AccessRepository>,
        catalog_repo: Arc<dyn CatalogRepository>,
        audit: Arc<AuditService>,
        provider: Arc<dyn AccessProvider>,
        config: PlatformConfig,
    ) -> Self {
        Self {
            access_repo,
            catalog_repo,
            audit,
            provider,
            config,
        }
    }

    /// Flag grants stuck in a pre-active state. Returns the stuck count.
    pub async fn flag_stuck(&self, now: DateTime<Utc>) -> CoreResult<usize> {
        let threshold = self.config.sync_stuck_threshold_secs;
        let stuck = self.access_repo.list_stuck_grants(now, threshold).await?;
        let mut per_site: HashMap<SiteId, usize> = HashMap::new();
        for grant in &stuck {
            *per_site.entry(grant.site_id.clone()).or_default() += 1;
        }
        for (site_id, count) in per_site {
            let priority = if count > STUCK_ESCALATION_COUNT {
                AlertPriority::High
            } else {
                AlertPriority::Medium
            };
            self.audit
                .raise_alert(
                    &site_id,
                    alert_types::SYNC_STUCK,
                    priority,
                    "Grants stuck in sync",
                    format!("{count} grants pending sync for over {threshold}s"),
                    "reconcile",
                    None,
                    now,
                )
                .await?;
        }
        Ok(stuck.len())
    }

    /// Diff the local active grant set against the provider's. A no-op when
    /// the provider cannot report its grants.
    pub async fn reconcile_site(
        &self,
        site_id: &SiteId,
        now: DateTime<Utc>,
    ) -> CoreResult<ReconcileReport> {
        let mut report = ReconcileReport::default();
        if !self.config.access_provider_caps.supports_query {
            return Ok(report);
        }

        let local = self
            .access_repo
            .list_active_grants_for_site(site_id, now)
            .await?;
        // external area ids translate back through the site's area catalog
        let areas = self.catalog_repo.list_areas_for_site(site_id).await?;
        let by_external: HashMap<&str, &str> = areas
            .iter()
            .map(|a| (a.external_id.as_str(), a.area_id.as_str()))
            .collect();

        let local_keys: Vec<(String, String)> = local
            .iter()
            .map(|g| provider_grant_key(&g.worker_id, &g.area_id))
            .collect();
        let provider_grants = self.provider.list_grants(site_id).await?;
        let provider_keys: Vec<(String, String)> = provider_grants
            .iter()
            .filter_map(|g| {
                by_external
                    .get(g.area_external_id.as_str())
                    .map(|area| (g.worker_external_id.clone(), area.to_string()))
            })
            .collect();

        report.missing_at_provider = local_keys
            .iter()
            .filter(|k| !provider_keys.contains(k))
            .count();
        report.extra_at_provider = provider_keys
            .iter()
            .filter(|k| !local_keys.contains(k))
            .count();

        let total = report.missing_at_provider + report.extra_at_provider;
        if total > 0 {
            let priority = if total > MISMATCH_ESCALATION_COUNT {
                AlertPriority::High
            } else {
                AlertPriority::Medium
            };
            self.audit
                .raise_alert(
                    site_id,
                    alert_types::ACCESS_MISMATCH,
                    priority,
                    "Grant sets diverged",
                    format!(
                        "{} local grants missing at provider, {} provider grants unknown locally",
                        report.missing_at_provider, report.extra_at_provider
                    ),
                    "reconcile",
                    None,
                    now,
                )
                .await?;
        }
        info!(
            site_id = %site_id,
            operation = operations::RECONCILE,
            missing = report.missing_at_provider,
            extra = report.extra_at_provider,
            "Grant set reconciled"
        );
        Ok(report)
    }

    /// Audit gate events of a site window against the grants that should
    /// explain them.
    pub async fn audit_events(
        &self,
        site_id: &SiteId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> CoreResult<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let events = self
            .access_repo
            .list_events_window(&SiteFilter::All, site_id, from, to)
            .await?;

        for event in &events {
            if event.result != GatePassResult::Pass {
                continue;
            }
            let (Some(worker_id), Some(area_id)) = (&event.worker_id, &event.area_id) else {
                continue;
            };
            let grants = self
                .access_repo
                .list_grants_for_worker(&SiteFilter::All, worker_id)
                .await?;
            let explained = grants
                .iter()
                .any(|g| g.area_id == *area_id && authorizes(g, event.event_time));
            if !explained {
                report.unauthorized_events += 1;
                self.audit
                    .raise_alert(
                        site_id,
                        alert_types::UNAUTHORIZED_ACCESS,
                        AlertPriority::High,
                        "Unexplained gate entry",
                        format!(
                            "worker {worker_id} passed into area {area_id} with no covering grant"
                        ),
                        "reconcile",
                        Some(event.event_id.to_string()),
                        now,
                    )
                    .await?;
            }
        }

        // active grants nobody used in their window
        let active = self
            .access_repo
            .list_active_grants_for_site(site_id, now)
            .await?;
        for grant in &active {
            if grant.valid_to > to {
                // window still open, too early to call it unused
                continue;
            }
            let used = events.iter().any(|e| {
                e.result == GatePassResult::Pass
                    && e.worker_id.as_ref() == Some(&grant.worker_id)
                    && grant.window_covers(e.event_time)
            });
            if !used {
                report.unused_grants += 1;
                self.audit
                    .raise_alert(
                        site_id,
                        alert_types::GRANT_UNUSED,
                        AlertPriority::Low,
                        "Grant never used",
                        format!(
                            "grant {} for worker {} saw no entry in its window",
                            grant.grant_id, grant.worker_id
                        ),
                        "reconcile",
                        Some(grant.grant_id.to_string()),
                        now,
                    )
                    .await?;
            }
        }
        Ok(report)
    }
}

/// Whether a grant explains a pass at the given instant. A revoked grant
/// still explains passes made before the revocation.
fn authorizes(grant: &AccessGrantEntity, at: DateTime<Utc>) -> bool {
    if !grant.window_covers(at) {
        return false;
    }
    match grant.status {
        GrantStatus::Active | GrantStatus::Expired => true,
        GrantStatus::Revoked => grant.revoked_at.map_or(false, |r| at <= r),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use permit_core::{
        AreaId, ContractorId, DailyTicketId, EventId, FanoutId, GrantId, ProviderGrant, WorkerId,
    };
    use permit_store::entities::{AccessEventEntity, AreaEntity, SiteEntity, WorkerEntity};
    use permit_store::repos::{
        AuditRepository, MemoryAccessRepo, MemoryAuditRepo, MemoryCatalogRepo,
    };
    use permit_store::sequence::IdGenerator;

    use crate::mocks::MockAccessProvider;

    struct Fixture {
        reconciler: Reconciler,
        access_repo: Arc<MemoryAccessRepo>,
        audit_repo: Arc<MemoryAuditRepo>,
        provider: Arc<MockAccessProvider>,
    }

    async fn fixture(supports_query: bool) -> Fixture {
        let ids = Arc::new(IdGenerator::new());
        let access_repo = Arc::new(MemoryAccessRepo::new());
        let catalog = Arc::new(MemoryCatalogRepo::new());
        let audit_repo = Arc::new(MemoryAuditRepo::new());
        let provider = Arc::new(MockAccessProvider::new());
        let mut config = PlatformConfig::default();
        config.access_provider_caps.supports_query = supports_query;
        let reconciler = Reconciler::new(
            access_repo.clone(),
            catalog.clone(),
            Arc::new(AuditService::new(audit_repo.clone(), ids)),
            provider.clone(),
            config,
        );

        let now = t(3, 1, 6);
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
            reconciler,
            access_repo,
            audit_repo,
            provider,
        }
    }

    fn t(day: u32, hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, min, 0).unwrap()
    }

    fn active_grant(id: &str, now: DateTime<Utc>) -> AccessGrantEntity {
        let mut grant = AccessGrantEntity::new(
            GrantId::new(id),
            SiteId::new("s1"),
            WorkerId::new("w1"),
            AreaId::new("a1"),
            DailyTicketId::new("dt1"),
            FanoutId::new("f1"),
            t(1, 6, 0),
            t(1, 20, 0),
            now,
        );
        grant.status = GrantStatus::Active;
        grant.provider_ref = Some(format!("ref-{id}"));
        grant.next_attempt_at = None;
        grant
    }

    fn pass_event(id: &str, at: DateTime<Utc>) -> AccessEventEntity {
        AccessEventEntity {
            event_id: EventId::new(id),
            site_id: SiteId::new("s1"),
            vendor_event_id: Some(format!("v-{id}")),
            device_id: "gate-1".to_string(),
            worker_id: Some(WorkerId::new("w1")),
            area_id: Some(AreaId::new("a1")),
            event_time: at,
            direction: Some("IN".to_string()),
            result: GatePassResult::Pass,
            reason_code: None,
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_stuck_grants_raise_one_alert_per_site() {
        let fx = fixture(false).await;
        let created = t(1, 6, 0);
        for id in ["g1", "g2"] {
            let mut g = active_grant(id, created);
            g.status = GrantStatus::Pending;
            fx.access_repo.create_grant(g).await.unwrap();
        }

        let now = t(1, 6, 20);
        assert_eq!(fx.reconciler.flag_stuck(now).await.unwrap(), 2);
        // a second pass keeps the single open alert
        assert_eq!(fx.reconciler.flag_stuck(now).await.unwrap(), 2);

        let stats = fx
            .audit_repo
            .alert_stats(&SiteFilter::All, &SiteId::new("s1"))
            .await
            .unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.medium, 1);
    }

    #[tokio::test]
    async fn test_reconcile_skipped_without_query_support() {
        let fx = fixture(false).await;
        fx.access_repo
            .create_grant(active_grant("g1", t(1, 6, 0)))
            .await
            .unwrap();

        let report = fx.reconciler.reconcile_site(&SiteId::new("s1"), t(1, 8, 0)).await.unwrap();
        assert_eq!(report, ReconcileReport::default());
    }

    #[tokio::test]
    async fn test_mismatch_raises_alert() {
        let fx = fixture(true).await;
        // local active grant the provider does not know
        fx.access_repo
            .create_grant(active_grant("g1", t(1, 6, 0)))
            .await
            .unwrap();
        // provider grant with no local counterpart
        fx.provider
            .seed_grants(vec![ProviderGrant {
                worker_external_id: "w9".to_string(),
                area_external_id: "a1".to_string(),
                provider_ref: "ref-x".to_string(),
            }])
            .await;

        let report = fx.reconciler.reconcile_site(&SiteId::new("s1"), t(1, 8, 0)).await.unwrap();
        assert_eq!(report.missing_at_provider, 1);
        assert_eq!(report.extra_at_provider, 1);

        let alert = fx
            .audit_repo
            .find_open_alert(&SiteId::new("s1"), alert_types::ACCESS_MISMATCH, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alert.priority, AlertPriority::Medium);
    }

    #[tokio::test]
    async fn test_unauthorized_pass_alert_is_idempotent() {
        let fx = fixture(false).await;
        fx.access_repo
            .insert_event(pass_event("e1", t(1, 9, 30)))
            .await
            .unwrap();

        let report = fx
            .reconciler
            .audit_events(&SiteId::new("s1"), t(1, 0, 0), t(1, 23, 0), t(1, 23, 0))
            .await
            .unwrap();
        assert_eq!(report.unauthorized_events, 1);

        // the same finding on the next pass reuses the open alert
        fx.reconciler
            .audit_events(&SiteId::new("s1"), t(1, 0, 0), t(1, 23, 0), t(1, 23, 30))
            .await
            .unwrap();
        let stats = fx
            .audit_repo
            .alert_stats(&SiteFilter::All, &SiteId::new("s1"))
            .await
            .unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.high, 1);
    }

    #[tokio::test]
    async fn test_covered_pass_raises_nothing() {
        let fx = fixture(false).await;
        fx.access_repo
            .create_grant(active_grant("g1", t(1, 6, 0)))
            .await
            .unwrap();
        fx.access_repo
            .insert_event(pass_event("e1", t(1, 9, 30)))
            .await
            .unwrap();

        let report = fx
            .reconciler
            .audit_events(&SiteId::new("s1"), t(1, 0, 0), t(1, 12, 0), t(1, 12, 0))
            .await
            .unwrap();
        assert_eq!(report.unauthorized_events, 0);
        assert_eq!(report.unused_grants, 0);
    }

    #[tokio::test]
    async fn test_unused_grant_gets_low_alert() {
        let fx = fixture(false).await;
        fx.access_repo
            .create_grant(active_grant("g1", t(1, 6, 0)))
            .await
            .unwrap();

        // audit after the grant window closed, no events at all
        let report = fx
            .reconciler
            .audit_events(&SiteId::new("s1"), t(1, 0, 0), t(1, 20, 0), t(1, 20, 0))
            .await
            .unwrap();
        assert_eq!(report.unused_grants, 1);

        let alert = fx
            .audit_repo
            .find_open_alert(&SiteId::new("s1"), alert_types::GRANT_UNUSED, Some("g1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alert.priority, AlertPriority::Low);
    }
}
