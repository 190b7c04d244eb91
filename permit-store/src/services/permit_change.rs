//! Post-approval permit changes.
//!
//! An approved or in-progress permit can still gain and lose workers,
//! areas, and days. Every change validates fully before touching state,
//! then reconciles the derived rows: fanouts for workers, access grants
//! for areas, daily tickets for dates. The audit log carries a before and
//! after snapshot of the permit surface.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use permit_core::logging::operations;
use permit_core::{
    notification_types, AreaId, CoreError, CoreResult, DailyTicketId, FanoutId,
    NotificationPriority, PermitId, RevokeReason, SiteFilter, TenantContext, TrainingStatus,
    WorkerId,
};

use crate::entities::{DailyTicketEntity, DailyTicketWorkerEntity, WorkPermitEntity};
use crate::services::permit_service::{permit_diff, PermitService};
use crate::services::AuditInput;

/// One change applied to an approved or in-progress permit.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermitChange {
    AddWorker { worker_id: WorkerId },
    RemoveWorker { worker_id: WorkerId },
    AddArea { area_id: AreaId },
    RemoveArea { area_id: AreaId },
    ShiftDates { start_date: NaiveDate, end_date: NaiveDate },
}

impl PermitService {
    /// Apply one change to a permit that accepts changes. Validation is
    /// complete before the first write; a rejected change leaves no trace.
    pub async fn apply_change(
        &self,
        ctx: &TenantContext,
        permit_id: &PermitId,
        change: PermitChange,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<WorkPermitEntity> {
        let reason = reason.into();
        let permit = self
            .permit_repo()
            .get_permit_required(&ctx.site_filter(), permit_id)
            .await?;
        ctx.require_site(&permit.site_id)?;
        if !permit.status.accepts_changes() {
            return Err(CoreError::precondition(format!(
                "permit in status {} does not accept changes",
                permit.status
            )));
        }
        let old = permit_diff(&permit);

        let permit = match change {
            PermitChange::AddWorker { worker_id } => {
                self.add_worker(permit, worker_id, now).await?
            }
            PermitChange::RemoveWorker { worker_id } => {
                self.remove_worker(permit, worker_id, now).await?
            }
            PermitChange::AddArea { area_id } => self.add_area(permit, area_id, now).await?,
            PermitChange::RemoveArea { area_id } => {
                self.remove_area(permit, area_id, now).await?
            }
            PermitChange::ShiftDates {
                start_date,
                end_date,
            } => self.shift_dates(permit, start_date, end_date, now).await?,
        };

        info!(
            permit_id = %permit.permit_id,
            site_id = %permit.site_id,
            operation = operations::PERMIT_CHANGE,
            "Permit change applied"
        );
        self.audit()
            .record(
                ctx,
                Some(permit.site_id.clone()),
                AuditInput::success("PERMIT_CHANGE", "WorkPermit", permit.permit_id.as_str())
                    .with_diff(Some(old), Some(permit_diff(&permit)))
                    .with_reason(reason),
                now,
            )
            .await?;
        Ok(permit)
    }

    async fn add_worker(
        &self,
        mut permit: WorkPermitEntity,
        worker_id: WorkerId,
        now: DateTime<Utc>,
    ) -> CoreResult<WorkPermitEntity> {
        if permit.worker_ids.contains(&worker_id) {
            return Err(CoreError::conflict("worker already assigned"));
        }
        self.validate_worker(&permit, &worker_id).await?;

        permit.worker_ids.push(worker_id.clone());
        permit.updated_at = now;
        let permit = self.permit_repo().update_permit(permit).await?;

        for ticket in self.active_tickets(&permit.permit_id).await? {
            match self
                .permit_repo()
                .find_fanout(&SiteFilter::All, &ticket.daily_ticket_id, &worker_id)
                .await?
            {
                Some(mut fanout) => {
                    // Re-adding a previously removed worker restarts training
                    if fanout.removed {
                        fanout.removed = false;
                        fanout.training_status = TrainingStatus::NotStarted;
                        fanout.training_fail_reason = None;
                        fanout.authorized = false;
                        fanout.updated_at = now;
                        self.permit_repo().update_fanout(fanout).await?;
                    }
                }
                None => {
                    let fanout = DailyTicketWorkerEntity::new(
                        FanoutId::new(self.ids().next_id("fanout", now)),
                        &ticket,
                        worker_id.clone(),
                        now,
                    );
                    self.permit_repo().create_fanouts(vec![fanout]).await?;
                }
            }
            self.notifications()
                .enqueue(
                    &permit.site_id,
                    &worker_id,
                    notification_types::TRAINING_REQUIRED,
                    NotificationPriority::High,
                    serde_json::json!({ "date": ticket.date.to_string() }),
                    Some(ticket.daily_ticket_id.to_string()),
                    None,
                    now,
                )
                .await?;
        }
        Ok(permit)
    }

    async fn remove_worker(
        &self,
        mut permit: WorkPermitEntity,
        worker_id: WorkerId,
        now: DateTime<Utc>,
    ) -> CoreResult<WorkPermitEntity> {
        if !permit.worker_ids.contains(&worker_id) {
            return Err(CoreError::validation("worker is not assigned"));
        }
        if permit.worker_ids.len() == 1 {
            return Err(CoreError::precondition("at least one worker must remain"));
        }

        permit.worker_ids.retain(|w| w != &worker_id);
        permit.updated_at = now;
        let permit = self.permit_repo().update_permit(permit).await?;

        for ticket in self.active_tickets(&permit.permit_id).await? {
            if let Some(mut fanout) = self
                .permit_repo()
                .find_fanout(&SiteFilter::All, &ticket.daily_ticket_id, &worker_id)
                .await?
            {
                if fanout.removed {
                    continue;
                }
                fanout.removed = true;
                fanout.authorized = false;
                fanout.updated_at = now;
                let fanout = self.permit_repo().update_fanout(fanout).await?;
                self.access()
                    .revoke_for_fanout(&fanout.fanout_id, RevokeReason::WorkerRemoved, now)
                    .await?;
            }
        }
        self.notifications()
            .enqueue(
                &permit.site_id,
                &worker_id,
                notification_types::TICKET_CHANGED,
                NotificationPriority::High,
                serde_json::json!({ "change": "WORKER_REMOVED" }),
                Some(permit.permit_id.to_string()),
                None,
                now,
            )
            .await?;
        Ok(permit)
    }

    async fn add_area(
        &self,
        mut permit: WorkPermitEntity,
        area_id: AreaId,
        now: DateTime<Utc>,
    ) -> CoreResult<WorkPermitEntity> {
        if permit.area_ids.contains(&area_id) {
            return Err(CoreError::conflict("area already assigned"));
        }
        self.validate_area(&permit, &area_id).await?;

        permit.area_ids.push(area_id);
        permit.updated_at = now;
        let permit = self.permit_repo().update_permit(permit).await?;

        // Workers that already passed training get the new area's grant
        // without retraining.
        for ticket in self.active_tickets(&permit.permit_id).await? {
            let fanouts = self
                .permit_repo()
                .list_fanouts_for_ticket(&SiteFilter::All, &ticket.daily_ticket_id)
                .await?;
            for fanout in fanouts {
                if fanout.removed || fanout.training_status != TrainingStatus::Completed {
                    continue;
                }
                self.access().create_grants_for_fanout(&fanout, now).await?;
            }
        }
        Ok(permit)
    }

    async fn remove_area(
        &self,
        mut permit: WorkPermitEntity,
        area_id: AreaId,
        now: DateTime<Utc>,
    ) -> CoreResult<WorkPermitEntity> {
        if !permit.area_ids.contains(&area_id) {
            return Err(CoreError::validation("area is not assigned"));
        }
        if permit.area_ids.len() == 1 {
            return Err(CoreError::precondition("at least one area must remain"));
        }

        permit.area_ids.retain(|a| a != &area_id);
        permit.updated_at = now;
        let permit = self.permit_repo().update_permit(permit).await?;

        for ticket in self.active_tickets(&permit.permit_id).await? {
            let fanouts = self
                .permit_repo()
                .list_fanouts_for_ticket(&SiteFilter::All, &ticket.daily_ticket_id)
                .await?;
            for fanout in fanouts {
                self.access()
                    .revoke_for_fanout_area(
                        &fanout.fanout_id,
                        &area_id,
                        RevokeReason::AreaRemoved,
                        now,
                    )
                    .await?;
            }
        }
        Ok(permit)
    }

    async fn shift_dates(
        &self,
        mut permit: WorkPermitEntity,
        start_date: NaiveDate,
        end_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> CoreResult<WorkPermitEntity> {
        if start_date > end_date {
            return Err(CoreError::validation(
                "start date must not be after end date",
            ));
        }
        if permit.status == permit_core::PermitStatus::InProgress && end_date < now.date_naive() {
            return Err(CoreError::precondition(
                "new window must not shrink past today",
            ));
        }

        let old_dates = permit.dates();
        permit.start_date = start_date;
        permit.end_date = end_date;
        let new_dates = permit.dates();
        permit.updated_at = now;
        let permit = self.permit_repo().update_permit(permit).await?;

        // Added days get fresh tickets and fanouts.
        for date in new_dates.iter().filter(|d| !old_dates.contains(d)) {
            let ticket = DailyTicketEntity {
                daily_ticket_id: DailyTicketId::new(self.ids().next_id("dt", now)),
                permit_id: permit.permit_id.clone(),
                site_id: permit.site_id.clone(),
                date: *date,
                status: permit_core::DailyTicketStatus::Published,
                access_start: permit.access_start,
                access_end: permit.access_end,
                created_at: now,
                updated_at: now,
            };
            self.permit_repo()
                .create_daily_tickets(vec![ticket.clone()])
                .await?;
            let fanouts: Vec<_> = permit
                .worker_ids
                .iter()
                .map(|worker_id| {
                    DailyTicketWorkerEntity::new(
                        FanoutId::new(self.ids().next_id("fanout", now)),
                        &ticket,
                        worker_id.clone(),
                        now,
                    )
                })
                .collect();
            self.permit_repo().create_fanouts(fanouts).await?;
            for worker_id in &permit.worker_ids {
                self.notifications()
                    .enqueue(
                        &permit.site_id,
                        worker_id,
                        notification_types::TRAINING_REQUIRED,
                        NotificationPriority::High,
                        serde_json::json!({ "date": date.to_string() }),
                        Some(ticket.daily_ticket_id.to_string()),
                        None,
                        now,
                    )
                    .await?;
            }
        }

        // Dropped days are cancelled and their grants pulled.
        let tickets = self
            .permit_repo()
            .list_daily_tickets_for_permit(&SiteFilter::All, &permit.permit_id)
            .await?;
        for mut ticket in tickets {
            if new_dates.contains(&ticket.date) || !ticket.status.is_active() {
                continue;
            }
            let workers = self.cancel_ticket(&mut ticket, now).await?;
            self.access()
                .revoke_for_ticket(&ticket.daily_ticket_id, RevokeReason::Manual, now)
                .await?;
            for worker_id in workers {
                self.notifications()
                    .enqueue(
                        &permit.site_id,
                        &worker_id,
                        notification_types::TICKET_CHANGED,
                        NotificationPriority::High,
                        serde_json::json!({ "change": "DAY_CANCELLED", "date": ticket.date.to_string() }),
                        Some(ticket.daily_ticket_id.to_string()),
                        None,
                        now,
                    )
                    .await?;
            }
        }
        Ok(permit)
    }

    async fn active_tickets(&self, permit_id: &PermitId) -> CoreResult<Vec<DailyTicketEntity>> {
        let tickets = self
            .permit_repo()
            .list_daily_tickets_for_permit(&SiteFilter::All, permit_id)
            .await?;
        Ok(tickets.into_iter().filter(|t| t.status.is_active()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use permit_core::{
        ActorId, ContractorId, GrantStatus, PlatformConfig, PushProvider, SiteId,
    };

    use crate::entities::{AreaEntity, ContractorEntity, SiteEntity, WorkerEntity};
    use crate::repos::{
        AccessRepository, AuditRepository, CatalogRepository, MemoryAccessRepo, MemoryAuditRepo,
        MemoryCatalogRepo, MemoryNotificationRepo, MemoryOutboxRepo, MemoryPermitRepo,
        PermitRepository,
    };
    use crate::sequence::IdGenerator;
    use crate::services::{
        AccessService, AuditService, CreatePermitRequest, NotificationService, PermitService,
    };

    struct NullPush;

    #[async_trait]
    impl PushProvider for NullPush {
        async fn send(
            &self,
            _worker_id: &WorkerId,
            _template_id: &str,
            _payload: &serde_json::Value,
        ) -> CoreResult<()> {
            Ok(())
        }
    }

    struct Fixture {
        svc: PermitService,
        permits: Arc<MemoryPermitRepo>,
        access_repo: Arc<MemoryAccessRepo>,
        audit_repo: Arc<MemoryAuditRepo>,
    }

    async fn fixture() -> Fixture {
        let ids = Arc::new(IdGenerator::new());
        let permits = Arc::new(MemoryPermitRepo::new());
        let access_repo = Arc::new(MemoryAccessRepo::new());
        let catalog = Arc::new(MemoryCatalogRepo::new());
        let audit_repo = Arc::new(MemoryAuditRepo::new());
        let access = Arc::new(AccessService::new(
            access_repo.clone(),
            permits.clone(),
            Arc::new(MemoryOutboxRepo::new()),
            ids.clone(),
        ));
        let audit = Arc::new(AuditService::new(audit_repo.clone(), ids.clone()));
        let notifications = Arc::new(NotificationService::new(
            Arc::new(MemoryNotificationRepo::new()),
            Arc::new(NullPush),
            ids.clone(),
            PlatformConfig::default(),
        ));
        let svc = PermitService::new(
            permits.clone(),
            catalog.clone(),
            access,
            audit,
            notifications,
            ids,
        );

        let now = t(2, 20, 8);
        catalog
            .create_site(SiteEntity::new(SiteId::new("s1"), "north yard", now))
            .await
            .unwrap();
        catalog
            .create_contractor(ContractorEntity::new(
                ContractorId::new("c1"),
                "steelworks",
                vec![SiteId::new("s1")],
                now,
            ))
            .await
            .unwrap();
        for (id, number) in [("w1", "110101"), ("w2", "110102")] {
            catalog
                .create_worker(WorkerEntity::new(
                    WorkerId::new(id),
                    SiteId::new("s1"),
                    ContractorId::new("c1"),
                    id,
                    number,
                    now,
                ))
                .await
                .unwrap();
        }
        for id in ["a1", "a2"] {
            catalog
                .create_area(AreaEntity::new(
                    AreaId::new(id),
                    SiteId::new("s1"),
                    id,
                    now,
                ))
                .await
                .unwrap();
        }

        Fixture {
            svc,
            permits,
            access_repo,
            audit_repo,
        }
    }

    fn t(month: u32, day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, month, day, hour, 0, 0).unwrap()
    }

    fn d(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, month, day).unwrap()
    }

    fn admin() -> TenantContext {
        TenantContext::global_admin(ActorId::new("admin"))
    }

    async fn approved(fx: &Fixture, workers: &[&str], areas: &[&str]) -> WorkPermitEntity {
        let ctx = admin();
        let now = t(2, 20, 9);
        let request = CreatePermitRequest {
            site_id: SiteId::new("s1"),
            contractor_id: ContractorId::new("c1"),
            title: "scaffolding, tower 2".to_string(),
            remark: None,
            start_date: d(3, 1),
            end_date: d(3, 2),
            area_ids: areas.iter().map(|a| AreaId::new(*a)).collect(),
            worker_ids: workers.iter().map(|w| WorkerId::new(*w)).collect(),
            access_start: None,
            access_end: None,
        };
        let permit = fx.svc.create(&ctx, request, now).await.unwrap();
        fx.svc.submit(&ctx, &permit.permit_id, now).await.unwrap();
        fx.svc.approve(&ctx, &permit.permit_id, now).await.unwrap()
    }

    async fn first_fanout(fx: &Fixture, permit: &WorkPermitEntity) -> DailyTicketWorkerEntity {
        let tickets = fx
            .permits
            .list_daily_tickets_for_permit(&SiteFilter::All, &permit.permit_id)
            .await
            .unwrap();
        let fanouts = fx
            .permits
            .list_fanouts_for_ticket(&SiteFilter::All, &tickets[0].daily_ticket_id)
            .await
            .unwrap();
        fanouts[0].clone()
    }

    #[tokio::test]
    async fn test_remove_last_area_is_rejected_without_side_effects() {
        let fx = fixture().await;
        let ctx = admin();
        let permit = approved(&fx, &["w1"], &["a1"]).await;

        let audits_before = fx
            .audit_repo
            .list_audit_for_resource(&SiteFilter::All, "WorkPermit", permit.permit_id.as_str())
            .await
            .unwrap()
            .len();

        let err = fx
            .svc
            .apply_change(
                &ctx,
                &permit.permit_id,
                PermitChange::RemoveArea {
                    area_id: AreaId::new("a1"),
                },
                "wrong zone",
                t(3, 1, 9),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("at least one area must remain"));

        let reloaded = fx
            .permits
            .get_permit_required(&SiteFilter::All, &permit.permit_id)
            .await
            .unwrap();
        assert_eq!(reloaded.area_ids, vec![AreaId::new("a1")]);
        let audits_after = fx
            .audit_repo
            .list_audit_for_resource(&SiteFilter::All, "WorkPermit", permit.permit_id.as_str())
            .await
            .unwrap()
            .len();
        assert_eq!(audits_before, audits_after);
    }

    #[tokio::test]
    async fn test_changes_rejected_before_approval() {
        let fx = fixture().await;
        let ctx = admin();
        let now = t(2, 20, 9);
        let permit = fx
            .svc
            .create(
                &ctx,
                CreatePermitRequest {
                    site_id: SiteId::new("s1"),
                    contractor_id: ContractorId::new("c1"),
                    title: "draft".to_string(),
                    remark: None,
                    start_date: d(3, 1),
                    end_date: d(3, 2),
                    area_ids: vec![AreaId::new("a1")],
                    worker_ids: vec![WorkerId::new("w1")],
                    access_start: None,
                    access_end: None,
                },
                now,
            )
            .await
            .unwrap();

        let err = fx
            .svc
            .apply_change(
                &ctx,
                &permit.permit_id,
                PermitChange::AddArea {
                    area_id: AreaId::new("a2"),
                },
                "extend",
                now,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not accept changes"));
    }

    #[tokio::test]
    async fn test_add_worker_creates_fanouts_and_audits() {
        let fx = fixture().await;
        let ctx = admin();
        let permit = approved(&fx, &["w1"], &["a1"]).await;

        let permit = fx
            .svc
            .apply_change(
                &ctx,
                &permit.permit_id,
                PermitChange::AddWorker {
                    worker_id: WorkerId::new("w2"),
                },
                "extra hands",
                t(3, 1, 9),
            )
            .await
            .unwrap();
        assert!(permit.worker_ids.contains(&WorkerId::new("w2")));

        let tickets = fx
            .permits
            .list_daily_tickets_for_permit(&SiteFilter::All, &permit.permit_id)
            .await
            .unwrap();
        for ticket in &tickets {
            let fanout = fx
                .permits
                .find_fanout(&SiteFilter::All, &ticket.daily_ticket_id, &WorkerId::new("w2"))
                .await
                .unwrap();
            assert!(fanout.is_some());
        }

        let entries = fx
            .audit_repo
            .list_audit_for_resource(&SiteFilter::All, "WorkPermit", permit.permit_id.as_str())
            .await
            .unwrap();
        assert_eq!(entries[0].action, "PERMIT_CHANGE");

        let err = fx
            .svc
            .apply_change(
                &ctx,
                &permit.permit_id,
                PermitChange::AddWorker {
                    worker_id: WorkerId::new("w2"),
                },
                "again",
                t(3, 1, 10),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("worker already assigned"));
    }

    #[tokio::test]
    async fn test_remove_worker_revokes_grants_and_marks_fanouts() {
        let fx = fixture().await;
        let ctx = admin();
        let permit = approved(&fx, &["w1", "w2"], &["a1"]).await;

        // w2 already passed training and holds a grant
        let tickets = fx
            .permits
            .list_daily_tickets_for_permit(&SiteFilter::All, &permit.permit_id)
            .await
            .unwrap();
        let mut fanout = fx
            .permits
            .find_fanout(&SiteFilter::All, &tickets[0].daily_ticket_id, &WorkerId::new("w2"))
            .await
            .unwrap()
            .unwrap();
        fanout.training_status = TrainingStatus::Completed;
        fanout.authorized = true;
        let fanout = fx.permits.update_fanout(fanout).await.unwrap();
        fx.svc
            .access()
            .create_grants_for_fanout(&fanout, t(3, 1, 5))
            .await
            .unwrap();

        let permit = fx
            .svc
            .apply_change(
                &ctx,
                &permit.permit_id,
                PermitChange::RemoveWorker {
                    worker_id: WorkerId::new("w2"),
                },
                "reassigned",
                t(3, 1, 9),
            )
            .await
            .unwrap();
        assert_eq!(permit.worker_ids, vec![WorkerId::new("w1")]);

        let fanout = fx
            .permits
            .find_fanout(&SiteFilter::All, &tickets[0].daily_ticket_id, &WorkerId::new("w2"))
            .await
            .unwrap()
            .unwrap();
        assert!(fanout.removed);
        assert!(!fanout.authorized);
        let grants = fx
            .access_repo
            .list_grants_for_fanout(&SiteFilter::All, &fanout.fanout_id)
            .await
            .unwrap();
        assert!(grants.iter().all(|g| g.status == GrantStatus::Revoked));
    }

    #[tokio::test]
    async fn test_remove_last_worker_is_rejected() {
        let fx = fixture().await;
        let ctx = admin();
        let permit = approved(&fx, &["w1"], &["a1"]).await;

        let err = fx
            .svc
            .apply_change(
                &ctx,
                &permit.permit_id,
                PermitChange::RemoveWorker {
                    worker_id: WorkerId::new("w1"),
                },
                "gone",
                t(3, 1, 9),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("at least one worker must remain"));
    }

    #[tokio::test]
    async fn test_add_area_grants_workers_who_already_passed() {
        let fx = fixture().await;
        let ctx = admin();
        let permit = approved(&fx, &["w1"], &["a1"]).await;

        let mut fanout = first_fanout(&fx, &permit).await;
        fanout.training_status = TrainingStatus::Completed;
        fanout.authorized = true;
        let fanout = fx.permits.update_fanout(fanout).await.unwrap();

        fx.svc
            .apply_change(
                &ctx,
                &permit.permit_id,
                PermitChange::AddArea {
                    area_id: AreaId::new("a2"),
                },
                "extended zone",
                t(3, 1, 9),
            )
            .await
            .unwrap();

        let grant = fx
            .access_repo
            .find_grant(&SiteFilter::All, &fanout.fanout_id, &AreaId::new("a2"))
            .await
            .unwrap();
        assert!(grant.is_some());
    }

    #[tokio::test]
    async fn test_remove_area_revokes_only_that_area() {
        let fx = fixture().await;
        let ctx = admin();
        let permit = approved(&fx, &["w1"], &["a1", "a2"]).await;

        let mut fanout = first_fanout(&fx, &permit).await;
        fanout.training_status = TrainingStatus::Completed;
        fanout.authorized = true;
        let fanout = fx.permits.update_fanout(fanout).await.unwrap();
        fx.svc
            .access()
            .create_grants_for_fanout(&fanout, t(3, 1, 5))
            .await
            .unwrap();

        fx.svc
            .apply_change(
                &ctx,
                &permit.permit_id,
                PermitChange::RemoveArea {
                    area_id: AreaId::new("a2"),
                },
                "zone closed",
                t(3, 1, 9),
            )
            .await
            .unwrap();

        let grants = fx
            .access_repo
            .list_grants_for_fanout(&SiteFilter::All, &fanout.fanout_id)
            .await
            .unwrap();
        let revoked: Vec<_> = grants
            .iter()
            .filter(|g| g.status == GrantStatus::Revoked)
            .collect();
        assert_eq!(revoked.len(), 1);
        assert_eq!(revoked[0].area_id, AreaId::new("a2"));
        assert!(grants
            .iter()
            .any(|g| g.area_id == AreaId::new("a1") && g.status != GrantStatus::Revoked));
    }

    #[tokio::test]
    async fn test_shift_dates_adds_and_cancels_days() {
        let fx = fixture().await;
        let ctx = admin();
        let permit = approved(&fx, &["w1"], &["a1"]).await;

        let permit = fx
            .svc
            .apply_change(
                &ctx,
                &permit.permit_id,
                PermitChange::ShiftDates {
                    start_date: d(3, 2),
                    end_date: d(3, 4),
                },
                "weather delay",
                t(2, 25, 9),
            )
            .await
            .unwrap();
        assert_eq!(permit.start_date, d(3, 2));
        assert_eq!(permit.end_date, d(3, 4));

        let tickets = fx
            .permits
            .list_daily_tickets_for_permit(&SiteFilter::All, &permit.permit_id)
            .await
            .unwrap();
        assert_eq!(tickets.len(), 4);
        let by_date: Vec<_> = tickets.iter().map(|t| (t.date, t.status)).collect();
        assert!(by_date.contains(&(d(3, 1), permit_core::DailyTicketStatus::Cancelled)));
        for day in [2, 3, 4] {
            assert!(by_date.contains(&(d(3, day), permit_core::DailyTicketStatus::Published)));
        }

        // new days carry fanouts for every assigned worker
        let added = tickets.iter().find(|t| t.date == d(3, 4)).unwrap();
        let fanouts = fx
            .permits
            .list_fanouts_for_ticket(&SiteFilter::All, &added.daily_ticket_id)
            .await
            .unwrap();
        assert_eq!(fanouts.len(), 1);
        assert_eq!(fanouts[0].worker_id, WorkerId::new("w1"));
    }
}
