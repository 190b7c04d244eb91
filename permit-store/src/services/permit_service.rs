//! Work-permit core.
//!
//! Owns the permit state machine and the daily-ticket fanout it drives.
//! Approval materializes one daily ticket per date in the permit window and
//! one fanout row per assigned worker and day; those rows carry the
//! training obligation and, once training passes, the access grants. The
//! daily scheduler moves tickets through their day and closes out grants
//! at day end.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use permit_core::logging::operations;
use permit_core::{
    alert_types, notification_types, AlertPriority, AreaId, ContractorId, CoreError, CoreResult,
    DailyTicketId, DailyTicketStatus, FanoutId, NotificationPriority, PermitId, PermitStatus,
    RevokeReason, SiteFilter, SiteId, TenantContext, WorkerId, WorkerStatus,
};

use crate::entities::{
    DailyTicketEntity, DailyTicketWorkerEntity, PermitAggregate, WorkPermitEntity,
};
use crate::repos::{CatalogRepository, Page, PermitListFilter, PermitRepository};
use crate::sequence::IdGenerator;
use crate::services::{AccessService, AuditInput, AuditService, NotificationService};

/// Input for creating a permit draft.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreatePermitRequest {
    pub site_id: SiteId,
    pub contractor_id: ContractorId,
    pub title: String,
    pub remark: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub area_ids: Vec<AreaId>,
    pub worker_ids: Vec<WorkerId>,
    /// Daily access window override; the site default applies when absent
    pub access_start: Option<NaiveTime>,
    pub access_end: Option<NaiveTime>,
}

/// Per-id outcome of a batch permit operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchPermitOutcome {
    pub permit_id: PermitId,
    pub ok: bool,
    pub error: Option<String>,
}

/// Work-permit service.
pub struct PermitService {
    permit_repo: Arc<dyn PermitRepository>,
    catalog_repo: Arc<dyn CatalogRepository>,
    access: Arc<AccessService>,
    audit: Arc<AuditService>,
    notifications: Arc<NotificationService>,
    ids: Arc<IdGenerator>,
}

impl PermitService {
    pub fn new(
        permit_repo: Arc<dyn PermitRepository>,
        catalog_repo: Arc<dyn CatalogRepository>,
        access: Arc<AccessService>,
        audit: Arc<AuditService>,
        notifications: Arc<NotificationService>,
        ids: Arc<IdGenerator>,
    ) -> Self {
        Self {
            permit_repo,
            catalog_repo,
            access,
            audit,
            notifications,
            ids,
        }
    }

    pub(crate) fn permit_repo(&self) -> &Arc<dyn PermitRepository> {
        &self.permit_repo
    }

    pub(crate) fn catalog_repo(&self) -> &Arc<dyn CatalogRepository> {
        &self.catalog_repo
    }

    pub(crate) fn access(&self) -> &Arc<AccessService> {
        &self.access
    }

    pub(crate) fn audit(&self) -> &Arc<AuditService> {
        &self.audit
    }

    pub(crate) fn notifications(&self) -> &Arc<NotificationService> {
        &self.notifications
    }

    pub(crate) fn ids(&self) -> &Arc<IdGenerator> {
        &self.ids
    }

    /// Create a permit draft.
    pub async fn create(
        &self,
        ctx: &TenantContext,
        request: CreatePermitRequest,
        now: DateTime<Utc>,
    ) -> CoreResult<WorkPermitEntity> {
        ctx.require_site(&request.site_id)?;
        if request.start_date > request.end_date {
            return Err(CoreError::validation(
                "start date must not be after end date",
            ));
        }
        let site = self.catalog_repo.get_site_required(&request.site_id).await?;
        let contractor = self
            .catalog_repo
            .get_contractor_required(&request.contractor_id)
            .await?;
        if !contractor.is_bound_to(&request.site_id) {
            return Err(CoreError::validation(
                "contractor is not bound to the site",
            ));
        }

        let mut permit = WorkPermitEntity::new(
            PermitId::new(self.ids.next_id("permit", now)),
            request.site_id.clone(),
            request.contractor_id.clone(),
            request.title,
            request.start_date,
            request.end_date,
            ctx.actor_id.clone(),
            now,
        );
        permit.remark = request.remark;
        permit.access_start = request.access_start.unwrap_or(site.default_access_start);
        permit.access_end = request.access_end.unwrap_or(site.default_access_end);

        for area_id in dedup(request.area_ids) {
            self.validate_area(&permit, &area_id).await?;
            permit.area_ids.push(area_id);
        }
        for worker_id in dedup(request.worker_ids) {
            self.validate_worker(&permit, &worker_id).await?;
            permit.worker_ids.push(worker_id);
        }

        let permit = self.permit_repo.create_permit(permit).await?;
        self.audit
            .record(
                ctx,
                Some(permit.site_id.clone()),
                AuditInput::success("PERMIT_CREATE", "WorkPermit", permit.permit_id.as_str())
                    .with_diff(None, Some(permit_diff(&permit))),
                now,
            )
            .await?;
        Ok(permit)
    }

    /// Submit a draft for approval.
    pub async fn submit(
        &self,
        ctx: &TenantContext,
        permit_id: &PermitId,
        now: DateTime<Utc>,
    ) -> CoreResult<WorkPermitEntity> {
        let mut permit = self.load_in(ctx, permit_id, PermitStatus::Draft, "submit").await?;
        if permit.area_ids.is_empty() {
            return Err(CoreError::precondition("at least one area is required"));
        }
        if permit.worker_ids.is_empty() {
            return Err(CoreError::precondition("at least one worker is required"));
        }
        if permit.start_date > permit.end_date {
            return Err(CoreError::validation(
                "start date must not be after end date",
            ));
        }
        for worker_id in permit.worker_ids.clone() {
            self.validate_worker(&permit, &worker_id).await?;
        }

        permit.status = PermitStatus::Submitted;
        permit.updated_at = now;
        let permit = self.permit_repo.update_permit(permit).await?;
        info!(
            permit_id = %permit.permit_id,
            site_id = %permit.site_id,
            operation = operations::PERMIT_SUBMIT,
            "Permit submitted"
        );
        self.record_transition(ctx, &permit, "PERMIT_SUBMIT", None, now).await?;
        Ok(permit)
    }

    /// Approve a submitted permit: generate daily tickets and fanouts for
    /// every date in the window and notify each assigned worker of the
    /// training obligation.
    pub async fn approve(
        &self,
        ctx: &TenantContext,
        permit_id: &PermitId,
        now: DateTime<Utc>,
    ) -> CoreResult<WorkPermitEntity> {
        let mut permit = self
            .load_in(ctx, permit_id, PermitStatus::Submitted, "approve")
            .await?;

        let mut tickets = Vec::new();
        for date in permit.dates() {
            tickets.push(DailyTicketEntity {
                daily_ticket_id: DailyTicketId::new(self.ids.next_id("dt", now)),
                permit_id: permit.permit_id.clone(),
                site_id: permit.site_id.clone(),
                date,
                status: DailyTicketStatus::Published,
                access_start: permit.access_start,
                access_end: permit.access_end,
                created_at: now,
                updated_at: now,
            });
        }
        self.permit_repo.create_daily_tickets(tickets.clone()).await?;

        for ticket in &tickets {
            let fanouts: Vec<_> = permit
                .worker_ids
                .iter()
                .map(|worker_id| {
                    DailyTicketWorkerEntity::new(
                        FanoutId::new(self.ids.next_id("fanout", now)),
                        ticket,
                        worker_id.clone(),
                        now,
                    )
                })
                .collect();
            self.permit_repo.create_fanouts(fanouts).await?;

            for worker_id in &permit.worker_ids {
                self.notifications
                    .enqueue(
                        &permit.site_id,
                        worker_id,
                        notification_types::TRAINING_REQUIRED,
                        NotificationPriority::High,
                        serde_json::json!({ "date": ticket.date.to_string() }),
                        Some(ticket.daily_ticket_id.to_string()),
                        None,
                        now,
                    )
                    .await?;
            }
        }

        permit.status = PermitStatus::Approved;
        permit.updated_at = now;
        let permit = self.permit_repo.update_permit(permit).await?;
        info!(
            permit_id = %permit.permit_id,
            site_id = %permit.site_id,
            operation = operations::PERMIT_APPROVE,
            count = tickets.len(),
            "Permit approved, daily tickets generated"
        );
        self.record_transition(ctx, &permit, "PERMIT_APPROVE", None, now).await?;
        Ok(permit)
    }

    /// Reject a submitted permit. Terminal; notifies the submitter.
    pub async fn reject(
        &self,
        ctx: &TenantContext,
        permit_id: &PermitId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<WorkPermitEntity> {
        let reason = reason.into();
        let mut permit = self
            .load_in(ctx, permit_id, PermitStatus::Submitted, "reject")
            .await?;
        permit.status = PermitStatus::Rejected;
        permit.status_reason = Some(reason.clone());
        permit.updated_at = now;
        let permit = self.permit_repo.update_permit(permit).await?;
        info!(
            permit_id = %permit.permit_id,
            operation = operations::PERMIT_REJECT,
            "Permit rejected"
        );
        self.notifications
            .enqueue(
                &permit.site_id,
                &WorkerId::new(permit.created_by.as_str()),
                notification_types::TICKET_CHANGED,
                NotificationPriority::High,
                serde_json::json!({ "status": "REJECTED", "reason": reason }),
                Some(permit.permit_id.to_string()),
                None,
                now,
            )
            .await?;
        self.record_transition(ctx, &permit, "PERMIT_REJECT", Some(reason), now)
            .await?;
        Ok(permit)
    }

    /// Move an approved permit into progress on its first active day.
    pub async fn start(
        &self,
        ctx: &TenantContext,
        permit_id: &PermitId,
        now: DateTime<Utc>,
    ) -> CoreResult<WorkPermitEntity> {
        let mut permit = self
            .load_in(ctx, permit_id, PermitStatus::Approved, "start")
            .await?;
        permit.status = PermitStatus::InProgress;
        permit.updated_at = now;
        let permit = self.permit_repo.update_permit(permit).await?;
        self.record_transition(ctx, &permit, "PERMIT_START", None, now).await?;
        Ok(permit)
    }

    /// Complete a permit once its window has passed and every daily ticket
    /// is settled.
    pub async fn complete(
        &self,
        ctx: &TenantContext,
        permit_id: &PermitId,
        now: DateTime<Utc>,
    ) -> CoreResult<WorkPermitEntity> {
        let mut permit = self
            .load_in(ctx, permit_id, PermitStatus::InProgress, "complete")
            .await?;
        if now.date_naive() <= permit.end_date {
            return Err(CoreError::precondition(
                "permit window has not ended yet",
            ));
        }
        let tickets = self
            .permit_repo
            .list_daily_tickets_for_permit(&SiteFilter::All, permit_id)
            .await?;
        if tickets.iter().any(|t| t.status.is_active()) {
            return Err(CoreError::precondition(
                "all daily tickets must be settled first",
            ));
        }

        permit.status = PermitStatus::Completed;
        permit.updated_at = now;
        let permit = self.permit_repo.update_permit(permit).await?;
        info!(
            permit_id = %permit.permit_id,
            operation = operations::PERMIT_COMPLETE,
            "Permit completed"
        );
        self.record_transition(ctx, &permit, "PERMIT_COMPLETE", None, now).await?;
        Ok(permit)
    }

    /// Terminate a permit from any non-terminal state: cancel active daily
    /// tickets, revoke every outstanding grant, notify affected workers,
    /// and raise a MEDIUM alert.
    pub async fn terminate(
        &self,
        ctx: &TenantContext,
        permit_id: &PermitId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<WorkPermitEntity> {
        let reason = reason.into();
        let mut permit = self
            .permit_repo
            .get_permit_required(&ctx.site_filter(), permit_id)
            .await?;
        ctx.require_site(&permit.site_id)?;
        if permit.status.is_terminal() {
            return Err(CoreError::precondition(format!(
                "cannot terminate a permit in status {}",
                permit.status
            )));
        }

        let tickets = self
            .permit_repo
            .list_daily_tickets_for_permit(&SiteFilter::All, permit_id)
            .await?;
        let mut notified: HashSet<WorkerId> = HashSet::new();
        for mut ticket in tickets {
            if !ticket.status.is_active() {
                continue;
            }
            for worker_id in self.cancel_ticket(&mut ticket, now).await? {
                notified.insert(worker_id);
            }
        }
        let revoked = self
            .access
            .revoke_outstanding_for_permit(permit_id, RevokeReason::PermitTerminated, now)
            .await?;

        for worker_id in notified {
            self.notifications
                .enqueue(
                    &permit.site_id,
                    &worker_id,
                    notification_types::TICKET_TERMINATED,
                    NotificationPriority::High,
                    serde_json::json!({ "reason": reason }),
                    Some(permit.permit_id.to_string()),
                    None,
                    now,
                )
                .await?;
        }

        let old = permit_diff(&permit);
        permit.status = PermitStatus::Terminated;
        permit.status_reason = Some(reason.clone());
        permit.updated_at = now;
        let permit = self.permit_repo.update_permit(permit).await?;
        info!(
            permit_id = %permit.permit_id,
            site_id = %permit.site_id,
            operation = operations::PERMIT_TERMINATE,
            count = revoked,
            "Permit terminated, grants revoked"
        );
        self.audit
            .raise_alert(
                &permit.site_id,
                alert_types::PERMIT_TERMINATED,
                AlertPriority::Medium,
                "Permit terminated",
                format!("permit {} terminated: {}", permit.permit_id, reason),
                "permit_core",
                Some(permit.permit_id.to_string()),
                now,
            )
            .await?;
        self.audit
            .record(
                ctx,
                Some(permit.site_id.clone()),
                AuditInput::success("PERMIT_TERMINATE", "WorkPermit", permit.permit_id.as_str())
                    .with_diff(Some(old), Some(permit_diff(&permit)))
                    .with_reason(reason),
                now,
            )
            .await?;
        Ok(permit)
    }

    /// Terminate a batch of permits, reporting per-id outcomes.
    pub async fn terminate_batch(
        &self,
        ctx: &TenantContext,
        permit_ids: &[PermitId],
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<BatchPermitOutcome>> {
        let reason = reason.into();
        let mut outcomes = Vec::with_capacity(permit_ids.len());
        for permit_id in permit_ids {
            let outcome = match self.terminate(ctx, permit_id, reason.clone(), now).await {
                Ok(_) => BatchPermitOutcome {
                    permit_id: permit_id.clone(),
                    ok: true,
                    error: None,
                },
                Err(err) => BatchPermitOutcome {
                    permit_id: permit_id.clone(),
                    ok: false,
                    error: Some(err.to_string()),
                },
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Complete a batch of permits, reporting per-id outcomes.
    pub async fn complete_batch(
        &self,
        ctx: &TenantContext,
        permit_ids: &[PermitId],
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<BatchPermitOutcome>> {
        let mut outcomes = Vec::with_capacity(permit_ids.len());
        for permit_id in permit_ids {
            let outcome = match self.complete(ctx, permit_id, now).await {
                Ok(_) => BatchPermitOutcome {
                    permit_id: permit_id.clone(),
                    ok: true,
                    error: None,
                },
                Err(err) => BatchPermitOutcome {
                    permit_id: permit_id.clone(),
                    ok: false,
                    error: Some(err.to_string()),
                },
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Day-start transition: published tickets of the date go in progress.
    /// Returns the number of tickets moved.
    pub async fn day_start(&self, date: NaiveDate, now: DateTime<Utc>) -> CoreResult<usize> {
        let tickets = self
            .permit_repo
            .list_daily_tickets_by_date(&SiteFilter::All, date, Some(DailyTicketStatus::Published))
            .await?;
        let count = tickets.len();
        for mut ticket in tickets {
            ticket.status = DailyTicketStatus::InProgress;
            ticket.updated_at = now;
            self.permit_repo.update_daily_ticket(ticket).await?;
        }
        info!(operation = operations::DAY_START, count, "Day-start pass finished");
        Ok(count)
    }

    /// Day-end transition: in-progress tickets of the date expire and
    /// their outstanding grants are revoked with reason EXPIRED. Returns
    /// the number of tickets closed.
    pub async fn day_end(&self, date: NaiveDate, now: DateTime<Utc>) -> CoreResult<usize> {
        let tickets = self
            .permit_repo
            .list_daily_tickets_by_date(&SiteFilter::All, date, Some(DailyTicketStatus::InProgress))
            .await?;
        let count = tickets.len();
        for mut ticket in tickets {
            ticket.status = DailyTicketStatus::Expired;
            ticket.updated_at = now;
            let ticket = self.permit_repo.update_daily_ticket(ticket).await?;
            self.access
                .revoke_for_ticket(&ticket.daily_ticket_id, RevokeReason::Expired, now)
                .await?;
        }
        info!(operation = operations::DAY_END, count, "Day-end pass finished");
        Ok(count)
    }

    /// Disable a worker. Terminal and audited; a disabled worker cannot be
    /// assigned to permits. Idempotent.
    pub async fn disable_worker(
        &self,
        ctx: &TenantContext,
        worker_id: &WorkerId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut worker = self
            .catalog_repo
            .get_worker_required(&ctx.site_filter(), worker_id)
            .await?;
        ctx.require_site(&worker.site_id)?;
        if worker.status == WorkerStatus::Disabled {
            return Ok(());
        }
        let old = serde_json::json!({ "status": worker.status.as_str() });
        worker.status = WorkerStatus::Disabled;
        worker.updated_at = now;
        let worker = self.catalog_repo.update_worker(worker).await?;
        self.audit
            .record(
                ctx,
                Some(worker.site_id.clone()),
                AuditInput::success("WORKER_DISABLE", "Worker", worker.worker_id.as_str())
                    .with_diff(
                        Some(old),
                        Some(serde_json::json!({ "status": worker.status.as_str() })),
                    )
                    .with_reason(reason),
                now,
            )
            .await?;
        Ok(())
    }

    pub async fn get(
        &self,
        ctx: &TenantContext,
        permit_id: &PermitId,
    ) -> CoreResult<WorkPermitEntity> {
        self.permit_repo
            .get_permit_required(&ctx.site_filter(), permit_id)
            .await
    }

    pub async fn list(
        &self,
        ctx: &TenantContext,
        filter: &PermitListFilter,
    ) -> CoreResult<Page<WorkPermitEntity>> {
        self.permit_repo.list_permits(&ctx.site_filter(), filter).await
    }

    /// The permit with its full child graph
    pub async fn aggregate(
        &self,
        ctx: &TenantContext,
        permit_id: &PermitId,
    ) -> CoreResult<PermitAggregate> {
        self.permit_repo
            .load_aggregate(&ctx.site_filter(), permit_id)
            .await
    }

    /// Cancel one daily ticket, marking its fanouts removed. Returns the
    /// workers that held a live fanout on the ticket.
    pub(crate) async fn cancel_ticket(
        &self,
        ticket: &mut DailyTicketEntity,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<WorkerId>> {
        ticket.status = DailyTicketStatus::Cancelled;
        ticket.updated_at = now;
        self.permit_repo.update_daily_ticket(ticket.clone()).await?;

        let fanouts = self
            .permit_repo
            .list_fanouts_for_ticket(&SiteFilter::All, &ticket.daily_ticket_id)
            .await?;
        let mut workers = Vec::new();
        for mut fanout in fanouts {
            if fanout.removed {
                continue;
            }
            workers.push(fanout.worker_id.clone());
            fanout.authorized = false;
            fanout.updated_at = now;
            self.permit_repo.update_fanout(fanout).await?;
        }
        Ok(workers)
    }

    pub(crate) async fn load_in(
        &self,
        ctx: &TenantContext,
        permit_id: &PermitId,
        expected: PermitStatus,
        verb: &str,
    ) -> CoreResult<WorkPermitEntity> {
        let permit = self
            .permit_repo
            .get_permit_required(&ctx.site_filter(), permit_id)
            .await?;
        ctx.require_site(&permit.site_id)?;
        if permit.status != expected {
            return Err(CoreError::precondition(format!(
                "cannot {verb} a permit in status {}",
                permit.status
            )));
        }
        Ok(permit)
    }

    pub(crate) async fn validate_worker(
        &self,
        permit: &WorkPermitEntity,
        worker_id: &WorkerId,
    ) -> CoreResult<()> {
        let worker = self
            .catalog_repo
            .get_worker_required(&SiteFilter::All, worker_id)
            .await?;
        if worker.site_id != permit.site_id {
            return Err(CoreError::validation(
                "worker belongs to a different site",
            ));
        }
        if worker.contractor_id != permit.contractor_id {
            return Err(CoreError::validation(
                "worker belongs to a different contractor",
            ));
        }
        if !worker.is_active() {
            return Err(CoreError::precondition("worker is disabled"));
        }
        Ok(())
    }

    pub(crate) async fn validate_area(
        &self,
        permit: &WorkPermitEntity,
        area_id: &AreaId,
    ) -> CoreResult<()> {
        let area = self
            .catalog_repo
            .get_area_required(&SiteFilter::All, area_id)
            .await?;
        if area.site_id != permit.site_id {
            return Err(CoreError::validation("area belongs to a different site"));
        }
        Ok(())
    }

    async fn record_transition(
        &self,
        ctx: &TenantContext,
        permit: &WorkPermitEntity,
        action: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut input = AuditInput::success(action, "WorkPermit", permit.permit_id.as_str())
            .with_diff(
                None,
                Some(serde_json::json!({ "status": permit.status.as_str() })),
            );
        if let Some(reason) = reason {
            input = input.with_reason(reason);
        }
        self.audit
            .record(ctx, Some(permit.site_id.clone()), input, now)
            .await?;
        Ok(())
    }
}

/// Serialize the mutable surface of a permit for audit diffs.
pub(crate) fn permit_diff(permit: &WorkPermitEntity) -> serde_json::Value {
    serde_json::json!({
        "status": permit.status.as_str(),
        "start_date": permit.start_date.to_string(),
        "end_date": permit.end_date.to_string(),
        "area_ids": permit.area_ids,
        "worker_ids": permit.worker_ids,
    })
}

fn dedup<T: Clone + PartialEq>(items: Vec<T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
