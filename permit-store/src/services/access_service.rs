//! Access grant lifecycle.
//!
//! Grants are the atomic unit of synchronization with the external
//! access-control provider: one row per (worker, area, validity window).
//! Creation happens when training passes; the rows themselves form the
//! durable sync queue drained by the background loop. Revocation of a
//! grant that never reached the provider short-circuits locally; anything
//! with a provider reference stages a revoke intent in the outbox.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use permit_core::logging::operations;
use permit_core::{
    AreaId, CoreResult, GateDenyReason, GrantStatus, PermitId, RevokeReason, SiteFilter,
    TenantContext, WorkerId,
};

use crate::entities::{AccessEventEntity, AccessGrantEntity, DailyTicketWorkerEntity};
use crate::outbox::{OutboxEntry, OutboxPayload};
use crate::repos::{AccessRepository, OutboxRepository, PermitRepository};
use crate::sequence::IdGenerator;

/// Answer of the gate decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "decision")]
pub enum GateDecision {
    Allow,
    Deny { reason: GateDenyReason },
}

/// Outcome of ingesting one vendor event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestOutcome {
    Created,
    Duplicate,
}

/// Counts for a batch ingestion.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub created: usize,
    pub duplicates: usize,
    pub errors: usize,
}

/// Access grant service.
pub struct AccessService {
    access_repo: Arc<dyn AccessRepository>,
    permit_repo: Arc<dyn PermitRepository>,
    outbox_repo: Arc<dyn OutboxRepository>,
    ids: Arc<IdGenerator>,
}

impl AccessService {
    pub fn new(
        access_repo: Arc<dyn AccessRepository>,
        permit_repo: Arc<dyn PermitRepository>,
        outbox_repo: Arc<dyn OutboxRepository>,
        ids: Arc<IdGenerator>,
    ) -> Self {
        Self {
            access_repo,
            permit_repo,
            outbox_repo,
            ids,
        }
    }

    /// Create the grants a passed fanout is entitled to: one per permit
    /// area, valid over the daily ticket's access window. Idempotent; an
    /// existing grant for (fanout, area) is kept as is.
    pub async fn create_grants_for_fanout(
        &self,
        fanout: &DailyTicketWorkerEntity,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<AccessGrantEntity>> {
        let ticket = self
            .permit_repo
            .get_daily_ticket_required(&SiteFilter::All, &fanout.daily_ticket_id)
            .await?;
        let permit = self
            .permit_repo
            .get_permit_required(&SiteFilter::All, &ticket.permit_id)
            .await?;
        let (valid_from, valid_to) = ticket.access_window();

        let mut grants = Vec::with_capacity(permit.area_ids.len());
        for area_id in &permit.area_ids {
            if let Some(existing) = self
                .access_repo
                .find_grant(&SiteFilter::All, &fanout.fanout_id, area_id)
                .await?
            {
                grants.push(existing);
                continue;
            }
            let grant = AccessGrantEntity::new(
                permit_core::GrantId::new(self.ids.next_id("grant", now)),
                fanout.site_id.clone(),
                fanout.worker_id.clone(),
                area_id.clone(),
                fanout.daily_ticket_id.clone(),
                fanout.fanout_id.clone(),
                valid_from,
                valid_to,
                now,
            );
            info!(
                grant_id = %grant.grant_id,
                worker_id = %grant.worker_id,
                site_id = %grant.site_id,
                operation = operations::GRANT_CREATE,
                "Access grant created"
            );
            grants.push(self.access_repo.create_grant(grant).await?);
        }
        Ok(grants)
    }

    /// Revoke one grant. A grant that never reached the provider is closed
    /// locally; one holding a provider reference stages a revoke intent in
    /// the outbox. Already-settled grants are left untouched.
    pub async fn revoke_grant(
        &self,
        grant_id: &permit_core::GrantId,
        reason: RevokeReason,
        now: DateTime<Utc>,
    ) -> CoreResult<AccessGrantEntity> {
        let mut grant = self
            .access_repo
            .get_grant_required(&SiteFilter::All, grant_id)
            .await?;
        if !grant.status.is_outstanding() {
            return Ok(grant);
        }

        if let Some(provider_ref) = grant.provider_ref.clone() {
            let entry = OutboxEntry::new(
                self.ids.next_id("outbox", now),
                grant.site_id.clone(),
                OutboxPayload::RevokeAccess {
                    grant_id: grant.grant_id.clone(),
                    provider_ref,
                },
                now,
            );
            self.outbox_repo.stage(entry).await?;
        }

        grant.revoke(reason, now);
        if reason == RevokeReason::Expired {
            grant.status = GrantStatus::Expired;
        }
        info!(
            grant_id = %grant.grant_id,
            site_id = %grant.site_id,
            operation = operations::GRANT_REVOKE,
            status = %grant.status,
            "Access grant revoked"
        );
        self.access_repo.update_grant(grant).await
    }

    /// Revoke every outstanding grant of one fanout. Returns the count.
    pub async fn revoke_for_fanout(
        &self,
        fanout_id: &permit_core::FanoutId,
        reason: RevokeReason,
        now: DateTime<Utc>,
    ) -> CoreResult<usize> {
        let grants = self
            .access_repo
            .list_grants_for_fanout(&SiteFilter::All, fanout_id)
            .await?;
        self.revoke_all(grants, reason, now).await
    }

    /// Revoke every outstanding grant of one daily ticket.
    pub async fn revoke_for_ticket(
        &self,
        daily_ticket_id: &permit_core::DailyTicketId,
        reason: RevokeReason,
        now: DateTime<Utc>,
    ) -> CoreResult<usize> {
        let grants = self
            .access_repo
            .list_grants_for_ticket(&SiteFilter::All, daily_ticket_id)
            .await?;
        self.revoke_all(grants, reason, now).await
    }

    /// Revoke every outstanding grant under one permit.
    pub async fn revoke_outstanding_for_permit(
        &self,
        permit_id: &PermitId,
        reason: RevokeReason,
        now: DateTime<Utc>,
    ) -> CoreResult<usize> {
        let tickets = self
            .permit_repo
            .list_daily_tickets_for_permit(&SiteFilter::All, permit_id)
            .await?;
        let mut revoked = 0;
        for ticket in tickets {
            revoked += self
                .revoke_for_ticket(&ticket.daily_ticket_id, reason, now)
                .await?;
        }
        Ok(revoked)
    }

    /// Revoke outstanding grants of one fanout that reference the given
    /// area only.
    pub async fn revoke_for_fanout_area(
        &self,
        fanout_id: &permit_core::FanoutId,
        area_id: &AreaId,
        reason: RevokeReason,
        now: DateTime<Utc>,
    ) -> CoreResult<usize> {
        let grants = self
            .access_repo
            .list_grants_for_fanout(&SiteFilter::All, fanout_id)
            .await?;
        let matching = grants
            .into_iter()
            .filter(|g| &g.area_id == area_id)
            .collect();
        self.revoke_all(matching, reason, now).await
    }

    async fn revoke_all(
        &self,
        grants: Vec<AccessGrantEntity>,
        reason: RevokeReason,
        now: DateTime<Utc>,
    ) -> CoreResult<usize> {
        let mut revoked = 0;
        for grant in grants {
            if grant.status.is_outstanding() {
                self.revoke_grant(&grant.grant_id, reason, now).await?;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    /// Decide whether a worker may pass a gate into an area right now.
    pub async fn check_access(
        &self,
        worker_id: &WorkerId,
        area_id: &AreaId,
        now: DateTime<Utc>,
    ) -> CoreResult<GateDecision> {
        let today = now.date_naive();
        let tickets = self
            .permit_repo
            .list_daily_tickets_by_date(&SiteFilter::All, today, None)
            .await?;

        let mut deny = GateDenyReason::NotInTicket;
        for ticket in tickets.iter().filter(|t| t.status.is_active()) {
            let fanout = match self
                .permit_repo
                .find_fanout(&SiteFilter::All, &ticket.daily_ticket_id, worker_id)
                .await?
            {
                Some(f) if !f.removed => f,
                _ => continue,
            };

            if fanout.training_status != permit_core::TrainingStatus::Completed {
                deny = GateDenyReason::TrainingIncomplete;
                continue;
            }
            let permit = self
                .permit_repo
                .get_permit_required(&SiteFilter::All, &ticket.permit_id)
                .await?;
            if !permit.area_ids.contains(area_id) {
                deny = GateDenyReason::AreaNotAllowed;
                continue;
            }
            match self
                .access_repo
                .find_grant(&SiteFilter::All, &fanout.fanout_id, area_id)
                .await?
            {
                Some(grant) if grant.status == GrantStatus::Active => {
                    if grant.window_covers(now) {
                        debug!(
                            worker_id = %worker_id,
                            grant_id = %grant.grant_id,
                            operation = operations::GATE_CHECK,
                            "Gate pass allowed"
                        );
                        return Ok(GateDecision::Allow);
                    }
                    deny = GateDenyReason::OutOfTimeWindow;
                }
                _ => deny = GateDenyReason::SyncPending,
            }
        }
        Ok(GateDecision::Deny { reason: deny })
    }

    /// Ingest one vendor gate event; a repeated vendor event id is reported
    /// as a duplicate and leaves the stream untouched.
    pub async fn ingest_event(&self, event: AccessEventEntity) -> CoreResult<IngestOutcome> {
        if self.access_repo.insert_event(event).await? {
            Ok(IngestOutcome::Created)
        } else {
            Ok(IngestOutcome::Duplicate)
        }
    }

    /// Ingest a batch of vendor events, reporting counts.
    pub async fn ingest_batch(&self, events: Vec<AccessEventEntity>) -> CoreResult<IngestReport> {
        let mut report = IngestReport::default();
        for event in events {
            match self.ingest_event(event).await {
                Ok(IngestOutcome::Created) => report.created += 1,
                Ok(IngestOutcome::Duplicate) => report.duplicates += 1,
                Err(_) => report.errors += 1,
            }
        }
        Ok(report)
    }

    /// Grants of one worker under the caller's scope
    pub async fn grants_for_worker(
        &self,
        ctx: &TenantContext,
        worker_id: &WorkerId,
    ) -> CoreResult<Vec<AccessGrantEntity>> {
        self.access_repo
            .list_grants_for_worker(&ctx.site_filter(), worker_id)
            .await
    }
}
