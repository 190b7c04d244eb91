//! Training engine.
//!
//! Drives the per-fanout training session state machine: idempotent start,
//! heartbeat validation through the anti-cheating validator, random
//! identity checks against the face-verification provider, and the sweep
//! that expires abandoned sessions. A passed session chains into the
//! access layer: the fanout's training status becomes COMPLETED, grants are
//! created for every permit area, and the worker is marked authorized.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use permit_core::logging::operations;
use permit_core::providers::FaceVerifier;
use permit_core::training::{
    FailReason, HeartbeatVerdict, PendingCheck, ProgressValidator, RandomCheckPolicy,
    SuspiciousKind,
};
use permit_core::{
    alert_types, notification_types, AlertPriority, CoreError, CoreResult, FanoutId,
    NotificationPriority, PlatformConfig, ProbeId, SessionId, SessionStatus, SessionToken,
    SiteFilter, TenantContext, TrainingStatus,
};

use crate::entities::{DailyTicketWorkerEntity, TrainingSessionEntity};
use crate::repos::{CatalogRepository, PermitRepository, TrainingRepository};
use crate::sequence::IdGenerator;
use crate::services::{AccessService, AuditService, NotificationService};

/// Result of one heartbeat.
#[derive(Clone, Debug)]
pub struct HeartbeatOutcome {
    pub status: SessionStatus,
    pub credited_secs: i64,
    pub suspicious: Option<SuspiciousKind>,
    /// Probe the worker must answer, when one was just issued
    pub probe: Option<PendingCheck>,
    /// Watched coverage after this heartbeat
    pub coverage: f64,
}

/// Training session service.
pub struct TrainingService {
    training_repo: Arc<dyn TrainingRepository>,
    permit_repo: Arc<dyn PermitRepository>,
    catalog_repo: Arc<dyn CatalogRepository>,
    access: Arc<AccessService>,
    audit: Arc<AuditService>,
    notifications: Arc<NotificationService>,
    face: Arc<dyn FaceVerifier>,
    validator: ProgressValidator,
    checks: RandomCheckPolicy,
    ids: Arc<IdGenerator>,
}

impl TrainingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        training_repo: Arc<dyn TrainingRepository>,
        permit_repo: Arc<dyn PermitRepository>,
        catalog_repo: Arc<dyn CatalogRepository>,
        access: Arc<AccessService>,
        audit: Arc<AuditService>,
        notifications: Arc<NotificationService>,
        face: Arc<dyn FaceVerifier>,
        config: &PlatformConfig,
        ids: Arc<IdGenerator>,
    ) -> Self {
        Self {
            training_repo,
            permit_repo,
            catalog_repo,
            access,
            audit,
            notifications,
            face,
            validator: ProgressValidator::from_config(config),
            checks: RandomCheckPolicy::from_config(config),
            ids,
        }
    }

    /// Open (or resume) the training session of a fanout. Idempotent: an
    /// existing in-progress session is returned; a terminal session is a
    /// precondition failure carrying the terminal state.
    pub async fn start(
        &self,
        ctx: &TenantContext,
        fanout_id: &FanoutId,
        media_len_secs: i64,
        now: DateTime<Utc>,
    ) -> CoreResult<TrainingSessionEntity> {
        if media_len_secs <= 0 {
            return Err(CoreError::validation("media length must be positive"));
        }
        let mut fanout = self
            .permit_repo
            .get_fanout_required(&ctx.site_filter(), fanout_id)
            .await?;
        ctx.require_site(&fanout.site_id)?;
        if fanout.removed {
            return Err(CoreError::precondition(
                "worker was removed from the permit for this day",
            ));
        }
        let ticket = self
            .permit_repo
            .get_daily_ticket_required(&SiteFilter::All, &fanout.daily_ticket_id)
            .await?;
        if !ticket.status.is_active() {
            return Err(CoreError::precondition(format!(
                "daily ticket is {}, training is closed",
                ticket.status
            )));
        }

        if let Some(existing) = self
            .training_repo
            .get_for_fanout(&SiteFilter::All, fanout_id)
            .await?
        {
            if existing.status == SessionStatus::InProgress {
                return Ok(existing);
            }
            return Err(CoreError::precondition(format!(
                "training already ended with status {}",
                existing.status
            )));
        }

        let mut session = TrainingSessionEntity::new(
            SessionId::new(self.ids.next_id("sess", now)),
            fanout.fanout_id.clone(),
            fanout.daily_ticket_id.clone(),
            fanout.site_id.clone(),
            fanout.worker_id.clone(),
            media_len_secs,
            now,
        );
        let mut rng = rand::thread_rng();
        self.checks.start(&mut session.checks, now, &mut rng);
        let session = self.training_repo.create_session(session).await?;

        fanout.training_status = TrainingStatus::InLearning;
        fanout.updated_at = now;
        self.permit_repo.update_fanout(fanout).await?;

        info!(
            session_id = %session.session_id,
            worker_id = %session.worker_id,
            site_id = %session.site_id,
            operation = operations::TRAINING_START,
            "Training session opened"
        );
        Ok(session)
    }

    /// Apply one player heartbeat. The opaque token authenticates and
    /// serializes all mutations of the session.
    pub async fn heartbeat(
        &self,
        token: &SessionToken,
        position: i64,
        now: DateTime<Utc>,
    ) -> CoreResult<HeartbeatOutcome> {
        let mut session = self.training_repo.get_by_token_required(token).await?;
        if session.status.is_terminal() {
            return Err(CoreError::precondition(format!(
                "session already {}",
                session.status
            )));
        }
        let mut rng = rand::thread_rng();

        // An unanswered probe past its deadline counts as a missed check.
        if self.checks.pending_timed_out(&session.checks, now) {
            if let Some(outcome) = self
                .apply_check_miss(&mut session, SuspiciousKind::CheckTimeout, now, &mut rng)
                .await?
            {
                return Ok(outcome);
            }
        }

        let media_len = session.media_len_secs;
        let verdict = self
            .validator
            .apply(&mut session.progress, position, now, media_len);

        match verdict {
            HeartbeatVerdict::Expired => {
                session.finish(SessionStatus::Expired, None, now);
                let session = self.training_repo.update_session(session).await?;
                Ok(self.outcome(&session, 0, None, None))
            }
            HeartbeatVerdict::Failed(reason) => {
                let session = self.fail_session(session, reason.as_str(), now).await?;
                Ok(self.outcome(&session, 0, None, None))
            }
            HeartbeatVerdict::Accepted {
                credited_secs,
                suspicious,
            } => {
                let probe = self
                    .checks
                    .maybe_issue(&mut session.checks, now, &mut rng)
                    .and_then(|_| session.checks.pending.clone());

                if session.checks.pending.is_none()
                    && self.validator.is_complete(&session.progress, media_len)
                {
                    let session = self.pass_session(session, now).await?;
                    return Ok(self.outcome(&session, credited_secs, suspicious, None));
                }

                session.updated_at = now;
                let session = self.training_repo.update_session(session).await?;
                Ok(self.outcome(&session, credited_secs, suspicious, probe))
            }
        }
    }

    /// Answer a pending random identity check with a face sample.
    pub async fn answer_check(
        &self,
        token: &SessionToken,
        probe_id: &ProbeId,
        sample: &[u8],
        now: DateTime<Utc>,
    ) -> CoreResult<HeartbeatOutcome> {
        let mut session = self.training_repo.get_by_token_required(token).await?;
        if session.status.is_terminal() {
            return Err(CoreError::precondition(format!(
                "session already {}",
                session.status
            )));
        }
        let pending = session
            .checks
            .pending
            .clone()
            .ok_or_else(|| CoreError::precondition("no identity check is pending"))?;
        if &pending.probe_id != probe_id {
            return Err(CoreError::validation("unknown probe id"));
        }

        let worker = self
            .catalog_repo
            .get_worker_required(&SiteFilter::All, &session.worker_id)
            .await?;
        let reference = worker.face_reference.as_deref().ok_or_else(|| {
            CoreError::precondition("worker has no enrolled face reference")
        })?;
        let verdict = self.face.verify(sample, reference).await?;

        let mut rng = rand::thread_rng();
        if verdict.passed {
            self.checks
                .record_pass(&mut session.checks, now, &mut rng);
            info!(
                session_id = %session.session_id,
                operation = operations::TRAINING_CHECK,
                "Identity check passed"
            );
            if self
                .validator
                .is_complete(&session.progress, session.media_len_secs)
            {
                let session = self.pass_session(session, now).await?;
                return Ok(self.outcome(&session, 0, None, None));
            }
            session.updated_at = now;
            let session = self.training_repo.update_session(session).await?;
            Ok(self.outcome(&session, 0, None, None))
        } else {
            match self
                .apply_check_miss(&mut session, SuspiciousKind::CheckFailed, now, &mut rng)
                .await?
            {
                Some(outcome) => Ok(outcome),
                None => {
                    session.updated_at = now;
                    let session = self.training_repo.update_session(session).await?;
                    Ok(self.outcome(&session, 0, Some(SuspiciousKind::CheckFailed), None))
                }
            }
        }
    }

    /// Background pass closing sessions whose heartbeat lapsed and
    /// resolving probes that ran past their deadline. Returns the number of
    /// sessions closed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> CoreResult<usize> {
        let open = self.training_repo.list_open_sessions().await?;
        let mut rng = <rand::rngs::StdRng as rand::SeedableRng>::from_entropy();
        let mut closed = 0;
        for mut session in open {
            if self.validator.heartbeat_expired(&session.progress, now) {
                session.finish(SessionStatus::Expired, None, now);
                self.training_repo.update_session(session).await?;
                closed += 1;
            } else if self.checks.pending_timed_out(&session.checks, now) {
                if self
                    .apply_check_miss(&mut session, SuspiciousKind::CheckTimeout, now, &mut rng)
                    .await?
                    .is_some()
                {
                    closed += 1;
                } else {
                    session.updated_at = now;
                    self.training_repo.update_session(session).await?;
                }
            }
        }
        info!(
            operation = operations::TRAINING_SWEEP,
            count = closed,
            "Training sweep finished"
        );
        Ok(closed)
    }

    /// Count a failed or missed identity check against the session. Returns
    /// the terminal outcome when the session fails as a result.
    async fn apply_check_miss(
        &self,
        session: &mut TrainingSessionEntity,
        kind: SuspiciousKind,
        now: DateTime<Utc>,
        rng: &mut impl rand::Rng,
    ) -> CoreResult<Option<HeartbeatOutcome>> {
        let suspicion_tripped = self
            .validator
            .record_suspicious(&mut session.progress, kind);
        let run_tripped = self.checks.record_failure(&mut session.checks, now, rng);

        let reason = if run_tripped {
            Some(FailReason::ConsecutiveCheckFailures)
        } else {
            suspicion_tripped
        };
        if let Some(reason) = reason {
            let failed = self
                .fail_session(session.clone(), reason.as_str(), now)
                .await?;
            return Ok(Some(self.outcome(&failed, 0, Some(kind), None)));
        }
        Ok(None)
    }

    async fn pass_session(
        &self,
        mut session: TrainingSessionEntity,
        now: DateTime<Utc>,
    ) -> CoreResult<TrainingSessionEntity> {
        session.finish(SessionStatus::Passed, None, now);
        let session = self.training_repo.update_session(session).await?;

        let mut fanout = self
            .permit_repo
            .get_fanout_required(&SiteFilter::All, &session.fanout_id)
            .await?;
        fanout.training_status = TrainingStatus::Completed;
        fanout.authorized = true;
        fanout.updated_at = now;
        let fanout = self.permit_repo.update_fanout(fanout).await?;

        let grants = self.access.create_grants_for_fanout(&fanout, now).await?;
        info!(
            session_id = %session.session_id,
            worker_id = %session.worker_id,
            count = grants.len(),
            "Training passed, grants created"
        );
        Ok(session)
    }

    async fn fail_session(
        &self,
        mut session: TrainingSessionEntity,
        reason: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<TrainingSessionEntity> {
        session.finish(SessionStatus::Failed, Some(reason.to_string()), now);
        let session = self.training_repo.update_session(session).await?;

        let mut fanout = self
            .permit_repo
            .get_fanout_required(&SiteFilter::All, &session.fanout_id)
            .await?;
        fanout.training_status = TrainingStatus::Failed;
        fanout.training_fail_reason = Some(reason.to_string());
        fanout.updated_at = now;
        self.permit_repo.update_fanout(fanout).await?;

        warn!(
            session_id = %session.session_id,
            worker_id = %session.worker_id,
            error = reason,
            "Training session failed"
        );
        self.audit
            .raise_alert(
                &session.site_id,
                alert_types::TRAINING_FAILED,
                AlertPriority::Medium,
                "Training session failed",
                format!("worker {} failed training: {}", session.worker_id, reason),
                "training",
                Some(session.session_id.to_string()),
                now,
            )
            .await?;
        self.notifications
            .enqueue(
                &session.site_id,
                &session.worker_id,
                notification_types::TRAINING_FAILED,
                NotificationPriority::High,
                serde_json::json!({ "reason": reason }),
                Some(session.daily_ticket_id.to_string()),
                None,
                now,
            )
            .await?;
        Ok(session)
    }

    fn outcome(
        &self,
        session: &TrainingSessionEntity,
        credited_secs: i64,
        suspicious: Option<SuspiciousKind>,
        probe: Option<PendingCheck>,
    ) -> HeartbeatOutcome {
        HeartbeatOutcome {
            status: session.status,
            credited_secs,
            suspicious,
            probe,
            coverage: self
                .validator
                .coverage(&session.progress, session.media_len_secs),
        }
    }

    /// Session of one fanout under the caller's scope, if any
    pub async fn session_for_fanout(
        &self,
        ctx: &TenantContext,
        fanout_id: &FanoutId,
    ) -> CoreResult<Option<TrainingSessionEntity>> {
        self.training_repo
            .get_for_fanout(&ctx.site_filter(), fanout_id)
            .await
    }
}
