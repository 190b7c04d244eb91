//! Audit & alert sink.
//!
//! Two append-only streams: audit entries written alongside mutating
//! operations, and operator-facing alerts with an acknowledge/resolve
//! lifecycle. Alert raising is idempotent per `(site, type, related_id)`
//! while an open alert exists, which keeps reconciliation reruns from
//! duplicating alerts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use permit_core::logging::operations;
use permit_core::{
    ActorId, AlertId, AlertPriority, AlertStatus, CoreResult, SiteId, TenantContext,
};

use crate::entities::{AlertEntity, AuditLogEntity};
use crate::repos::{AlertListFilter, AlertStats, AuditRepository, Page};
use crate::sequence::IdGenerator;

/// Input for one audit record.
#[derive(Clone, Debug, Default)]
pub struct AuditInput {
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub resource_name: Option<String>,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub reason: Option<String>,
    pub request_id: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
}

impl AuditInput {
    pub fn success(
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: Some(resource_id.into()),
            success: true,
            ..Default::default()
        }
    }

    pub fn with_diff(
        mut self,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
    ) -> Self {
        self.old_value = old_value;
        self.new_value = new_value;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Per-id outcome of a batch alert operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchAlertOutcome {
    pub alert_id: AlertId,
    pub ok: bool,
    pub error: Option<String>,
}

/// Audit and alert service.
pub struct AuditService {
    repo: Arc<dyn AuditRepository>,
    ids: Arc<IdGenerator>,
}

impl AuditService {
    pub fn new(repo: Arc<dyn AuditRepository>, ids: Arc<IdGenerator>) -> Self {
        Self { repo, ids }
    }

    /// Append one audit entry under the caller's context.
    pub async fn record(
        &self,
        ctx: &TenantContext,
        site_id: Option<SiteId>,
        input: AuditInput,
        now: DateTime<Utc>,
    ) -> CoreResult<AuditLogEntity> {
        let entity = AuditLogEntity {
            audit_id: self.ids.next_id("audit", now),
            site_id,
            actor_id: Some(ctx.actor_id.clone()),
            actor_role: Some(ctx.role.as_str().to_string()),
            action: input.action,
            resource_type: input.resource_type,
            resource_id: input.resource_id,
            resource_name: input.resource_name,
            old_value: input.old_value,
            new_value: input.new_value,
            reason: input.reason,
            request_id: input.request_id,
            success: input.success,
            error_message: input.error_message,
            created_at: now,
        };
        info!(
            actor_id = %entity.actor_id.as_ref().map(|a| a.as_str()).unwrap_or("-"),
            operation = operations::AUDIT_RECORD,
            action = %entity.action,
            resource_type = %entity.resource_type,
            "Audit entry recorded"
        );
        self.repo.append_audit(entity).await
    }

    /// Audit history of one resource, newest first
    pub async fn history(
        &self,
        ctx: &TenantContext,
        resource_type: &str,
        resource_id: &str,
    ) -> CoreResult<Vec<AuditLogEntity>> {
        self.repo
            .list_audit_for_resource(&ctx.site_filter(), resource_type, resource_id)
            .await
    }

    /// Raise an alert. When an open alert of the same `(site, type,
    /// related_id)` already exists, it is returned unchanged.
    #[allow(clippy::too_many_arguments)]
    pub async fn raise_alert(
        &self,
        site_id: &SiteId,
        alert_type: &str,
        priority: AlertPriority,
        title: impl Into<String>,
        message: impl Into<String>,
        source: &str,
        related_id: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<AlertEntity> {
        if let Some(existing) = self
            .repo
            .find_open_alert(site_id, alert_type, related_id.as_deref())
            .await?
        {
            return Ok(existing);
        }
        let entity = AlertEntity::new(
            AlertId::new(self.ids.next_id("alert", now)),
            site_id.clone(),
            alert_type,
            priority,
            title,
            message,
            source,
            related_id,
            now,
        );
        warn!(
            site_id = %entity.site_id,
            operation = operations::ALERT_RAISE,
            alert_type = %entity.alert_type,
            priority = %entity.priority.as_str(),
            "Alert raised"
        );
        self.repo.create_alert(entity).await
    }

    /// Acknowledge an alert. Re-acknowledging is a no-op returning the
    /// current state; a resolved alert cannot be acknowledged.
    pub async fn acknowledge(
        &self,
        ctx: &TenantContext,
        alert_id: &AlertId,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<AlertEntity> {
        let mut alert = self
            .repo
            .get_alert_required(&ctx.site_filter(), alert_id)
            .await?;
        match alert.status {
            AlertStatus::Acknowledged | AlertStatus::Resolved => Ok(alert),
            AlertStatus::Unacknowledged => {
                alert.status = AlertStatus::Acknowledged;
                alert.acknowledged_by = Some(ctx.actor_id.clone());
                alert.acknowledged_at = Some(now);
                if let Some(note) = note {
                    alert.resolution_note = Some(note);
                }
                alert.updated_at = now;
                self.repo.update_alert(alert).await
            }
        }
    }

    /// Resolve an alert; acknowledges implicitly when still unacknowledged.
    /// Re-resolving is a no-op returning the current state.
    pub async fn resolve(
        &self,
        ctx: &TenantContext,
        alert_id: &AlertId,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<AlertEntity> {
        let mut alert = self
            .repo
            .get_alert_required(&ctx.site_filter(), alert_id)
            .await?;
        if alert.status == AlertStatus::Resolved {
            return Ok(alert);
        }
        if alert.acknowledged_at.is_none() {
            alert.acknowledged_by = Some(ctx.actor_id.clone());
            alert.acknowledged_at = Some(now);
        }
        alert.status = AlertStatus::Resolved;
        alert.resolved_by = Some(ctx.actor_id.clone());
        alert.resolved_at = Some(now);
        if note.is_some() {
            alert.resolution_note = note;
        }
        alert.updated_at = now;
        self.repo.update_alert(alert).await
    }

    /// Acknowledge a batch of alerts, reporting per-id outcomes.
    pub async fn acknowledge_batch(
        &self,
        ctx: &TenantContext,
        alert_ids: &[AlertId],
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<BatchAlertOutcome>> {
        let mut outcomes = Vec::with_capacity(alert_ids.len());
        for alert_id in alert_ids {
            let outcome = match self.acknowledge(ctx, alert_id, None, now).await {
                Ok(_) => BatchAlertOutcome {
                    alert_id: alert_id.clone(),
                    ok: true,
                    error: None,
                },
                Err(err) => BatchAlertOutcome {
                    alert_id: alert_id.clone(),
                    ok: false,
                    error: Some(err.to_string()),
                },
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Resolve a batch of alerts, reporting per-id outcomes.
    pub async fn resolve_batch(
        &self,
        ctx: &TenantContext,
        alert_ids: &[AlertId],
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<BatchAlertOutcome>> {
        let mut outcomes = Vec::with_capacity(alert_ids.len());
        for alert_id in alert_ids {
            let outcome = match self.resolve(ctx, alert_id, note.clone(), now).await {
                Ok(_) => BatchAlertOutcome {
                    alert_id: alert_id.clone(),
                    ok: true,
                    error: None,
                },
                Err(err) => BatchAlertOutcome {
                    alert_id: alert_id.clone(),
                    ok: false,
                    error: Some(err.to_string()),
                },
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    pub async fn list_alerts(
        &self,
        ctx: &TenantContext,
        filter: &AlertListFilter,
    ) -> CoreResult<Page<AlertEntity>> {
        if let Some(site_id) = &filter.site_id {
            ctx.require_site(site_id)?;
        }
        self.repo.list_alerts(&ctx.site_filter(), filter).await
    }

    pub async fn alert_stats(
        &self,
        ctx: &TenantContext,
        site_id: &SiteId,
    ) -> CoreResult<AlertStats> {
        ctx.require_site(site_id)?;
        self.repo.alert_stats(&ctx.site_filter(), site_id).await
    }

    /// Fetch one alert under the caller's scope
    pub async fn get_alert(
        &self,
        ctx: &TenantContext,
        alert_id: &AlertId,
    ) -> CoreResult<AlertEntity> {
        self.repo
            .get_alert_required(&ctx.site_filter(), alert_id)
            .await
    }
}
