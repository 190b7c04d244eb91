//! Audit log and alert entities. Both streams are append-only; alerts carry
//! a small acknowledge/resolve lifecycle on top.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use permit_core::{ActorId, AlertId, AlertPriority, AlertStatus, SiteId};

use super::Record;
use crate::schema::tables;

/// One audited operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditLogEntity {
    pub audit_id: String,
    /// Site the operation touched, when resolvable
    pub site_id: Option<SiteId>,
    pub actor_id: Option<ActorId>,
    pub actor_role: Option<String>,
    /// Operation kind, e.g. `PERMIT_CHANGE`, `ACCESS_GRANT_REVOKE`
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub resource_name: Option<String>,
    /// State before the mutation
    pub old_value: Option<serde_json::Value>,
    /// State after the mutation
    pub new_value: Option<serde_json::Value>,
    pub reason: Option<String>,
    pub request_id: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Record for AuditLogEntity {
    const TABLE: &'static str = tables::AUDIT_LOG;

    fn record_id(&self) -> &str {
        &self.audit_id
    }

    fn site(&self) -> Option<&SiteId> {
        self.site_id.as_ref()
    }
}

/// An operator-facing alert produced by detectors and reconciliation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlertEntity {
    pub alert_id: AlertId,
    pub site_id: SiteId,
    pub alert_type: String,
    pub priority: AlertPriority,
    pub status: AlertStatus,
    pub title: String,
    pub message: String,
    /// Emitting component, e.g. `access_sync`, `reconciliation`
    pub source: String,
    pub related_id: Option<String>,
    pub acknowledged_by: Option<ActorId>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<ActorId>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for AlertEntity {
    const TABLE: &'static str = tables::ALERT;

    fn record_id(&self) -> &str {
        self.alert_id.as_str()
    }

    fn site(&self) -> Option<&SiteId> {
        Some(&self.site_id)
    }
}

impl AlertEntity {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        alert_id: AlertId,
        site_id: SiteId,
        alert_type: impl Into<String>,
        priority: AlertPriority,
        title: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<String>,
        related_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            alert_id,
            site_id,
            alert_type: alert_type.into(),
            priority,
            status: AlertStatus::Unacknowledged,
            title: title.into(),
            message: message.into(),
            source: source.into(),
            related_id,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_by: None,
            resolved_at: None,
            resolution_note: None,
            created_at: now,
            updated_at: now,
        }
    }
}
