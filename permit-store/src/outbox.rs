//! Transactional outbox.
//!
//! Side-effect intents emitted inside a business transaction are staged as
//! outbox rows and dispatched after commit by the background loops. This
//! keeps external calls out of transactions while preserving at-least-once
//! delivery of the intent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use permit_core::{GrantId, NotificationPriority, SiteId, WorkerId};

use crate::entities::Record;
use crate::schema::tables;

/// The staged intent.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxPayload {
    /// Enqueue a notification into the priority queue
    Notification {
        worker_id: WorkerId,
        notification_type: String,
        priority: NotificationPriority,
        payload: serde_json::Value,
        related_id: Option<String>,
        dedup_key: Option<String>,
    },
    /// Revoke a grant at the access-control provider
    RevokeAccess {
        grant_id: GrantId,
        provider_ref: String,
    },
}

/// One staged side effect.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub outbox_id: String,
    pub site_id: SiteId,
    pub payload: OutboxPayload,
    pub staged_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl Record for OutboxEntry {
    const TABLE: &'static str = tables::OUTBOX;

    fn record_id(&self) -> &str {
        &self.outbox_id
    }

    fn site(&self) -> Option<&SiteId> {
        Some(&self.site_id)
    }
}

impl OutboxEntry {
    pub fn new(
        outbox_id: String,
        site_id: SiteId,
        payload: OutboxPayload,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            outbox_id,
            site_id,
            payload,
            staged_at: now,
            dispatched_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.dispatched_at.is_none()
    }
}
