//! Notification queue items and delivery log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use permit_core::{NotificationPriority, NotificationStatus, SiteId, WorkerId};

use super::Record;
use crate::schema::tables;

/// An item waiting in the priority queue.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueuedNotification {
    pub queue_id: String,
    pub site_id: SiteId,
    pub worker_id: WorkerId,
    pub notification_type: String,
    pub priority: NotificationPriority,
    pub payload: serde_json::Value,
    /// Related entity, typically the daily ticket
    pub related_id: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

/// Persisted delivery outcome.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationLogEntity {
    pub log_id: String,
    pub site_id: SiteId,
    pub worker_id: WorkerId,
    pub related_id: Option<String>,
    pub notification_type: String,
    pub priority: NotificationPriority,
    pub status: NotificationStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Record for NotificationLogEntity {
    const TABLE: &'static str = tables::NOTIFICATION_LOG;

    fn record_id(&self) -> &str {
        &self.log_id
    }

    fn site(&self) -> Option<&SiteId> {
        Some(&self.site_id)
    }
}

impl NotificationLogEntity {
    /// Log a delivery outcome for a queue item
    pub fn for_delivery(
        log_id: String,
        item: &QueuedNotification,
        status: NotificationStatus,
        error_message: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            log_id,
            site_id: item.site_id.clone(),
            worker_id: item.worker_id.clone(),
            related_id: item.related_id.clone(),
            notification_type: item.notification_type.clone(),
            priority: item.priority,
            status,
            sent_at: (status == NotificationStatus::Sent).then_some(now),
            read_at: None,
            error_message,
            created_at: now,
        }
    }

    pub fn is_unread(&self) -> bool {
        self.status == NotificationStatus::Sent && self.read_at.is_none()
    }
}
