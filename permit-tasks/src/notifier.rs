//! Notification delivery loop.
//!
//! Thin wrapper over the queue drain: pops a batch in priority order and
//! pushes each item through the provider, honoring the delivery window.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use permit_core::logging::operations;
use permit_core::CoreResult;
use permit_store::services::{DrainReport, NotificationService};

/// The delivery loop.
pub struct Notifier {
    notifications: Arc<NotificationService>,
    batch: usize,
}

impl Notifier {
    pub fn new(notifications: Arc<NotificationService>, batch: usize) -> Self {
        Self {
            notifications,
            batch,
        }
    }

    /// Drain one batch off the priority queue.
    pub async fn run_once(&self, now: DateTime<Utc>) -> CoreResult<DrainReport> {
        let report = self.notifications.drain(self.batch, now).await?;
        if report.delivered + report.failed + report.delayed > 0 {
            info!(
                operation = operations::NOTIFY_DRAIN,
                delivered = report.delivered,
                failed = report.failed,
                delayed = report.delayed,
                "Notification drain pass finished"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use permit_core::{
        notification_types, NotificationPriority, PlatformConfig, SiteId, WorkerId,
    };
    use permit_store::repos::MemoryNotificationRepo;
    use permit_store::sequence::IdGenerator;

    use crate::mocks::MockPushProvider;

    #[tokio::test]
    async fn test_run_once_delivers_queued_items() {
        let push = Arc::new(MockPushProvider::new());
        let config = PlatformConfig::default()
            .with_template(notification_types::ACCESS_READY, "tmpl_access_ready");
        let notifications = Arc::new(NotificationService::new(
            Arc::new(MemoryNotificationRepo::new()),
            push.clone(),
            Arc::new(IdGenerator::new()),
            config,
        ));
        let notifier = Notifier::new(notifications.clone(), 10);

        let now = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        notifications
            .enqueue(
                &SiteId::new("s1"),
                &WorkerId::new("w1"),
                notification_types::ACCESS_READY,
                NotificationPriority::Normal,
                serde_json::json!({ "area": "zone A" }),
                None,
                None,
                now,
            )
            .await
            .unwrap();

        let report = notifier.run_once(now).await.unwrap();
        assert_eq!(report.delivered, 1);

        let sent = push.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "tmpl_access_ready");
        assert_eq!(notifications.queue_stats().await.unwrap().total, 0);
    }
}
