//! Notification pipeline.
//!
//! Enqueue goes through a dedup reservation, then onto the score-ordered
//! queue. Drain pops in score order and delivers through the push provider,
//! honoring quiet hours: outside the allowed window only urgent items go
//! out, everything else is re-enqueued without dedup and counted as
//! delayed. Every delivery attempt lands in the persistent log.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use permit_core::logging::operations;
use permit_core::providers::PushProvider;
use permit_core::{
    notify, CoreResult, NotificationPriority, NotificationStatus, PlatformConfig, SiteId,
    TenantContext, WorkerId,
};

use crate::entities::{NotificationLogEntity, QueuedNotification};
use crate::repos::{NotificationRepository, Page, QueueStats};
use crate::sequence::IdGenerator;

/// Outcome of an enqueue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnqueueOutcome {
    Enqueued,
    Deduped,
}

/// Outcome of one drain pass.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DrainReport {
    pub delivered: usize,
    pub failed: usize,
    pub delayed: usize,
}

/// Notification service.
pub struct NotificationService {
    repo: Arc<dyn NotificationRepository>,
    push: Arc<dyn PushProvider>,
    ids: Arc<IdGenerator>,
    config: PlatformConfig,
}

impl NotificationService {
    pub fn new(
        repo: Arc<dyn NotificationRepository>,
        push: Arc<dyn PushProvider>,
        ids: Arc<IdGenerator>,
        config: PlatformConfig,
    ) -> Self {
        Self {
            repo,
            push,
            ids,
            config,
        }
    }

    /// Enqueue a notification. The dedup key defaults to
    /// `(worker, type, related_id, calendar day)`; while a reservation for
    /// the key is live, the enqueue is reported as deduped and the queue is
    /// untouched.
    #[allow(clippy::too_many_arguments)]
    pub async fn enqueue(
        &self,
        site_id: &SiteId,
        worker_id: &WorkerId,
        notification_type: &str,
        priority: NotificationPriority,
        payload: serde_json::Value,
        related_id: Option<String>,
        dedup_key: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<EnqueueOutcome> {
        let key = dedup_key.unwrap_or_else(|| {
            notify::default_dedup_key(
                worker_id,
                notification_type,
                related_id.as_deref(),
                now.date_naive(),
            )
        });
        let reserved = self
            .repo
            .try_reserve_dedup(&key, now, self.config.notif_dedup_ttl_secs)
            .await?;
        if !reserved {
            debug!(
                worker_id = %worker_id,
                notification_type,
                operation = operations::NOTIFY_ENQUEUE,
                "Enqueue deduped"
            );
            return Ok(EnqueueOutcome::Deduped);
        }
        self.push_item(site_id, worker_id, notification_type, priority, payload, related_id, now)
            .await?;
        Ok(EnqueueOutcome::Enqueued)
    }

    /// Enqueue bypassing dedup entirely; used when quiet hours push an item
    /// back so it can resurface later.
    #[allow(clippy::too_many_arguments)]
    pub async fn enqueue_without_dedup(
        &self,
        site_id: &SiteId,
        worker_id: &WorkerId,
        notification_type: &str,
        priority: NotificationPriority,
        payload: serde_json::Value,
        related_id: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.push_item(site_id, worker_id, notification_type, priority, payload, related_id, now)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn push_item(
        &self,
        site_id: &SiteId,
        worker_id: &WorkerId,
        notification_type: &str,
        priority: NotificationPriority,
        payload: serde_json::Value,
        related_id: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let item = QueuedNotification {
            queue_id: self.ids.next_id("notif", now),
            site_id: site_id.clone(),
            worker_id: worker_id.clone(),
            notification_type: notification_type.to_string(),
            priority,
            payload,
            related_id,
            enqueued_at: now,
        };
        self.repo.push(item).await
    }

    /// Pop up to `batch_n` items and attempt delivery.
    pub async fn drain(&self, batch_n: usize, now: DateTime<Utc>) -> CoreResult<DrainReport> {
        let in_window = notify::in_allowed_hours(
            now,
            self.config.notif_allowed_hours_start,
            self.config.notif_allowed_hours_end,
        );
        let batch = self.repo.pop_batch(batch_n).await?;
        let mut report = DrainReport::default();

        for item in batch {
            if !in_window && !item.priority.bypasses_quiet_hours() {
                // Push back without dedup so the item resurfaces once the
                // window opens.
                self.enqueue_without_dedup(
                    &item.site_id,
                    &item.worker_id,
                    &item.notification_type,
                    item.priority,
                    item.payload.clone(),
                    item.related_id.clone(),
                    now,
                )
                .await?;
                report.delayed += 1;
                continue;
            }
            match self.deliver(&item, now).await {
                Ok(()) => report.delivered += 1,
                Err(_) => report.failed += 1,
            }
        }

        info!(
            operation = operations::NOTIFY_DRAIN,
            delivered = report.delivered,
            failed = report.failed,
            delayed = report.delayed,
            "Drain pass finished"
        );
        Ok(report)
    }

    async fn deliver(&self, item: &QueuedNotification, now: DateTime<Utc>) -> CoreResult<()> {
        let result = match self.config.template_for(&item.notification_type) {
            Some(template_id) => self
                .push
                .send(&item.worker_id, template_id, &item.payload)
                .await,
            None => Err(permit_core::CoreError::ExternalPermanent(format!(
                "no template configured for {}",
                item.notification_type
            ))),
        };

        let (status, error_message) = match &result {
            Ok(()) => (NotificationStatus::Sent, None),
            Err(err) => {
                warn!(
                    worker_id = %item.worker_id,
                    notification_type = %item.notification_type,
                    error = %err,
                    "Notification delivery failed"
                );
                (NotificationStatus::Failed, Some(err.to_string()))
            }
        };
        let log = NotificationLogEntity::for_delivery(
            self.ids.next_id("nlog", now),
            item,
            status,
            error_message,
            now,
        );
        self.repo.insert_log(log).await?;
        result
    }

    /// Unread counter over the last seven days for one worker
    pub async fn unread_count(
        &self,
        worker_id: &WorkerId,
        now: DateTime<Utc>,
    ) -> CoreResult<usize> {
        self.repo
            .count_unread(worker_id, Some(now - Duration::days(7)))
            .await
    }

    /// Mark the given log entries read; with `log_ids = None`, mark every
    /// unread entry of the worker. Returns the number of rows touched.
    pub async fn mark_read(
        &self,
        ctx: &TenantContext,
        worker_id: &WorkerId,
        log_ids: Option<&[String]>,
        now: DateTime<Utc>,
    ) -> CoreResult<usize> {
        let filter = ctx.site_filter();
        let page = self
            .repo
            .list_logs_for_worker(&filter, worker_id, 1, usize::MAX)
            .await?;
        let mut touched = 0;
        for mut log in page.items {
            if !log.is_unread() {
                continue;
            }
            if let Some(ids) = log_ids {
                if !ids.iter().any(|id| id == &log.log_id) {
                    continue;
                }
            }
            log.read_at = Some(now);
            self.repo.update_log(log).await?;
            touched += 1;
        }
        Ok(touched)
    }

    /// Delivery history of one worker, newest first
    pub async fn history(
        &self,
        ctx: &TenantContext,
        worker_id: &WorkerId,
        page: usize,
        page_size: usize,
    ) -> CoreResult<Page<NotificationLogEntity>> {
        self.repo
            .list_logs_for_worker(&ctx.site_filter(), worker_id, page, page_size)
            .await
    }

    pub async fn queue_stats(&self) -> CoreResult<QueueStats> {
        self.repo.queue_stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use permit_core::{notification_types, ActorId, CoreError};
    use tokio::sync::Mutex;

    use crate::repos::MemoryNotificationRepo;

    /// Push provider that records sends and can be scripted to fail.
    struct RecordingPush {
        sent: Mutex<Vec<(WorkerId, String)>>,
        fail: bool,
    }

    impl RecordingPush {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl PushProvider for RecordingPush {
        async fn send(
            &self,
            worker_id: &WorkerId,
            template_id: &str,
            _payload: &serde_json::Value,
        ) -> CoreResult<()> {
            if self.fail {
                return Err(CoreError::ExternalTransient("provider down".into()));
            }
            self.sent
                .lock()
                .await
                .push((worker_id.clone(), template_id.to_string()));
            Ok(())
        }
    }

    fn config() -> PlatformConfig {
        PlatformConfig::default()
            .with_template(notification_types::TRAINING_REQUIRED, "tmpl_training")
            .with_template(notification_types::ACCESS_READY, "tmpl_access")
    }

    fn service_with(push: Arc<RecordingPush>) -> NotificationService {
        NotificationService::new(
            Arc::new(MemoryNotificationRepo::new()),
            push,
            Arc::new(IdGenerator::new()),
            config(),
        )
    }

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, min, 0).unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_dedup_within_ttl() {
        let svc = service_with(Arc::new(RecordingPush::new()));
        let site = SiteId::new("s1");
        let worker = WorkerId::new("w1");

        let first = svc
            .enqueue(
                &site,
                &worker,
                notification_types::TRAINING_REQUIRED,
                NotificationPriority::High,
                serde_json::json!({"date": "2026-03-01"}),
                Some("dt1".to_string()),
                None,
                at(9, 0),
            )
            .await
            .unwrap();
        assert_eq!(first, EnqueueOutcome::Enqueued);

        let second = svc
            .enqueue(
                &site,
                &worker,
                notification_types::TRAINING_REQUIRED,
                NotificationPriority::High,
                serde_json::json!({"date": "2026-03-01"}),
                Some("dt1".to_string()),
                None,
                at(9, 30),
            )
            .await
            .unwrap();
        assert_eq!(second, EnqueueOutcome::Deduped);
        assert_eq!(svc.queue_stats().await.unwrap().total, 1);

        // past the TTL (1 h) the key is free again
        let third = svc
            .enqueue(
                &site,
                &worker,
                notification_types::TRAINING_REQUIRED,
                NotificationPriority::High,
                serde_json::json!({"date": "2026-03-01"}),
                Some("dt1".to_string()),
                None,
                at(10, 1),
            )
            .await
            .unwrap();
        assert_eq!(third, EnqueueOutcome::Enqueued);
    }

    #[tokio::test]
    async fn test_quiet_hours_delays_non_urgent() {
        let push = Arc::new(RecordingPush::new());
        let svc = service_with(push.clone());
        let site = SiteId::new("s1");

        for (worker, priority) in [
            ("w1", NotificationPriority::Urgent),
            ("w2", NotificationPriority::High),
            ("w3", NotificationPriority::Normal),
        ] {
            svc.enqueue(
                &site,
                &WorkerId::new(worker),
                notification_types::ACCESS_READY,
                priority,
                serde_json::json!({}),
                None,
                None,
                at(21, 0),
            )
            .await
            .unwrap();
        }

        // 22:30 is outside the 07–21 window
        let report = svc.drain(10, at(22, 30)).await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.delayed, 2);
        assert_eq!(push.sent.lock().await.len(), 1);

        // delayed items are back in the queue and go out inside the window
        assert_eq!(svc.queue_stats().await.unwrap().total, 2);
        let morning = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let report = svc.drain(10, morning).await.unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(report.delayed, 0);
    }

    #[tokio::test]
    async fn test_delivery_failure_logged() {
        let push = Arc::new(RecordingPush {
            sent: Mutex::new(Vec::new()),
            fail: true,
        });
        let svc = service_with(push);
        let worker = WorkerId::new("w1");
        svc.enqueue(
            &SiteId::new("s1"),
            &worker,
            notification_types::ACCESS_READY,
            NotificationPriority::Normal,
            serde_json::json!({}),
            None,
            None,
            at(9, 0),
        )
        .await
        .unwrap();

        let report = svc.drain(10, at(9, 5)).await.unwrap();
        assert_eq!(report.failed, 1);

        let ctx = TenantContext::global_admin(ActorId::new("admin"));
        let history = svc.history(&ctx, &worker, 1, 10).await.unwrap();
        assert_eq!(history.items.len(), 1);
        assert_eq!(history.items[0].status, NotificationStatus::Failed);
        assert_eq!(svc.unread_count(&worker, at(10, 0)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unread_counter_and_mark_read() {
        let svc = service_with(Arc::new(RecordingPush::new()));
        let worker = WorkerId::new("w1");
        svc.enqueue(
            &SiteId::new("s1"),
            &worker,
            notification_types::ACCESS_READY,
            NotificationPriority::Normal,
            serde_json::json!({}),
            None,
            None,
            at(9, 0),
        )
        .await
        .unwrap();
        svc.drain(10, at(9, 5)).await.unwrap();
        assert_eq!(svc.unread_count(&worker, at(10, 0)).await.unwrap(), 1);

        let ctx = TenantContext::global_admin(ActorId::new("admin"));
        let touched = svc.mark_read(&ctx, &worker, None, at(10, 0)).await.unwrap();
        assert_eq!(touched, 1);
        assert_eq!(svc.unread_count(&worker, at(10, 1)).await.unwrap(), 0);
    }
}
