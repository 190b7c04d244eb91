//! Notification queue and delivery log repository.
//!
//! The queue orders items by a score that folds priority class and enqueue
//! time together, so a drain always sees urgent items first and same-class
//! items oldest first. Dedup reservations are set-if-absent with a TTL.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use permit_core::{notify, CoreError, CoreResult, SiteFilter, WorkerId};

use crate::entities::{NotificationLogEntity, QueuedNotification};
use crate::repos::Page;

/// Queue depth broken down by priority class.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub urgent: usize,
    pub high: usize,
    pub normal: usize,
}

/// Notification repository trait
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Push an item onto the priority queue
    async fn push(&self, item: QueuedNotification) -> CoreResult<()>;

    /// Pop up to `limit` items in score order (urgent first, then oldest)
    async fn pop_batch(&self, limit: usize) -> CoreResult<Vec<QueuedNotification>>;

    async fn queue_len(&self) -> CoreResult<usize>;

    async fn queue_stats(&self) -> CoreResult<QueueStats>;

    /// Reserve a dedup key. Returns `false` when a live reservation already
    /// holds the key; expired reservations are replaced.
    async fn try_reserve_dedup(
        &self,
        key: &str,
        now: DateTime<Utc>,
        ttl_secs: i64,
    ) -> CoreResult<bool>;

    async fn insert_log(&self, entity: NotificationLogEntity) -> CoreResult<NotificationLogEntity>;

    async fn get_log(
        &self,
        filter: &SiteFilter,
        log_id: &str,
    ) -> CoreResult<Option<NotificationLogEntity>>;

    async fn update_log(&self, entity: NotificationLogEntity)
        -> CoreResult<NotificationLogEntity>;

    async fn count_unread(
        &self,
        worker_id: &WorkerId,
        since: Option<DateTime<Utc>>,
    ) -> CoreResult<usize>;

    /// Delivery history of one worker, newest first
    async fn list_logs_for_worker(
        &self,
        filter: &SiteFilter,
        worker_id: &WorkerId,
        page: usize,
        page_size: usize,
    ) -> CoreResult<Page<NotificationLogEntity>>;
}

#[derive(Default)]
struct NotificationState {
    /// Keyed by (score, insertion seq) so equal scores stay FIFO
    queue: BTreeMap<(i64, u64), QueuedNotification>,
    next_seq: u64,
    dedup: HashMap<String, DateTime<Utc>>,
    logs: BTreeMap<String, NotificationLogEntity>,
}

/// In-memory notification repository.
#[derive(Default)]
pub struct MemoryNotificationRepo {
    state: RwLock<NotificationState>,
}

impl MemoryNotificationRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationRepository for MemoryNotificationRepo {
    async fn push(&self, item: QueuedNotification) -> CoreResult<()> {
        let mut state = self.state.write().await;
        let score = notify::score(item.priority, item.enqueued_at);
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.insert((score, seq), item);
        Ok(())
    }

    async fn pop_batch(&self, limit: usize) -> CoreResult<Vec<QueuedNotification>> {
        let mut state = self.state.write().await;
        let keys: Vec<_> = state.queue.keys().take(limit).cloned().collect();
        let mut items = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(item) = state.queue.remove(&key) {
                items.push(item);
            }
        }
        Ok(items)
    }

    async fn queue_len(&self) -> CoreResult<usize> {
        Ok(self.state.read().await.queue.len())
    }

    async fn queue_stats(&self) -> CoreResult<QueueStats> {
        let state = self.state.read().await;
        let mut stats = QueueStats {
            total: state.queue.len(),
            ..Default::default()
        };
        for item in state.queue.values() {
            match item.priority.class() {
                1 => stats.urgent += 1,
                2 => stats.high += 1,
                _ => stats.normal += 1,
            }
        }
        Ok(stats)
    }

    async fn try_reserve_dedup(
        &self,
        key: &str,
        now: DateTime<Utc>,
        ttl_secs: i64,
    ) -> CoreResult<bool> {
        let mut state = self.state.write().await;
        if let Some(expires_at) = state.dedup.get(key) {
            if *expires_at > now {
                return Ok(false);
            }
        }
        state
            .dedup
            .insert(key.to_string(), now + Duration::seconds(ttl_secs));
        Ok(true)
    }

    async fn insert_log(&self, entity: NotificationLogEntity) -> CoreResult<NotificationLogEntity> {
        let mut state = self.state.write().await;
        state.logs.insert(entity.log_id.clone(), entity.clone());
        Ok(entity)
    }

    async fn get_log(
        &self,
        filter: &SiteFilter,
        log_id: &str,
    ) -> CoreResult<Option<NotificationLogEntity>> {
        Ok(self
            .state
            .read()
            .await
            .logs
            .get(log_id)
            .filter(|l| filter.allows(&l.site_id))
            .cloned())
    }

    async fn update_log(
        &self,
        entity: NotificationLogEntity,
    ) -> CoreResult<NotificationLogEntity> {
        let mut state = self.state.write().await;
        if !state.logs.contains_key(&entity.log_id) {
            return Err(CoreError::not_found("NotificationLog", &entity.log_id));
        }
        state.logs.insert(entity.log_id.clone(), entity.clone());
        Ok(entity)
    }

    async fn count_unread(
        &self,
        worker_id: &WorkerId,
        since: Option<DateTime<Utc>>,
    ) -> CoreResult<usize> {
        Ok(self
            .state
            .read()
            .await
            .logs
            .values()
            .filter(|l| {
                &l.worker_id == worker_id
                    && l.is_unread()
                    && since.map_or(true, |cutoff| l.created_at >= cutoff)
            })
            .count())
    }

    async fn list_logs_for_worker(
        &self,
        filter: &SiteFilter,
        worker_id: &WorkerId,
        page: usize,
        page_size: usize,
    ) -> CoreResult<Page<NotificationLogEntity>> {
        let state = self.state.read().await;
        let mut logs: Vec<_> = state
            .logs
            .values()
            .filter(|l| &l.worker_id == worker_id && filter.allows(&l.site_id))
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::slice(logs, page, page_size))
    }
}
