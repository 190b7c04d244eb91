//! Outbox repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use permit_core::{CoreError, CoreResult};

use crate::outbox::OutboxEntry;

/// Outbox repository trait
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    async fn stage(&self, entry: OutboxEntry) -> CoreResult<OutboxEntry>;

    /// Pending entries in staging order
    async fn list_pending(&self, limit: usize) -> CoreResult<Vec<OutboxEntry>>;

    async fn mark_dispatched(&self, outbox_id: &str, now: DateTime<Utc>) -> CoreResult<()>;
}

/// In-memory outbox.
#[derive(Default)]
pub struct MemoryOutboxRepo {
    state: RwLock<Vec<OutboxEntry>>,
}

impl MemoryOutboxRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutboxRepository for MemoryOutboxRepo {
    async fn stage(&self, entry: OutboxEntry) -> CoreResult<OutboxEntry> {
        self.state.write().await.push(entry.clone());
        Ok(entry)
    }

    async fn list_pending(&self, limit: usize) -> CoreResult<Vec<OutboxEntry>> {
        Ok(self
            .state
            .read()
            .await
            .iter()
            .filter(|e| e.is_pending())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_dispatched(&self, outbox_id: &str, now: DateTime<Utc>) -> CoreResult<()> {
        let mut state = self.state.write().await;
        let entry = state
            .iter_mut()
            .find(|e| e.outbox_id == outbox_id)
            .ok_or_else(|| CoreError::not_found("OutboxEntry", outbox_id))?;
        entry.dispatched_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use permit_core::{GrantId, SiteId};

    use crate::outbox::OutboxPayload;

    #[tokio::test]
    async fn test_dispatch_removes_from_pending() {
        let repo = MemoryOutboxRepo::new();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let entry = OutboxEntry::new(
            "ob1".to_string(),
            SiteId::new("s1"),
            OutboxPayload::RevokeAccess {
                grant_id: GrantId::new("g1"),
                provider_ref: "ref-1".to_string(),
            },
            now,
        );
        repo.stage(entry).await.unwrap();
        assert_eq!(repo.list_pending(10).await.unwrap().len(), 1);

        repo.mark_dispatched("ob1", now).await.unwrap();
        assert!(repo.list_pending(10).await.unwrap().is_empty());
    }
}
