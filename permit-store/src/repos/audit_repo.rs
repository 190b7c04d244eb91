//! Audit log and alert repository.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use permit_core::{AlertId, AlertPriority, AlertStatus, CoreError, CoreResult, SiteFilter, SiteId};

use crate::entities::{AlertEntity, AuditLogEntity};
use crate::repos::Page;

/// Alert list filter; all fields are conjunctive.
#[derive(Clone, Debug, Default)]
pub struct AlertListFilter {
    pub site_id: Option<SiteId>,
    pub status: Option<AlertStatus>,
    pub priority: Option<AlertPriority>,
    pub alert_type: Option<String>,
    pub page: usize,
    pub page_size: usize,
}

/// Alert counts grouped by status and priority.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AlertStats {
    pub total: usize,
    pub unacknowledged: usize,
    pub acknowledged: usize,
    pub resolved: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// Audit and alert repository trait
#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append_audit(&self, entity: AuditLogEntity) -> CoreResult<AuditLogEntity>;

    /// Audit entries of a resource, newest first
    async fn list_audit_for_resource(
        &self,
        filter: &SiteFilter,
        resource_type: &str,
        resource_id: &str,
    ) -> CoreResult<Vec<AuditLogEntity>>;

    async fn create_alert(&self, entity: AlertEntity) -> CoreResult<AlertEntity>;

    async fn get_alert(
        &self,
        filter: &SiteFilter,
        alert_id: &AlertId,
    ) -> CoreResult<Option<AlertEntity>>;

    async fn get_alert_required(
        &self,
        filter: &SiteFilter,
        alert_id: &AlertId,
    ) -> CoreResult<AlertEntity> {
        self.get_alert(filter, alert_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Alert", alert_id.as_str()))
    }

    async fn update_alert(&self, entity: AlertEntity) -> CoreResult<AlertEntity>;

    /// Open alert with the same type and related id, for idempotent raising
    async fn find_open_alert(
        &self,
        site_id: &SiteId,
        alert_type: &str,
        related_id: Option<&str>,
    ) -> CoreResult<Option<AlertEntity>>;

    async fn list_alerts(
        &self,
        filter: &SiteFilter,
        list: &AlertListFilter,
    ) -> CoreResult<Page<AlertEntity>>;

    async fn alert_stats(&self, filter: &SiteFilter, site_id: &SiteId) -> CoreResult<AlertStats>;
}

#[derive(Default)]
struct AuditState {
    audits: Vec<AuditLogEntity>,
    alerts: BTreeMap<AlertId, AlertEntity>,
}

/// In-memory audit repository.
#[derive(Default)]
pub struct MemoryAuditRepo {
    state: RwLock<AuditState>,
}

impl MemoryAuditRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditRepository for MemoryAuditRepo {
    async fn append_audit(&self, entity: AuditLogEntity) -> CoreResult<AuditLogEntity> {
        self.state.write().await.audits.push(entity.clone());
        Ok(entity)
    }

    async fn list_audit_for_resource(
        &self,
        filter: &SiteFilter,
        resource_type: &str,
        resource_id: &str,
    ) -> CoreResult<Vec<AuditLogEntity>> {
        let state = self.state.read().await;
        let mut entries: Vec<_> = state
            .audits
            .iter()
            .filter(|a| {
                a.resource_type == resource_type
                    && a.resource_id.as_deref() == Some(resource_id)
                    && a.site_id.as_ref().map_or(true, |s| filter.allows(s))
            })
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn create_alert(&self, entity: AlertEntity) -> CoreResult<AlertEntity> {
        let mut state = self.state.write().await;
        if state.alerts.contains_key(&entity.alert_id) {
            return Err(CoreError::conflict(format!(
                "alert {} already exists",
                entity.alert_id
            )));
        }
        state.alerts.insert(entity.alert_id.clone(), entity.clone());
        Ok(entity)
    }

    async fn get_alert(
        &self,
        filter: &SiteFilter,
        alert_id: &AlertId,
    ) -> CoreResult<Option<AlertEntity>> {
        Ok(self
            .state
            .read()
            .await
            .alerts
            .get(alert_id)
            .filter(|a| filter.allows(&a.site_id))
            .cloned())
    }

    async fn update_alert(&self, entity: AlertEntity) -> CoreResult<AlertEntity> {
        let mut state = self.state.write().await;
        if !state.alerts.contains_key(&entity.alert_id) {
            return Err(CoreError::not_found("Alert", entity.alert_id.as_str()));
        }
        state.alerts.insert(entity.alert_id.clone(), entity.clone());
        Ok(entity)
    }

    async fn find_open_alert(
        &self,
        site_id: &SiteId,
        alert_type: &str,
        related_id: Option<&str>,
    ) -> CoreResult<Option<AlertEntity>> {
        Ok(self
            .state
            .read()
            .await
            .alerts
            .values()
            .find(|a| {
                &a.site_id == site_id
                    && a.alert_type == alert_type
                    && a.related_id.as_deref() == related_id
                    && a.status != AlertStatus::Resolved
            })
            .cloned())
    }

    async fn list_alerts(
        &self,
        filter: &SiteFilter,
        list: &AlertListFilter,
    ) -> CoreResult<Page<AlertEntity>> {
        let state = self.state.read().await;
        let mut alerts: Vec<_> = state
            .alerts
            .values()
            .filter(|a| filter.allows(&a.site_id))
            .filter(|a| list.site_id.as_ref().map_or(true, |s| &a.site_id == s))
            .filter(|a| list.status.map_or(true, |s| a.status == s))
            .filter(|a| list.priority.map_or(true, |p| a.priority == p))
            .filter(|a| {
                list.alert_type
                    .as_deref()
                    .map_or(true, |t| a.alert_type == t)
            })
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::slice(alerts, list.page, list.page_size))
    }

    async fn alert_stats(&self, filter: &SiteFilter, site_id: &SiteId) -> CoreResult<AlertStats> {
        let state = self.state.read().await;
        let mut stats = AlertStats::default();
        for alert in state
            .alerts
            .values()
            .filter(|a| &a.site_id == site_id && filter.allows(&a.site_id))
        {
            stats.total += 1;
            match alert.status {
                AlertStatus::Unacknowledged => stats.unacknowledged += 1,
                AlertStatus::Acknowledged => stats.acknowledged += 1,
                AlertStatus::Resolved => stats.resolved += 1,
            }
            match alert.priority {
                AlertPriority::High => stats.high += 1,
                AlertPriority::Medium => stats.medium += 1,
                AlertPriority::Low => stats.low += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    fn alert(id: &str, alert_type: &str, related: Option<&str>) -> AlertEntity {
        AlertEntity::new(
            AlertId::new(id),
            SiteId::new("s1"),
            alert_type,
            AlertPriority::High,
            "title",
            "message",
            "access_sync",
            related.map(str::to_string),
            now(),
        )
    }

    #[tokio::test]
    async fn test_find_open_alert_skips_resolved() {
        let repo = MemoryAuditRepo::new();
        let mut a = alert("al1", "SYNC_FAILED", Some("g1"));
        repo.create_alert(a.clone()).await.unwrap();

        let found = repo
            .find_open_alert(&SiteId::new("s1"), "SYNC_FAILED", Some("g1"))
            .await
            .unwrap();
        assert!(found.is_some());

        a.status = AlertStatus::Resolved;
        repo.update_alert(a).await.unwrap();
        let gone = repo
            .find_open_alert(&SiteId::new("s1"), "SYNC_FAILED", Some("g1"))
            .await
            .unwrap();
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn test_alert_stats_counts() {
        let repo = MemoryAuditRepo::new();
        repo.create_alert(alert("al1", "SYNC_FAILED", Some("g1")))
            .await
            .unwrap();
        let mut medium = alert("al2", "SYNC_STUCK", None);
        medium.priority = AlertPriority::Medium;
        medium.status = AlertStatus::Acknowledged;
        repo.create_alert(medium).await.unwrap();

        let stats = repo
            .alert_stats(&SiteFilter::All, &SiteId::new("s1"))
            .await
            .unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.unacknowledged, 1);
        assert_eq!(stats.acknowledged, 1);
        assert_eq!(stats.high, 1);
        assert_eq!(stats.medium, 1);
    }
}
