//! Catalog entities: sites, contractors, workers, areas.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use permit_core::{AreaId, BindState, ContractorId, SiteId, WorkerId, WorkerStatus};

use super::Record;
use crate::schema::tables;

/// Tenant root.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SiteEntity {
    pub site_id: SiteId,
    pub name: String,
    /// Default start of the daily access window
    pub default_access_start: NaiveTime,
    /// Default end of the daily access window
    pub default_access_end: NaiveTime,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for SiteEntity {
    const TABLE: &'static str = tables::SITE;

    fn record_id(&self) -> &str {
        self.site_id.as_str()
    }

    fn site(&self) -> Option<&SiteId> {
        Some(&self.site_id)
    }
}

impl SiteEntity {
    pub fn new(site_id: SiteId, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        // 06:00–20:00 is the conventional construction-site day
        let start = NaiveTime::from_hms_opt(6, 0, 0).unwrap_or_default();
        let end = NaiveTime::from_hms_opt(20, 0, 0).unwrap_or_default();
        Self {
            site_id,
            name: name.into(),
            default_access_start: start,
            default_access_end: end,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Contracting company; may be bound to several sites.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContractorEntity {
    pub contractor_id: ContractorId,
    pub name: String,
    pub qualification: Option<String>,
    /// Sites the contractor is bound to
    pub site_ids: Vec<SiteId>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for ContractorEntity {
    const TABLE: &'static str = tables::CONTRACTOR;

    fn record_id(&self) -> &str {
        self.contractor_id.as_str()
    }

    fn site(&self) -> Option<&SiteId> {
        None
    }
}

impl ContractorEntity {
    pub fn new(
        contractor_id: ContractorId,
        name: impl Into<String>,
        site_ids: Vec<SiteId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            contractor_id,
            name: name.into(),
            qualification: None,
            site_ids,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_bound_to(&self, site_id: &SiteId) -> bool {
        self.site_ids.contains(site_id)
    }
}

/// Field operative.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerEntity {
    pub worker_id: WorkerId,
    pub site_id: SiteId,
    pub contractor_id: ContractorId,
    pub name: String,
    pub phone: String,
    /// Identity number, unique per site
    pub id_number: String,
    pub bind_state: BindState,
    pub status: WorkerStatus,
    /// Small-client identity, set on bind
    pub openid: Option<String>,
    /// Enrolled face reference at the verification provider
    pub face_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for WorkerEntity {
    const TABLE: &'static str = tables::WORKER;

    fn record_id(&self) -> &str {
        self.worker_id.as_str()
    }

    fn site(&self) -> Option<&SiteId> {
        Some(&self.site_id)
    }
}

impl WorkerEntity {
    pub fn new(
        worker_id: WorkerId,
        site_id: SiteId,
        contractor_id: ContractorId,
        name: impl Into<String>,
        id_number: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            worker_id,
            site_id,
            contractor_id,
            name: name.into(),
            phone: String::new(),
            id_number: id_number.into(),
            bind_state: BindState::Unbound,
            status: WorkerStatus::Active,
            openid: None,
            face_reference: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == WorkerStatus::Active
    }
}

/// Physical zone within a site.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AreaEntity {
    pub area_id: AreaId,
    pub site_id: SiteId,
    pub name: String,
    /// Identifier of this area at the access-control provider
    pub external_id: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for AreaEntity {
    const TABLE: &'static str = tables::AREA;

    fn record_id(&self) -> &str {
        self.area_id.as_str()
    }

    fn site(&self) -> Option<&SiteId> {
        Some(&self.site_id)
    }
}

impl AreaEntity {
    pub fn new(
        area_id: AreaId,
        site_id: SiteId,
        name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let name = name.into();
        Self {
            external_id: area_id.to_string(),
            area_id,
            site_id,
            name,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
