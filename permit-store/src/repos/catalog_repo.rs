//! Catalog repository: sites, contractors, workers, areas.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use permit_core::{AreaId, ContractorId, CoreError, CoreResult, SiteFilter, SiteId, WorkerId};

use crate::entities::{AreaEntity, ContractorEntity, SiteEntity, WorkerEntity};

/// Catalog repository trait
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn create_site(&self, entity: SiteEntity) -> CoreResult<SiteEntity>;

    async fn get_site(&self, site_id: &SiteId) -> CoreResult<Option<SiteEntity>>;

    async fn get_site_required(&self, site_id: &SiteId) -> CoreResult<SiteEntity> {
        self.get_site(site_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Site", site_id.as_str()))
    }

    async fn create_contractor(&self, entity: ContractorEntity) -> CoreResult<ContractorEntity>;

    async fn get_contractor(
        &self,
        contractor_id: &ContractorId,
    ) -> CoreResult<Option<ContractorEntity>>;

    async fn get_contractor_required(
        &self,
        contractor_id: &ContractorId,
    ) -> CoreResult<ContractorEntity> {
        self.get_contractor(contractor_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Contractor", contractor_id.as_str()))
    }

    /// Create a worker; the `(site, id_number)` pair must be unique
    async fn create_worker(&self, entity: WorkerEntity) -> CoreResult<WorkerEntity>;

    async fn get_worker(
        &self,
        filter: &SiteFilter,
        worker_id: &WorkerId,
    ) -> CoreResult<Option<WorkerEntity>>;

    async fn get_worker_required(
        &self,
        filter: &SiteFilter,
        worker_id: &WorkerId,
    ) -> CoreResult<WorkerEntity> {
        self.get_worker(filter, worker_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Worker", worker_id.as_str()))
    }

    async fn update_worker(&self, entity: WorkerEntity) -> CoreResult<WorkerEntity>;

    async fn list_workers_for_site(&self, site_id: &SiteId) -> CoreResult<Vec<WorkerEntity>>;

    async fn create_area(&self, entity: AreaEntity) -> CoreResult<AreaEntity>;

    async fn get_area(
        &self,
        filter: &SiteFilter,
        area_id: &AreaId,
    ) -> CoreResult<Option<AreaEntity>>;

    async fn get_area_required(
        &self,
        filter: &SiteFilter,
        area_id: &AreaId,
    ) -> CoreResult<AreaEntity> {
        self.get_area(filter, area_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Area", area_id.as_str()))
    }

    async fn list_areas_for_site(&self, site_id: &SiteId) -> CoreResult<Vec<AreaEntity>>;
}

#[derive(Default)]
struct CatalogState {
    sites: HashMap<SiteId, SiteEntity>,
    contractors: HashMap<ContractorId, ContractorEntity>,
    workers: HashMap<WorkerId, WorkerEntity>,
    areas: HashMap<AreaId, AreaEntity>,
}

/// In-memory catalog repository.
#[derive(Default)]
pub struct MemoryCatalogRepo {
    state: RwLock<CatalogState>,
}

impl MemoryCatalogRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogRepository for MemoryCatalogRepo {
    async fn create_site(&self, entity: SiteEntity) -> CoreResult<SiteEntity> {
        let mut state = self.state.write().await;
        if state.sites.contains_key(&entity.site_id) {
            return Err(CoreError::conflict(format!(
                "site {} already exists",
                entity.site_id
            )));
        }
        state.sites.insert(entity.site_id.clone(), entity.clone());
        Ok(entity)
    }

    async fn get_site(&self, site_id: &SiteId) -> CoreResult<Option<SiteEntity>> {
        Ok(self.state.read().await.sites.get(site_id).cloned())
    }

    async fn create_contractor(&self, entity: ContractorEntity) -> CoreResult<ContractorEntity> {
        let mut state = self.state.write().await;
        if state.contractors.contains_key(&entity.contractor_id) {
            return Err(CoreError::conflict(format!(
                "contractor {} already exists",
                entity.contractor_id
            )));
        }
        state
            .contractors
            .insert(entity.contractor_id.clone(), entity.clone());
        Ok(entity)
    }

    async fn get_contractor(
        &self,
        contractor_id: &ContractorId,
    ) -> CoreResult<Option<ContractorEntity>> {
        Ok(self
            .state
            .read()
            .await
            .contractors
            .get(contractor_id)
            .cloned())
    }

    async fn create_worker(&self, entity: WorkerEntity) -> CoreResult<WorkerEntity> {
        let mut state = self.state.write().await;
        let duplicate = state
            .workers
            .values()
            .any(|w| w.site_id == entity.site_id && w.id_number == entity.id_number);
        if duplicate {
            return Err(CoreError::conflict(format!(
                "id number {} already registered on site {}",
                entity.id_number, entity.site_id
            )));
        }
        state
            .workers
            .insert(entity.worker_id.clone(), entity.clone());
        Ok(entity)
    }

    async fn get_worker(
        &self,
        filter: &SiteFilter,
        worker_id: &WorkerId,
    ) -> CoreResult<Option<WorkerEntity>> {
        Ok(self
            .state
            .read()
            .await
            .workers
            .get(worker_id)
            .filter(|w| filter.allows(&w.site_id))
            .cloned())
    }

    async fn update_worker(&self, entity: WorkerEntity) -> CoreResult<WorkerEntity> {
        let mut state = self.state.write().await;
        if !state.workers.contains_key(&entity.worker_id) {
            return Err(CoreError::not_found("Worker", entity.worker_id.as_str()));
        }
        state
            .workers
            .insert(entity.worker_id.clone(), entity.clone());
        Ok(entity)
    }

    async fn list_workers_for_site(&self, site_id: &SiteId) -> CoreResult<Vec<WorkerEntity>> {
        let state = self.state.read().await;
        let mut workers: Vec<_> = state
            .workers
            .values()
            .filter(|w| &w.site_id == site_id)
            .cloned()
            .collect();
        workers.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        Ok(workers)
    }

    async fn create_area(&self, entity: AreaEntity) -> CoreResult<AreaEntity> {
        let mut state = self.state.write().await;
        if state.areas.contains_key(&entity.area_id) {
            return Err(CoreError::conflict(format!(
                "area {} already exists",
                entity.area_id
            )));
        }
        state.areas.insert(entity.area_id.clone(), entity.clone());
        Ok(entity)
    }

    async fn get_area(
        &self,
        filter: &SiteFilter,
        area_id: &AreaId,
    ) -> CoreResult<Option<AreaEntity>> {
        Ok(self
            .state
            .read()
            .await
            .areas
            .get(area_id)
            .filter(|a| filter.allows(&a.site_id))
            .cloned())
    }

    async fn list_areas_for_site(&self, site_id: &SiteId) -> CoreResult<Vec<AreaEntity>> {
        let state = self.state.read().await;
        let mut areas: Vec<_> = state
            .areas
            .values()
            .filter(|a| &a.site_id == site_id)
            .cloned()
            .collect();
        areas.sort_by(|a, b| a.area_id.cmp(&b.area_id));
        Ok(areas)
    }
}
