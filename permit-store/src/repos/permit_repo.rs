//! Work-permit repository: permits, daily tickets, fanouts, aggregates.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use permit_core::{
    ContractorId, CoreError, CoreResult, DailyTicketId, DailyTicketStatus, FanoutId, PermitId,
    PermitStatus, SiteFilter, WorkerId,
};

use super::Page;
use crate::entities::{
    DailyTicketEntity, DailyTicketWorkerEntity, PermitAggregate, WorkPermitEntity,
};

/// Listing filter for permits.
#[derive(Clone, Debug, Default)]
pub struct PermitListFilter {
    pub status: Option<PermitStatus>,
    pub contractor_id: Option<ContractorId>,
    /// Keep permits whose date window covers this day
    pub date: Option<NaiveDate>,
    /// Substring match on the title
    pub keyword: Option<String>,
    pub page: usize,
    pub page_size: usize,
}

impl PermitListFilter {
    pub fn new() -> Self {
        Self {
            page: 1,
            page_size: 20,
            ..Default::default()
        }
    }
}

/// Work-permit repository trait
#[async_trait]
pub trait PermitRepository: Send + Sync {
    async fn create_permit(&self, entity: WorkPermitEntity) -> CoreResult<WorkPermitEntity>;

    async fn get_permit(
        &self,
        filter: &SiteFilter,
        permit_id: &PermitId,
    ) -> CoreResult<Option<WorkPermitEntity>>;

    async fn get_permit_required(
        &self,
        filter: &SiteFilter,
        permit_id: &PermitId,
    ) -> CoreResult<WorkPermitEntity> {
        self.get_permit(filter, permit_id)
            .await?
            .ok_or_else(|| CoreError::not_found("WorkPermit", permit_id.as_str()))
    }

    async fn update_permit(&self, entity: WorkPermitEntity) -> CoreResult<WorkPermitEntity>;

    async fn list_permits(
        &self,
        filter: &SiteFilter,
        query: &PermitListFilter,
    ) -> CoreResult<Page<WorkPermitEntity>>;

    async fn create_daily_tickets(&self, entities: Vec<DailyTicketEntity>) -> CoreResult<()>;

    async fn get_daily_ticket(
        &self,
        filter: &SiteFilter,
        daily_ticket_id: &DailyTicketId,
    ) -> CoreResult<Option<DailyTicketEntity>>;

    async fn get_daily_ticket_required(
        &self,
        filter: &SiteFilter,
        daily_ticket_id: &DailyTicketId,
    ) -> CoreResult<DailyTicketEntity> {
        self.get_daily_ticket(filter, daily_ticket_id)
            .await?
            .ok_or_else(|| CoreError::not_found("DailyTicket", daily_ticket_id.as_str()))
    }

    async fn update_daily_ticket(&self, entity: DailyTicketEntity) -> CoreResult<DailyTicketEntity>;

    /// Tickets of one permit, ordered by date
    async fn list_daily_tickets_for_permit(
        &self,
        filter: &SiteFilter,
        permit_id: &PermitId,
    ) -> CoreResult<Vec<DailyTicketEntity>>;

    /// Tickets for a calendar day, optionally narrowed to one status
    async fn list_daily_tickets_by_date(
        &self,
        filter: &SiteFilter,
        date: NaiveDate,
        status: Option<DailyTicketStatus>,
    ) -> CoreResult<Vec<DailyTicketEntity>>;

    async fn create_fanouts(&self, entities: Vec<DailyTicketWorkerEntity>) -> CoreResult<()>;

    async fn get_fanout(
        &self,
        filter: &SiteFilter,
        fanout_id: &FanoutId,
    ) -> CoreResult<Option<DailyTicketWorkerEntity>>;

    async fn get_fanout_required(
        &self,
        filter: &SiteFilter,
        fanout_id: &FanoutId,
    ) -> CoreResult<DailyTicketWorkerEntity> {
        self.get_fanout(filter, fanout_id)
            .await?
            .ok_or_else(|| CoreError::not_found("DailyTicketWorker", fanout_id.as_str()))
    }

    async fn update_fanout(
        &self,
        entity: DailyTicketWorkerEntity,
    ) -> CoreResult<DailyTicketWorkerEntity>;

    async fn list_fanouts_for_ticket(
        &self,
        filter: &SiteFilter,
        daily_ticket_id: &DailyTicketId,
    ) -> CoreResult<Vec<DailyTicketWorkerEntity>>;

    /// Fanout of one worker on one daily ticket, if present
    async fn find_fanout(
        &self,
        filter: &SiteFilter,
        daily_ticket_id: &DailyTicketId,
        worker_id: &WorkerId,
    ) -> CoreResult<Option<DailyTicketWorkerEntity>>;

    /// The permit with its full child graph, days ordered by date
    async fn load_aggregate(
        &self,
        filter: &SiteFilter,
        permit_id: &PermitId,
    ) -> CoreResult<PermitAggregate>;
}

#[derive(Default)]
struct PermitState {
    permits: BTreeMap<PermitId, WorkPermitEntity>,
    tickets: BTreeMap<DailyTicketId, DailyTicketEntity>,
    fanouts: BTreeMap<FanoutId, DailyTicketWorkerEntity>,
}

/// In-memory permit repository.
#[derive(Default)]
pub struct MemoryPermitRepo {
    state: RwLock<PermitState>,
}

impl MemoryPermitRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PermitRepository for MemoryPermitRepo {
    async fn create_permit(&self, entity: WorkPermitEntity) -> CoreResult<WorkPermitEntity> {
        let mut state = self.state.write().await;
        if state.permits.contains_key(&entity.permit_id) {
            return Err(CoreError::conflict(format!(
                "permit {} already exists",
                entity.permit_id
            )));
        }
        state
            .permits
            .insert(entity.permit_id.clone(), entity.clone());
        Ok(entity)
    }

    async fn get_permit(
        &self,
        filter: &SiteFilter,
        permit_id: &PermitId,
    ) -> CoreResult<Option<WorkPermitEntity>> {
        Ok(self
            .state
            .read()
            .await
            .permits
            .get(permit_id)
            .filter(|p| filter.allows(&p.site_id))
            .cloned())
    }

    async fn update_permit(&self, entity: WorkPermitEntity) -> CoreResult<WorkPermitEntity> {
        let mut state = self.state.write().await;
        if !state.permits.contains_key(&entity.permit_id) {
            return Err(CoreError::not_found("WorkPermit", entity.permit_id.as_str()));
        }
        state
            .permits
            .insert(entity.permit_id.clone(), entity.clone());
        Ok(entity)
    }

    async fn list_permits(
        &self,
        filter: &SiteFilter,
        query: &PermitListFilter,
    ) -> CoreResult<Page<WorkPermitEntity>> {
        let state = self.state.read().await;
        let mut matched: Vec<_> = state
            .permits
            .values()
            .filter(|p| filter.allows(&p.site_id))
            .filter(|p| query.status.map_or(true, |s| p.status == s))
            .filter(|p| {
                query
                    .contractor_id
                    .as_ref()
                    .map_or(true, |c| &p.contractor_id == c)
            })
            .filter(|p| {
                query
                    .date
                    .map_or(true, |d| p.start_date <= d && d <= p.end_date)
            })
            .filter(|p| {
                query
                    .keyword
                    .as_ref()
                    .map_or(true, |k| p.title.contains(k.as_str()))
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::slice(matched, query.page.max(1), query.page_size))
    }

    async fn create_daily_tickets(&self, entities: Vec<DailyTicketEntity>) -> CoreResult<()> {
        let mut state = self.state.write().await;
        for entity in &entities {
            let duplicate = state
                .tickets
                .values()
                .any(|t| t.permit_id == entity.permit_id && t.date == entity.date);
            if duplicate {
                return Err(CoreError::conflict(format!(
                    "daily ticket for permit {} on {} already exists",
                    entity.permit_id, entity.date
                )));
            }
            state
                .tickets
                .insert(entity.daily_ticket_id.clone(), entity.clone());
        }
        Ok(())
    }

    async fn get_daily_ticket(
        &self,
        filter: &SiteFilter,
        daily_ticket_id: &DailyTicketId,
    ) -> CoreResult<Option<DailyTicketEntity>> {
        Ok(self
            .state
            .read()
            .await
            .tickets
            .get(daily_ticket_id)
            .filter(|t| filter.allows(&t.site_id))
            .cloned())
    }

    async fn update_daily_ticket(
        &self,
        entity: DailyTicketEntity,
    ) -> CoreResult<DailyTicketEntity> {
        let mut state = self.state.write().await;
        if !state.tickets.contains_key(&entity.daily_ticket_id) {
            return Err(CoreError::not_found(
                "DailyTicket",
                entity.daily_ticket_id.as_str(),
            ));
        }
        state
            .tickets
            .insert(entity.daily_ticket_id.clone(), entity.clone());
        Ok(entity)
    }

    async fn list_daily_tickets_for_permit(
        &self,
        filter: &SiteFilter,
        permit_id: &PermitId,
    ) -> CoreResult<Vec<DailyTicketEntity>> {
        let state = self.state.read().await;
        let mut tickets: Vec<_> = state
            .tickets
            .values()
            .filter(|t| &t.permit_id == permit_id && filter.allows(&t.site_id))
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.date);
        Ok(tickets)
    }

    async fn list_daily_tickets_by_date(
        &self,
        filter: &SiteFilter,
        date: NaiveDate,
        status: Option<DailyTicketStatus>,
    ) -> CoreResult<Vec<DailyTicketEntity>> {
        let state = self.state.read().await;
        let mut tickets: Vec<_> = state
            .tickets
            .values()
            .filter(|t| t.date == date && filter.allows(&t.site_id))
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        tickets.sort_by(|a, b| a.daily_ticket_id.cmp(&b.daily_ticket_id));
        Ok(tickets)
    }

    async fn create_fanouts(&self, entities: Vec<DailyTicketWorkerEntity>) -> CoreResult<()> {
        let mut state = self.state.write().await;
        for entity in entities {
            state.fanouts.insert(entity.fanout_id.clone(), entity);
        }
        Ok(())
    }

    async fn get_fanout(
        &self,
        filter: &SiteFilter,
        fanout_id: &FanoutId,
    ) -> CoreResult<Option<DailyTicketWorkerEntity>> {
        Ok(self
            .state
            .read()
            .await
            .fanouts
            .get(fanout_id)
            .filter(|f| filter.allows(&f.site_id))
            .cloned())
    }

    async fn update_fanout(
        &self,
        entity: DailyTicketWorkerEntity,
    ) -> CoreResult<DailyTicketWorkerEntity> {
        let mut state = self.state.write().await;
        if !state.fanouts.contains_key(&entity.fanout_id) {
            return Err(CoreError::not_found(
                "DailyTicketWorker",
                entity.fanout_id.as_str(),
            ));
        }
        state
            .fanouts
            .insert(entity.fanout_id.clone(), entity.clone());
        Ok(entity)
    }

    async fn list_fanouts_for_ticket(
        &self,
        filter: &SiteFilter,
        daily_ticket_id: &DailyTicketId,
    ) -> CoreResult<Vec<DailyTicketWorkerEntity>> {
        let state = self.state.read().await;
        let mut fanouts: Vec<_> = state
            .fanouts
            .values()
            .filter(|f| &f.daily_ticket_id == daily_ticket_id && filter.allows(&f.site_id))
            .cloned()
            .collect();
        fanouts.sort_by(|a, b| a.fanout_id.cmp(&b.fanout_id));
        Ok(fanouts)
    }

    async fn find_fanout(
        &self,
        filter: &SiteFilter,
        daily_ticket_id: &DailyTicketId,
        worker_id: &WorkerId,
    ) -> CoreResult<Option<DailyTicketWorkerEntity>> {
        let state = self.state.read().await;
        Ok(state
            .fanouts
            .values()
            .find(|f| {
                &f.daily_ticket_id == daily_ticket_id
                    && &f.worker_id == worker_id
                    && filter.allows(&f.site_id)
            })
            .cloned())
    }

    async fn load_aggregate(
        &self,
        filter: &SiteFilter,
        permit_id: &PermitId,
    ) -> CoreResult<PermitAggregate> {
        let permit = self.get_permit_required(filter, permit_id).await?;
        let tickets = self
            .list_daily_tickets_for_permit(filter, permit_id)
            .await?;
        let mut days = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            let fanouts = self
                .list_fanouts_for_ticket(filter, &ticket.daily_ticket_id)
                .await?;
            days.push((ticket, fanouts));
        }
        Ok(PermitAggregate { permit, days })
    }
}
