//! Training session repository.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use permit_core::{
    CoreError, CoreResult, FanoutId, SessionId, SessionStatus, SessionToken, SiteFilter,
};

use crate::entities::TrainingSessionEntity;

/// Training session repository trait
#[async_trait]
pub trait TrainingRepository: Send + Sync {
    async fn create_session(
        &self,
        entity: TrainingSessionEntity,
    ) -> CoreResult<TrainingSessionEntity>;

    async fn get_session(
        &self,
        filter: &SiteFilter,
        session_id: &SessionId,
    ) -> CoreResult<Option<TrainingSessionEntity>>;

    /// Look up by opaque token; the token itself authenticates the caller
    async fn get_by_token(&self, token: &SessionToken)
        -> CoreResult<Option<TrainingSessionEntity>>;

    async fn get_by_token_required(
        &self,
        token: &SessionToken,
    ) -> CoreResult<TrainingSessionEntity> {
        self.get_by_token(token)
            .await?
            .ok_or_else(|| CoreError::not_found("TrainingSession", token.as_str()))
    }

    /// Any session ever opened for this fanout (at most one exists)
    async fn get_for_fanout(
        &self,
        filter: &SiteFilter,
        fanout_id: &FanoutId,
    ) -> CoreResult<Option<TrainingSessionEntity>>;

    async fn update_session(
        &self,
        entity: TrainingSessionEntity,
    ) -> CoreResult<TrainingSessionEntity>;

    /// All sessions still in progress, for the sweep
    async fn list_open_sessions(&self) -> CoreResult<Vec<TrainingSessionEntity>>;
}

/// In-memory training repository.
#[derive(Default)]
pub struct MemoryTrainingRepo {
    state: RwLock<BTreeMap<SessionId, TrainingSessionEntity>>,
}

impl MemoryTrainingRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrainingRepository for MemoryTrainingRepo {
    async fn create_session(
        &self,
        entity: TrainingSessionEntity,
    ) -> CoreResult<TrainingSessionEntity> {
        let mut state = self.state.write().await;
        let duplicate = state.values().any(|s| s.fanout_id == entity.fanout_id);
        if duplicate {
            return Err(CoreError::conflict(format!(
                "training session for fanout {} already exists",
                entity.fanout_id
            )));
        }
        state.insert(entity.session_id.clone(), entity.clone());
        Ok(entity)
    }

    async fn get_session(
        &self,
        filter: &SiteFilter,
        session_id: &SessionId,
    ) -> CoreResult<Option<TrainingSessionEntity>> {
        Ok(self
            .state
            .read()
            .await
            .get(session_id)
            .filter(|s| filter.allows(&s.site_id))
            .cloned())
    }

    async fn get_by_token(
        &self,
        token: &SessionToken,
    ) -> CoreResult<Option<TrainingSessionEntity>> {
        Ok(self
            .state
            .read()
            .await
            .values()
            .find(|s| &s.token == token)
            .cloned())
    }

    async fn get_for_fanout(
        &self,
        filter: &SiteFilter,
        fanout_id: &FanoutId,
    ) -> CoreResult<Option<TrainingSessionEntity>> {
        Ok(self
            .state
            .read()
            .await
            .values()
            .find(|s| &s.fanout_id == fanout_id && filter.allows(&s.site_id))
            .cloned())
    }

    async fn update_session(
        &self,
        entity: TrainingSessionEntity,
    ) -> CoreResult<TrainingSessionEntity> {
        let mut state = self.state.write().await;
        if !state.contains_key(&entity.session_id) {
            return Err(CoreError::not_found(
                "TrainingSession",
                entity.session_id.as_str(),
            ));
        }
        state.insert(entity.session_id.clone(), entity.clone());
        Ok(entity)
    }

    async fn list_open_sessions(&self) -> CoreResult<Vec<TrainingSessionEntity>> {
        Ok(self
            .state
            .read()
            .await
            .values()
            .filter(|s| s.status == SessionStatus::InProgress)
            .cloned()
            .collect())
    }
}
