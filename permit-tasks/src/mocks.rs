//! Scriptable provider doubles.
//!
//! Used by the loop tests and by local development profiles where no real
//! provider is reachable. Outcomes are scripted per call; every interaction
//! is recorded for inspection.

use std::collections::VecDeque;

use async_trait::async_trait;
use permit_core::{
    AccessProvider, CoreError, CoreResult, FaceVerdict, FaceVerifier, IssueGrantRequest,
    ProviderGrant, PushProvider, RealnameRegistry, RealnameVerdict, SiteId, WorkerId,
};
use tokio::sync::Mutex;

/// Scripted outcome of one provider call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MockOutcome {
    Ok,
    Transient,
    Permanent,
}

#[derive(Default)]
struct MockAccessState {
    outcomes: VecDeque<MockOutcome>,
    issued: Vec<IssueGrantRequest>,
    revoked: Vec<String>,
    grants: Vec<ProviderGrant>,
    refs_issued: u64,
}

/// Access-control provider double. Calls consume the scripted outcome
/// queue; an empty queue means success.
#[derive(Default)]
pub struct MockAccessProvider {
    state: Mutex<MockAccessState>,
}

impl MockAccessProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcomes of the next calls, in order
    pub async fn script(&self, outcomes: &[MockOutcome]) {
        let mut state = self.state.lock().await;
        state.outcomes.extend(outcomes.iter().copied());
    }

    /// Seed the provider-side grant set reported by `list_grants`
    pub async fn seed_grants(&self, grants: Vec<ProviderGrant>) {
        self.state.lock().await.grants = grants;
    }

    /// Issue requests seen so far
    pub async fn issued(&self) -> Vec<IssueGrantRequest> {
        self.state.lock().await.issued.clone()
    }

    /// Provider refs revoked so far
    pub async fn revoked(&self) -> Vec<String> {
        self.state.lock().await.revoked.clone()
    }

    async fn next_outcome(&self) -> MockOutcome {
        self.state
            .lock()
            .await
            .outcomes
            .pop_front()
            .unwrap_or(MockOutcome::Ok)
    }
}

#[async_trait]
impl AccessProvider for MockAccessProvider {
    async fn issue_grant(&self, request: IssueGrantRequest) -> CoreResult<String> {
        let outcome = self.next_outcome().await;
        let mut state = self.state.lock().await;
        state.issued.push(request.clone());
        match outcome {
            MockOutcome::Ok => {
                state.refs_issued += 1;
                let provider_ref = format!("ref-{:04}", state.refs_issued);
                state.grants.push(ProviderGrant {
                    worker_external_id: request.worker_external_id,
                    area_external_id: request.area_external_id,
                    provider_ref: provider_ref.clone(),
                });
                Ok(provider_ref)
            }
            MockOutcome::Transient => Err(CoreError::ExternalTransient(
                "provider unavailable".to_string(),
            )),
            MockOutcome::Permanent => Err(CoreError::ExternalPermanent(
                "provider rejected grant".to_string(),
            )),
        }
    }

    async fn revoke_grant(&self, provider_ref: &str) -> CoreResult<()> {
        let outcome = self.next_outcome().await;
        match outcome {
            MockOutcome::Ok => {
                let mut state = self.state.lock().await;
                state.revoked.push(provider_ref.to_string());
                state.grants.retain(|g| g.provider_ref != provider_ref);
                Ok(())
            }
            MockOutcome::Transient => Err(CoreError::ExternalTransient(
                "provider unavailable".to_string(),
            )),
            MockOutcome::Permanent => Err(CoreError::ExternalPermanent(
                "unknown provider ref".to_string(),
            )),
        }
    }

    async fn list_grants(&self, _site_id: &SiteId) -> CoreResult<Vec<ProviderGrant>> {
        Ok(self.state.lock().await.grants.clone())
    }
}

/// Push provider double; records every delivery.
#[derive(Default)]
pub struct MockPushProvider {
    sent: Mutex<Vec<(WorkerId, String, serde_json::Value)>>,
}

impl MockPushProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<(WorkerId, String, serde_json::Value)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl PushProvider for MockPushProvider {
    async fn send(
        &self,
        worker_id: &WorkerId,
        template_id: &str,
        payload: &serde_json::Value,
    ) -> CoreResult<()> {
        self.sent
            .lock()
            .await
            .push((worker_id.clone(), template_id.to_string(), payload.clone()));
        Ok(())
    }
}

/// Face verifier double with a fixed verdict.
pub struct MockFaceVerifier {
    pub passed: bool,
}

#[async_trait]
impl FaceVerifier for MockFaceVerifier {
    async fn verify(&self, _sample: &[u8], _worker_reference: &str) -> CoreResult<FaceVerdict> {
        Ok(FaceVerdict {
            passed: self.passed,
            score: if self.passed { 0.98 } else { 0.31 },
        })
    }
}

/// Real-name registry double with a fixed verdict.
pub struct MockRealnameRegistry {
    pub verdict: RealnameVerdict,
}

#[async_trait]
impl RealnameRegistry for MockRealnameRegistry {
    async fn lookup(&self, _name: &str, _id_number: &str) -> CoreResult<RealnameVerdict> {
        Ok(self.verdict)
    }
}
