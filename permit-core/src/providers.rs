//! External collaborator seams.
//!
//! The platform talks to four external systems through these traits: the
//! access-control provider, the face-verification provider, the real-name
//! registry, and the notification push provider. Contracts are opaque; the
//! transport lives behind the trait. Transient and permanent failures map to
//! the corresponding error kinds so callers can decide on retry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::types::{AreaId, SiteId, WorkerId};

/// Request to issue a grant at the access-control provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IssueGrantRequest {
    pub worker_external_id: String,
    pub area_external_id: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
}

/// A grant as reported by the provider, keyed for reconciliation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderGrant {
    pub worker_external_id: String,
    pub area_external_id: String,
    pub provider_ref: String,
}

/// External access-control system.
#[async_trait]
pub trait AccessProvider: Send + Sync {
    /// Issue a grant; returns the provider-side reference
    async fn issue_grant(&self, request: IssueGrantRequest) -> CoreResult<String>;

    /// Revoke a previously issued grant
    async fn revoke_grant(&self, provider_ref: &str) -> CoreResult<()>;

    /// List the provider's current grant set for a site. Only meaningful
    /// when the provider advertises `supports_query`.
    async fn list_grants(&self, site_id: &SiteId) -> CoreResult<Vec<ProviderGrant>>;
}

/// Verdict of a face verification.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceVerdict {
    pub passed: bool,
    pub score: f64,
}

/// External face-verification system.
#[async_trait]
pub trait FaceVerifier: Send + Sync {
    /// Verify a captured sample against the worker's enrolled reference
    async fn verify(&self, sample: &[u8], worker_reference: &str) -> CoreResult<FaceVerdict>;
}

/// Outcome of a real-name registry lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RealnameVerdict {
    Verified,
    Mismatch,
}

/// External real-name registry, consulted at worker bind time.
#[async_trait]
pub trait RealnameRegistry: Send + Sync {
    async fn lookup(&self, name: &str, id_number: &str) -> CoreResult<RealnameVerdict>;
}

/// Notification push provider (template-based messaging).
#[async_trait]
pub trait PushProvider: Send + Sync {
    /// Deliver one message; the template id comes from the configuration
    /// table mapping internal notification types.
    async fn send(
        &self,
        worker_id: &WorkerId,
        template_id: &str,
        payload: &serde_json::Value,
    ) -> CoreResult<()>;
}

/// Convenience key for matching provider grants against local ones.
pub fn provider_grant_key(worker: &WorkerId, area: &AreaId) -> (String, String) {
    (worker.to_string(), area.to_string())
}
