//! Core layer of the work-permit platform.
//!
//! Defines the typed identifiers, status vocabulary, configuration, error
//! taxonomy, tenant context, and the pure domain logic (training progress
//! validation, random identity checks, notification scoring, retry
//! scheduling) shared by the storage and background-task crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod providers;
pub mod retry;
pub mod tenant;
pub mod training;
pub mod types;

pub use config::{AccessProviderCaps, PlatformConfig};
pub use error::{CoreError, CoreResult};
pub use providers::{
    provider_grant_key, AccessProvider, FaceVerdict, FaceVerifier, IssueGrantRequest,
    ProviderGrant, PushProvider, RealnameRegistry, RealnameVerdict,
};
pub use retry::RetrySchedule;
pub use tenant::{Role, SiteFilter, TenantContext};
pub use types::*;
