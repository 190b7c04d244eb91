//! Domain services.
//!
//! Each service owns one concern of the platform: audit & alerts, the
//! notification pipeline, the access-grant lifecycle, the training engine,
//! and the work-permit core with its change protocol. Services hold their
//! repositories behind `Arc<dyn Trait>` and receive the caller's
//! [`permit_core::TenantContext`] on every request-scoped operation.

pub mod access_service;
pub mod audit_service;
pub mod notification_service;
pub mod permit_change;
pub mod permit_service;
pub mod training_service;

pub use access_service::{AccessService, GateDecision, IngestOutcome, IngestReport};
pub use audit_service::{AuditInput, AuditService, BatchAlertOutcome};
pub use notification_service::{DrainReport, EnqueueOutcome, NotificationService};
pub use permit_change::PermitChange;
pub use permit_service::{BatchPermitOutcome, CreatePermitRequest, PermitService};
pub use training_service::{HeartbeatOutcome, TrainingService};
