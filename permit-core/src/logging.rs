//! Logging standards and conventions.
//!
//! All crates in the workspace log through `tracing` with structured fields.
//! This module fixes the operation names so output stays uniform; field
//! names are written literally at the call site following the conventions
//! below.
//!
//! # Structured Logging Fields
//!
//! Always use structured fields for key information:
//! - `site_id`: Tenant site identifier
//! - `actor_id`: Principal identifier
//! - `operation`: Operation name
//! - `permit_id` / `grant_id` / `session_id`: Entity identifiers
//! - `error`: Error message
//! - `count`: Item count
//!
//! # Examples
//!
//! ```ignore
//! use tracing::{info, error};
//!
//! // Good: structured logging with context
//! info!(
//!     permit_id = %permit.permit_id,
//!     site_id = %permit.site_id,
//!     operation = operations::PERMIT_APPROVE,
//!     daily_tickets = tickets.len(),
//!     "Permit approved"
//! );
//!
//! // Bad: unstructured logging
//! info!("Approved permit {}", permit.permit_id);
//! ```

/// Log operation categories for consistent naming
pub mod operations {
    // Permit operations
    pub const PERMIT_SUBMIT: &str = "permit_submit";
    pub const PERMIT_APPROVE: &str = "permit_approve";
    pub const PERMIT_REJECT: &str = "permit_reject";
    pub const PERMIT_COMPLETE: &str = "permit_complete";
    pub const PERMIT_TERMINATE: &str = "permit_terminate";
    pub const PERMIT_CHANGE: &str = "permit_change";

    // Training operations
    pub const TRAINING_START: &str = "training_start";
    pub const TRAINING_HEARTBEAT: &str = "training_heartbeat";
    pub const TRAINING_CHECK: &str = "training_check";
    pub const TRAINING_SWEEP: &str = "training_sweep";

    // Access operations
    pub const GRANT_CREATE: &str = "grant_create";
    pub const GRANT_SYNC: &str = "grant_sync";
    pub const GRANT_REVOKE: &str = "grant_revoke";
    pub const GATE_CHECK: &str = "gate_check";
    pub const RECONCILE: &str = "reconcile";

    // Notification operations
    pub const NOTIFY_ENQUEUE: &str = "notify_enqueue";
    pub const NOTIFY_DRAIN: &str = "notify_drain";

    // Audit operations
    pub const AUDIT_RECORD: &str = "audit_record";
    pub const ALERT_RAISE: &str = "alert_raise";

    // Scheduler operations
    pub const DAY_START: &str = "day_start";
    pub const DAY_END: &str = "day_end";
}
