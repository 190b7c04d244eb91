//! Table names and index hints for the persisted layout.
//!
//! All business tables carry `site_id`, `created_at`, and `updated_at`.
//! Soft delete is not used; disabled and terminated states are preferred.

/// Table name constants
pub mod tables {
    pub const SITE: &str = "site";
    pub const CONTRACTOR: &str = "contractor";
    pub const WORKER: &str = "worker";
    pub const AREA: &str = "area";
    pub const WORK_PERMIT: &str = "work_permit";
    pub const DAILY_TICKET: &str = "daily_ticket";
    pub const DAILY_TICKET_WORKER: &str = "daily_ticket_worker";
    pub const TRAINING_SESSION: &str = "training_session";
    pub const ACCESS_GRANT: &str = "access_grant";
    pub const ACCESS_EVENT: &str = "access_event";
    pub const NOTIFICATION_LOG: &str = "notification_log";
    pub const AUDIT_LOG: &str = "audit_log";
    pub const ALERT: &str = "alert";
    pub const OUTBOX: &str = "outbox";
}

/// Index hints for a relational backing store.
///
/// The in-memory repositories keep equivalent lookup maps; a SQL
/// implementation is expected to create these indexes.
pub mod indexes {
    /// `(site_id, status)` on work permits
    pub const PERMIT_SITE_STATUS: &str = "idx_work_permit_site_status";
    /// `(permit_id, date)` unique on daily tickets
    pub const DAILY_TICKET_PERMIT_DATE: &str = "uq_daily_ticket_permit_date";
    /// `(daily_ticket_id)` on fanouts
    pub const FANOUT_DAILY_TICKET: &str = "idx_daily_ticket_worker_ticket";
    /// `(status, next_attempt_at)` on grants, drives the sync drainer
    pub const GRANT_STATUS_NEXT_ATTEMPT: &str = "idx_access_grant_status_next";
    /// `(worker_id, event_time desc)` on access events
    pub const EVENT_WORKER_TIME: &str = "idx_access_event_worker_time";
    /// `(vendor_event_id)` unique on access events, dedups vendor callbacks
    pub const EVENT_VENDOR_ID: &str = "uq_access_event_vendor_id";
    /// `(worker_id, read_at, sent_at)` on notification logs
    pub const NOTIFICATION_WORKER_READ: &str = "idx_notification_worker_read";
}
