//! Status vocabularies for the platform entities.
//!
//! Each enum round-trips to the uppercase wire string used in storage and
//! payloads; parsing an unknown string is a validation error.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Work permit lifecycle states.
///
/// ```text
/// DRAFT → SUBMITTED → APPROVED → IN_PROGRESS → COMPLETED
///       ↘ REJECTED           ↘ TERMINATED
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermitStatus {
    Draft,
    Submitted,
    Approved,
    InProgress,
    Completed,
    Rejected,
    Terminated,
}

impl PermitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Submitted => "SUBMITTED",
            Self::Approved => "APPROVED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Rejected => "REJECTED",
            Self::Terminated => "TERMINATED",
        }
    }

    pub fn parse(s: &str) -> CoreResult<Self> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "SUBMITTED" => Ok(Self::Submitted),
            "APPROVED" => Ok(Self::Approved),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            "REJECTED" => Ok(Self::Rejected),
            "TERMINATED" => Ok(Self::Terminated),
            _ => Err(CoreError::validation(format!("unknown permit status: {s}"))),
        }
    }

    /// Terminal states admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Terminated)
    }

    /// The change protocol applies only after approval.
    pub fn accepts_changes(&self) -> bool {
        matches!(self, Self::Approved | Self::InProgress)
    }
}

impl std::fmt::Display for PermitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Daily ticket states, mirroring the owning permit for that day.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DailyTicketStatus {
    /// Generated on approval, waiting for its day to begin
    Published,
    /// The day is underway
    InProgress,
    /// The day ended normally
    Expired,
    /// Removed by a date-shift change or permit termination
    Cancelled,
}

impl DailyTicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Published => "PUBLISHED",
            Self::InProgress => "IN_PROGRESS",
            Self::Expired => "EXPIRED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> CoreResult<Self> {
        match s {
            "PUBLISHED" => Ok(Self::Published),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "EXPIRED" => Ok(Self::Expired),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(CoreError::validation(format!(
                "unknown daily ticket status: {s}"
            ))),
        }
    }

    /// Active states keep grants and training obligations alive.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Published | Self::InProgress)
    }
}

impl std::fmt::Display for DailyTicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Training progress of a daily-ticket fanout row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrainingStatus {
    NotStarted,
    InLearning,
    Completed,
    Failed,
}

impl TrainingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::InLearning => "IN_LEARNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> CoreResult<Self> {
        match s {
            "NOT_STARTED" => Ok(Self::NotStarted),
            "IN_LEARNING" => Ok(Self::InLearning),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            _ => Err(CoreError::validation(format!(
                "unknown training status: {s}"
            ))),
        }
    }
}

/// Training session states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    InProgress,
    Passed,
    Failed,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> CoreResult<Self> {
        match s {
            "IN_PROGRESS" => Ok(Self::InProgress),
            "PASSED" => Ok(Self::Passed),
            "FAILED" => Ok(Self::Failed),
            "EXPIRED" => Ok(Self::Expired),
            _ => Err(CoreError::validation(format!(
                "unknown session status: {s}"
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Access grant lifecycle.
///
/// `PENDING → SYNCING → ACTIVE | FAILED`, with `ACTIVE → REVOKED | EXPIRED`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GrantStatus {
    Pending,
    Syncing,
    Active,
    Failed,
    Expired,
    Revoked,
}

impl GrantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Syncing => "SYNCING",
            Self::Active => "ACTIVE",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
            Self::Revoked => "REVOKED",
        }
    }

    pub fn parse(s: &str) -> CoreResult<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SYNCING" => Ok(Self::Syncing),
            "ACTIVE" => Ok(Self::Active),
            "FAILED" => Ok(Self::Failed),
            "EXPIRED" => Ok(Self::Expired),
            "REVOKED" => Ok(Self::Revoked),
            _ => Err(CoreError::validation(format!("unknown grant status: {s}"))),
        }
    }

    /// States that still hold (or may come to hold) provider-side access.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Pending | Self::Syncing | Self::Active)
    }

    /// States the sync drainer picks up.
    pub fn needs_sync(&self) -> bool {
        matches!(self, Self::Pending | Self::Syncing)
    }
}

impl std::fmt::Display for GrantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a grant was revoked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevokeReason {
    Expired,
    WorkerRemoved,
    AreaRemoved,
    PermitTerminated,
    Manual,
}

impl RevokeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expired => "EXPIRED",
            Self::WorkerRemoved => "WORKER_REMOVED",
            Self::AreaRemoved => "AREA_REMOVED",
            Self::PermitTerminated => "PERMIT_TERMINATED",
            Self::Manual => "MANUAL",
        }
    }
}

/// Alert lifecycle: `UNACK → ACK → RESOLVED`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Unacknowledged,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unacknowledged => "UNACKNOWLEDGED",
            Self::Acknowledged => "ACKNOWLEDGED",
            Self::Resolved => "RESOLVED",
        }
    }

    pub fn parse(s: &str) -> CoreResult<Self> {
        match s {
            "UNACKNOWLEDGED" => Ok(Self::Unacknowledged),
            "ACKNOWLEDGED" => Ok(Self::Acknowledged),
            "RESOLVED" => Ok(Self::Resolved),
            _ => Err(CoreError::validation(format!("unknown alert status: {s}"))),
        }
    }
}

/// Alert severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertPriority {
    High,
    Medium,
    Low,
}

impl AlertPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }

    pub fn parse(s: &str) -> CoreResult<Self> {
        match s {
            "HIGH" => Ok(Self::High),
            "MEDIUM" => Ok(Self::Medium),
            "LOW" => Ok(Self::Low),
            _ => Err(CoreError::validation(format!(
                "unknown alert priority: {s}"
            ))),
        }
    }
}

/// Notification priority. Lower number wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationPriority {
    Urgent,
    High,
    Normal,
}

impl NotificationPriority {
    /// Numeric class used in queue scores: 1=urgent, 2=high, 3=normal.
    pub fn class(&self) -> i64 {
        match self {
            Self::Urgent => 1,
            Self::High => 2,
            Self::Normal => 3,
        }
    }

    pub fn from_class(n: i64) -> CoreResult<Self> {
        match n {
            1 => Ok(Self::Urgent),
            2 => Ok(Self::High),
            3 => Ok(Self::Normal),
            _ => Err(CoreError::validation(format!(
                "unknown notification priority class: {n}"
            ))),
        }
    }

    /// Urgent notifications bypass quiet hours.
    pub fn bypasses_quiet_hours(&self) -> bool {
        matches!(self, Self::Urgent)
    }
}

/// Delivery outcome of a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }
}

/// Worker account status; `DISABLED` is the audited terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    Active,
    Disabled,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Disabled => "DISABLED",
        }
    }
}

/// Whether a worker has bound their small-client identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BindState {
    Unbound,
    Bound,
}

/// Reason codes for a gate deny decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateDenyReason {
    /// A grant exists but has not reached the provider yet
    SyncPending,
    /// The worker is not on any active daily ticket today
    NotInTicket,
    /// Training for today's ticket is not completed
    TrainingIncomplete,
    /// The area is not covered by the worker's ticket
    AreaNotAllowed,
    /// The grant window does not cover the current time
    OutOfTimeWindow,
}

impl GateDenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SyncPending => "SYNC_PENDING",
            Self::NotInTicket => "NOT_IN_TICKET",
            Self::TrainingIncomplete => "TRAINING_INCOMPLETE",
            Self::AreaNotAllowed => "AREA_NOT_ALLOWED",
            Self::OutOfTimeWindow => "OUT_OF_TIME_WINDOW",
        }
    }
}

/// Well-known alert types emitted by detectors and reconciliation.
pub mod alert_types {
    /// Grant retries exhausted or provider rejected permanently
    pub const SYNC_FAILED: &str = "SYNC_FAILED";
    /// Grant stuck in a pre-active state beyond the threshold
    pub const SYNC_STUCK: &str = "SYNC_STUCK";
    /// Provider-side grant set diverges from the expected set
    pub const ACCESS_MISMATCH: &str = "ACCESS_MISMATCH";
    /// Gate event with no matching active grant
    pub const UNAUTHORIZED_ACCESS: &str = "UNAUTHORIZED_ACCESS";
    /// Active grant saw no successful entry during its window
    pub const GRANT_UNUSED: &str = "GRANT_UNUSED";
    /// A training session ended in failure
    pub const TRAINING_FAILED: &str = "TRAINING_FAILED";
    /// A permit was terminated before completion
    pub const PERMIT_TERMINATED: &str = "PERMIT_TERMINATED";
}

/// Well-known notification types. Provider template ids are looked up in the
/// configuration table, not here.
pub mod notification_types {
    /// A permit covering the worker was approved
    pub const TRAINING_REQUIRED: &str = "TRAINING_REQUIRED";
    /// The worker's training session failed
    pub const TRAINING_FAILED: &str = "TRAINING_FAILED";
    /// The worker's access grant became active
    pub const ACCESS_READY: &str = "ACCESS_READY";
    /// A permit covering the worker changed
    pub const TICKET_CHANGED: &str = "TICKET_CHANGED";
    /// A permit covering the worker was terminated
    pub const TICKET_TERMINATED: &str = "TICKET_TERMINATED";
}
