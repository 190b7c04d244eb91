//! Training domain logic.
//!
//! Pure, storage-free building blocks of the training engine: progress
//! validation with anti-cheating rules, and random identity-check
//! scheduling. The stateful session service in the store crate drives
//! these against persisted sessions.

pub mod progress;
pub mod random_check;

pub use progress::{
    FailReason, HeartbeatVerdict, IntervalSet, ProgressState, ProgressValidator, SuspiciousKind,
};
pub use random_check::{CheckState, PendingCheck, RandomCheckPolicy};
