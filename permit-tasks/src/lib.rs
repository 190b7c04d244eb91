//! Background loops of the work-permit platform.
//!
//! Everything out-of-transaction lives here: draining the grant sync queue
//! against the access-control provider, dispatching staged outbox intents,
//! delivering queued notifications, reconciling local state against the
//! provider, and the periodic sweeps that expire training sessions and roll
//! daily tickets over the day boundary.
//!
//! Each loop is a plain struct with a `run_once`-style method taking the
//! current instant; [`runtime::TaskRuntime`] wires them onto tokio timers
//! with a shared shutdown signal.

pub mod mocks;
pub mod notifier;
pub mod reconcile;
pub mod runtime;
pub mod sweeper;
pub mod sync;

pub use notifier::Notifier;
pub use reconcile::{ReconcileReport, Reconciler};
pub use runtime::{TaskRuntime, TaskRuntimeConfig};
pub use sweeper::{SweepReport, Sweeper};
pub use sync::{SyncDrainer, SyncReport};
