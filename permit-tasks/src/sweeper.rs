//! Periodic sweep: training session expiry and the day boundary.
//!
//! Training sessions whose heartbeat went silent are expired on every pass.
//! The first pass of a new calendar day closes the previous day's tickets
//! (expiring their grants) and opens the new day's.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use tracing::info;

use permit_core::logging::operations;
use permit_core::CoreResult;
use permit_store::services::{PermitService, TrainingService};

/// Outcome of one sweep pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Training sessions expired for a silent heartbeat
    pub expired_sessions: usize,
    /// Daily tickets opened at day start
    pub tickets_opened: usize,
    /// Daily tickets closed at day end
    pub tickets_closed: usize,
}

/// The sweeper.
pub struct Sweeper {
    training: Arc<TrainingService>,
    permits: Arc<PermitService>,
    last_day: Mutex<Option<NaiveDate>>,
}

impl Sweeper {
    pub fn new(training: Arc<TrainingService>, permits: Arc<PermitService>) -> Self {
        Self {
            training,
            permits,
            last_day: Mutex::new(None),
        }
    }

    /// Expire silent sessions and roll the day boundary when crossed.
    pub async fn run_once(&self, now: DateTime<Utc>) -> CoreResult<SweepReport> {
        let mut report = SweepReport {
            expired_sessions: self.training.sweep(now).await?,
            ..Default::default()
        };

        let today = now.date_naive();
        let mut last = self.last_day.lock().await;
        match *last {
            Some(prev) if prev == today => {}
            Some(prev) => {
                report.tickets_closed = self.permits.day_end(prev, now).await?;
                report.tickets_opened = self.permits.day_start(today, now).await?;
                *last = Some(today);
                info!(
                    operation = operations::DAY_START,
                    opened = report.tickets_opened,
                    closed = report.tickets_closed,
                    "Day boundary rolled"
                );
            }
            None => {
                report.tickets_opened = self.permits.day_start(today, now).await?;
                *last = Some(today);
            }
        }
        Ok(report)
    }
}
