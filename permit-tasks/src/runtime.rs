//! Loop scheduling.
//!
//! Owns the tokio tasks behind the background loops and a shared shutdown
//! signal. Each loop ticks on its own interval and exits when the signal
//! flips; `shutdown` waits for all of them to drain their current pass.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::warn;

use permit_core::SiteId;

use crate::notifier::Notifier;
use crate::reconcile::Reconciler;
use crate::sweeper::Sweeper;
use crate::sync::SyncDrainer;

/// Tick intervals and batch sizes of the loops.
#[derive(Clone, Debug)]
pub struct TaskRuntimeConfig {
    pub sync_interval_secs: u64,
    pub outbox_interval_secs: u64,
    pub notify_interval_secs: u64,
    pub sweep_interval_secs: u64,
    pub reconcile_interval_secs: u64,
    pub sync_batch: usize,
    pub outbox_batch: usize,
}

impl Default for TaskRuntimeConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: 5,
            outbox_interval_secs: 5,
            notify_interval_secs: 5,
            sweep_interval_secs: 30,
            reconcile_interval_secs: 300,
            sync_batch: 50,
            outbox_batch: 100,
        }
    }
}

/// Handle over the running loops.
pub struct TaskRuntime {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

macro_rules! spawn_loop {
    ($handles:expr, $shutdown:expr, $secs:expr, $body:expr) => {{
        let mut rx = $shutdown.subscribe();
        let mut ticker = interval(Duration::from_secs($secs));
        $handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ticker.tick() => { $body.await },
                    _ = rx.changed() => break,
                }
            }
        }));
    }};
}

impl TaskRuntime {
    /// Spawn every loop. `sites` scopes the reconciliation passes.
    pub fn start(
        config: TaskRuntimeConfig,
        drainer: Arc<SyncDrainer>,
        notifier: Arc<Notifier>,
        sweeper: Arc<Sweeper>,
        reconciler: Arc<Reconciler>,
        sites: Vec<SiteId>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let mut handles = Vec::new();

        {
            let drainer = drainer.clone();
            let batch = config.sync_batch;
            spawn_loop!(handles, shutdown, config.sync_interval_secs, async {
                if let Err(err) = drainer.drain(batch, Utc::now()).await {
                    warn!(error = %err, "Sync drain pass failed");
                }
            });
        }
        {
            let batch = config.outbox_batch;
            spawn_loop!(handles, shutdown, config.outbox_interval_secs, async {
                if let Err(err) = drainer.dispatch_outbox(batch, Utc::now()).await {
                    warn!(error = %err, "Outbox dispatch pass failed");
                }
            });
        }
        spawn_loop!(handles, shutdown, config.notify_interval_secs, async {
            if let Err(err) = notifier.run_once(Utc::now()).await {
                warn!(error = %err, "Notification drain pass failed");
            }
        });
        spawn_loop!(handles, shutdown, config.sweep_interval_secs, async {
            if let Err(err) = sweeper.run_once(Utc::now()).await {
                warn!(error = %err, "Sweep pass failed");
            }
        });
        spawn_loop!(handles, shutdown, config.reconcile_interval_secs, async {
            let now = Utc::now();
            if let Err(err) = reconciler.flag_stuck(now).await {
                warn!(error = %err, "Stuck-grant pass failed");
            }
            for site_id in &sites {
                if let Err(err) = reconciler.reconcile_site(site_id, now).await {
                    warn!(site_id = %site_id, error = %err, "Reconcile pass failed");
                }
                let from = now - ChronoDuration::hours(24);
                if let Err(err) = reconciler.audit_events(site_id, from, now, now).await {
                    warn!(site_id = %site_id, error = %err, "Event audit pass failed");
                }
            }
        });

        Self { shutdown, handles }
    }

    /// Signal the loops and wait for them to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}
