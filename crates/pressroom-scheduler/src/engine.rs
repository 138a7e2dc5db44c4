//! The polling loop that drives due items through the dispatcher.
//!
//! One `SchedulerLoop` value is owned by the process composition root — there
//! are no ambient singletons — and the deployment assumption is a single
//! active loop per store. Running several loops against the same database
//! without an external claim mechanism can dispatch the same due item twice.

use std::sync::Arc;

use chrono::Utc;
use pressroom_core::{PublishResolver, PublishTarget, SchedulerConfig};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::dispatcher::{Dispatcher, ExecutionOutcome};
use crate::store::ScheduleStore;

/// Outcome notification forwarded to observers after each dispatch.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub item_id: String,
    pub target: PublishTarget,
    pub outcome: ExecutionOutcome,
}

/// Periodically fetches due items and feeds them to the dispatcher,
/// sequentially within each pass.
pub struct SchedulerLoop {
    store: Arc<dyn ScheduleStore>,
    dispatcher: Dispatcher,
    config: SchedulerConfig,
    /// If set, a copy of every execution outcome is sent here (non-blocking).
    outcome_tx: Option<mpsc::Sender<ExecutionRecord>>,
}

impl SchedulerLoop {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        resolver: Arc<dyn PublishResolver>,
        config: SchedulerConfig,
        outcome_tx: Option<mpsc::Sender<ExecutionRecord>>,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            store.clone(),
            resolver,
            std::time::Duration::from_secs(config.dispatch_timeout_secs),
        );
        Self {
            store,
            dispatcher,
            config,
            outcome_tx,
        }
    }

    /// Main event loop. Polls until `shutdown` broadcasts `true`.
    ///
    /// Store failures are logged and the loop moves on to the next polling
    /// cycle; one bad row or one unreachable database never crashes the
    /// engine.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.config.poll_interval_secs,
            "publish scheduler started"
        );

        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            self.config.poll_interval_secs.max(1),
        ));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.pass().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("publish scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One polling pass: fetch the due set once, dispatch each item,
    /// isolate per-item failures.
    pub async fn pass(&self) {
        let now = Utc::now();
        let due = match self.store.get_due_items(now) {
            Ok(due) => due,
            Err(e) => {
                error!("due-item query failed: {e}");
                return;
            }
        };

        for mut item in due {
            match self.dispatcher.execute(&mut item, now).await {
                Ok(outcome) => {
                    if let Some(ref tx) = self.outcome_tx {
                        let record = ExecutionRecord {
                            item_id: item.id.clone(),
                            target: item.target.clone(),
                            outcome,
                        };
                        // try_send never blocks the pass; observers that fall
                        // behind just miss records.
                        if tx.try_send(record).is_err() {
                            warn!(item_id = %item.id, "outcome channel full or closed");
                        }
                    }
                }
                Err(e) => {
                    error!(item_id = %item.id, "dispatch failed: {e}");
                }
            }
        }
    }
}
