//! Executes one due item against its publish target.
//!
//! Execution failures never escape as errors: they are absorbed into item
//! state (retry count, backoff, error history) so one failing item cannot
//! abort a polling pass. Only store and validation faults surface as `Err`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pressroom_core::{PublishResolver, PublishTarget};
use tracing::{info, warn};

use crate::error::Result;
use crate::store::ScheduleStore;
use crate::types::{ScheduleStatus, ScheduledItem};

/// What a single dispatch attempt did to the item — data, not control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// `publish()` succeeded and the schedule is exhausted.
    Completed,
    /// `publish()` succeeded and the item stays pending for its next
    /// occurrence.
    Rescheduled { next_execution: DateTime<Utc> },
    /// `publish()` failed; a retry is scheduled after backoff.
    Retrying {
        error: String,
        next_execution: DateTime<Utc>,
    },
    /// `publish()` failed and the retry budget is spent; the item is
    /// abandoned as `Failed`.
    Abandoned { error: String },
    /// The item was not pending or not yet due; nothing happened.
    Skipped,
}

/// Resolves targets, invokes `publish()` under a timeout, and records the
/// outcome through the item's state machine. Exactly one attempt per call;
/// retries happen on a later polling pass.
pub struct Dispatcher {
    store: Arc<dyn ScheduleStore>,
    resolver: Arc<dyn PublishResolver>,
    /// Ceiling on one `publish()` call so a slow target cannot stall the
    /// polling cycle.
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        resolver: Arc<dyn PublishResolver>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            resolver,
            timeout,
        }
    }

    /// Execute `item` at `now` and persist the resulting transition.
    pub async fn execute(
        &self,
        item: &mut ScheduledItem,
        now: DateTime<Utc>,
    ) -> Result<ExecutionOutcome> {
        if !item.is_due(now) {
            return Ok(ExecutionOutcome::Skipped);
        }

        match self.attempt(&item.target).await {
            Ok(()) => {
                item.mark_completed(now)?;
                self.store.save(item)?;
                match (item.status, item.next_execution) {
                    (ScheduleStatus::Pending, Some(next)) => {
                        info!(
                            item_id = %item.id, target = %item.target, %next,
                            "published; rescheduled"
                        );
                        Ok(ExecutionOutcome::Rescheduled {
                            next_execution: next,
                        })
                    }
                    _ => {
                        info!(
                            item_id = %item.id, target = %item.target,
                            "published; schedule complete"
                        );
                        Ok(ExecutionOutcome::Completed)
                    }
                }
            }
            Err(error) => {
                item.mark_failed(now, &error)?;
                self.store.save(item)?;
                match (item.status, item.next_execution) {
                    (ScheduleStatus::Pending, Some(next)) => {
                        warn!(
                            item_id = %item.id, target = %item.target,
                            retry = item.retry_count, %next, %error,
                            "publish failed; retry scheduled"
                        );
                        Ok(ExecutionOutcome::Retrying {
                            error,
                            next_execution: next,
                        })
                    }
                    _ => {
                        warn!(
                            item_id = %item.id, target = %item.target, %error,
                            "publish failed; retries exhausted, item abandoned"
                        );
                        Ok(ExecutionOutcome::Abandoned { error })
                    }
                }
            }
        }
    }

    /// One resolution + publish attempt. Unresolvable targets and timeouts
    /// are ordinary execution failures.
    async fn attempt(&self, target: &PublishTarget) -> std::result::Result<(), String> {
        let Some(publishable) = self.resolver.resolve(target).await else {
            return Err(format!("target {target} could not be resolved"));
        };

        match tokio::time::timeout(self.timeout, publishable.publish()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "publish timed out after {}s",
                self.timeout.as_secs()
            )),
        }
    }
}
