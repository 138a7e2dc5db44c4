use chrono::{DateTime, Utc};
use pressroom_core::PublishTarget;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SchedulerError};
use crate::recurrence::next_occurrence;
use crate::retry::backoff;

/// Default cap on consecutive retry attempts before an item is abandoned.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Error history is kept to the most recent entries; the full failure trail
/// belongs in logs, not in the row.
pub const MAX_ERROR_HISTORY: usize = 25;

/// How often a scheduled item repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleFrequency {
    Once,
    Daily,
    Weekly,
    Monthly,
}

impl std::fmt::Display for ScheduleFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScheduleFrequency::Once => "once",
            ScheduleFrequency::Daily => "daily",
            ScheduleFrequency::Weekly => "weekly",
            ScheduleFrequency::Monthly => "monthly",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ScheduleFrequency {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "once" => Ok(ScheduleFrequency::Once),
            "daily" => Ok(ScheduleFrequency::Daily),
            "weekly" => Ok(ScheduleFrequency::Weekly),
            "monthly" => Ok(ScheduleFrequency::Monthly),
            other => Err(SchedulerError::Validation(format!(
                "unsupported frequency: {other}"
            ))),
        }
    }
}

/// Lifecycle state of a scheduled item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    /// Waiting for its next execution time.
    Pending,
    /// Finished successfully (terminal).
    Completed,
    /// Abandoned after exhausting retries (terminal).
    Failed,
    /// Cancelled by the caller (terminal).
    Cancelled,
}

impl ScheduleStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ScheduleStatus::Pending)
    }
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::Completed => "completed",
            ScheduleStatus::Failed => "failed",
            ScheduleStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ScheduleStatus {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ScheduleStatus::Pending),
            "completed" => Ok(ScheduleStatus::Completed),
            "failed" => Ok(ScheduleStatus::Failed),
            "cancelled" => Ok(ScheduleStatus::Cancelled),
            other => Err(SchedulerError::Validation(format!(
                "invalid status: {other}"
            ))),
        }
    }
}

/// One entry in an item's bounded failure trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// One scheduling intent: publish one content item at `scheduled_time`,
/// optionally recurring, with retry-on-failure bookkeeping.
///
/// All state transitions go through [`mark_completed`](Self::mark_completed),
/// [`mark_failed`](Self::mark_failed), [`cancel`](Self::cancel) and
/// [`retry`](Self::retry); once the status is terminal every further
/// transition is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledItem {
    /// UUID v4 string — primary key.
    pub id: String,
    /// The single content item this schedule publishes.
    pub target: PublishTarget,
    /// Original anchor instant requested by the caller. Immutable; recurring
    /// occurrences stay phase-locked to it.
    pub scheduled_time: DateTime<Utc>,
    pub frequency: ScheduleFrequency,
    pub status: ScheduleStatus,
    /// When this item should fire next. `None` once terminal.
    pub next_execution: Option<DateTime<Utc>>,
    /// Most recent execution attempt, success or failure.
    pub last_executed_at: Option<DateTime<Utc>>,
    /// Successful executions so far.
    pub execution_count: u32,
    /// Cap on successful executions for recurring items; `Once` is implicitly
    /// capped at one.
    pub max_executions: Option<u32>,
    /// Consecutive failures since the last success.
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    /// Most recent failures, oldest first, capped at [`MAX_ERROR_HISTORY`].
    pub error_history: Vec<ErrorRecord>,
    /// Caller-supplied context, persisted as JSON.
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledItem {
    /// Create a pending item from the two-column target form. Exactly one of
    /// the references must be set; both or neither is a validation error.
    pub fn new(
        scheduled_time: DateTime<Utc>,
        blog_post_id: Option<String>,
        social_post_id: Option<String>,
    ) -> Result<Self> {
        let target = PublishTarget::from_refs(blog_post_id, social_post_id)?;
        Ok(Self::with_target(target, scheduled_time))
    }

    /// Create a pending item for an already-constructed target.
    pub fn with_target(target: PublishTarget, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            target,
            scheduled_time,
            frequency: ScheduleFrequency::Once,
            status: ScheduleStatus::Pending,
            next_execution: Some(scheduled_time),
            last_executed_at: None,
            execution_count: 0,
            max_executions: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            last_error: None,
            error_history: Vec::new(),
            metadata: serde_json::Map::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_frequency(mut self, frequency: ScheduleFrequency) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_max_executions(mut self, max_executions: u32) -> Self {
        self.max_executions = Some(max_executions);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    // --- predicates --------------------------------------------------------

    pub fn is_pending(&self) -> bool {
        self.status == ScheduleStatus::Pending
    }

    pub fn is_recurring(&self) -> bool {
        self.frequency != ScheduleFrequency::Once
    }

    pub fn is_blog_schedule(&self) -> bool {
        self.target.is_blog()
    }

    pub fn is_social_schedule(&self) -> bool {
        self.target.is_social()
    }

    /// Whether this item should fire at `now`: pending, and its
    /// `next_execution` (or the original `scheduled_time` when no next
    /// execution was ever computed) has passed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_pending()
            && match self.next_execution {
                Some(next) => next <= now,
                None => self.scheduled_time <= now,
            }
    }

    pub fn can_retry(&self) -> bool {
        !matches!(
            self.status,
            ScheduleStatus::Completed | ScheduleStatus::Cancelled
        ) && self.retry_count < self.max_retries
    }

    // --- state transitions -------------------------------------------------

    /// Record a successful execution at `now`.
    ///
    /// Recurring items with executions remaining stay pending and get a new
    /// `next_execution` from the recurrence calculator (catch-up semantics);
    /// everything else becomes `Completed`.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_pending("mark completed")?;

        self.last_executed_at = Some(now);
        self.execution_count += 1;
        self.retry_count = 0;

        let executions_remain = self
            .max_executions
            .map_or(true, |max| self.execution_count < max);

        if self.is_recurring() && executions_remain {
            match next_occurrence(self.scheduled_time, self.frequency, now) {
                Some(next) => {
                    self.next_execution = Some(next);
                    self.status = ScheduleStatus::Pending;
                }
                None => {
                    self.status = ScheduleStatus::Completed;
                    self.next_execution = None;
                }
            }
        } else {
            self.status = ScheduleStatus::Completed;
            self.next_execution = None;
        }
        Ok(())
    }

    /// Record a failed execution at `now`.
    ///
    /// While retries remain the item stays pending with `next_execution`
    /// pushed out by exponential backoff; once the consecutive-failure count
    /// exceeds `max_retries` the item is abandoned as `Failed`.
    pub fn mark_failed(&mut self, now: DateTime<Utc>, error: &str) -> Result<()> {
        self.ensure_pending("mark failed")?;

        self.last_executed_at = Some(now);
        self.retry_count += 1;
        self.last_error = Some(error.to_string());
        self.error_history.push(ErrorRecord {
            at: now,
            message: error.to_string(),
        });
        if self.error_history.len() > MAX_ERROR_HISTORY {
            let excess = self.error_history.len() - MAX_ERROR_HISTORY;
            self.error_history.drain(..excess);
        }

        if self.retry_count <= self.max_retries {
            self.next_execution = Some(now + backoff(self.retry_count));
            self.status = ScheduleStatus::Pending;
        } else {
            self.status = ScheduleStatus::Failed;
            self.next_execution = None;
        }
        Ok(())
    }

    /// Cancel a pending item. Cancelling a terminal item is an error.
    pub fn cancel(&mut self) -> Result<()> {
        self.ensure_pending("cancel")?;
        self.status = ScheduleStatus::Cancelled;
        self.next_execution = None;
        Ok(())
    }

    /// Administratively re-arm an item for another attempt with backoff.
    /// Rejected once the item is completed or cancelled, or when its retry
    /// budget is spent.
    pub fn retry(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !self.can_retry() {
            return Err(SchedulerError::Validation(format!(
                "item {} cannot be retried (status {}, {}/{} retries used)",
                self.id, self.status, self.retry_count, self.max_retries
            )));
        }
        self.status = ScheduleStatus::Pending;
        self.next_execution = Some(now + backoff(self.retry_count + 1));
        Ok(())
    }

    fn ensure_pending(&self, action: &str) -> Result<()> {
        if self.status.is_terminal() {
            return Err(SchedulerError::Validation(format!(
                "cannot {action}: item {} is already {}",
                self.id, self.status
            )));
        }
        Ok(())
    }
}
