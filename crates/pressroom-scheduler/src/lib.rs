//! `pressroom-scheduler` — publish scheduling engine with SQLite persistence.
//!
//! # Overview
//!
//! Scheduled publications are persisted to a SQLite `scheduled_items` table.
//! The [`engine::SchedulerLoop`] polls the store, and every due item is run
//! through the [`dispatcher::Dispatcher`], which resolves the item's publish
//! target, invokes `publish()` under a timeout, and records the outcome via
//! the item's state machine.
//!
//! # Frequency variants
//!
//! | Variant   | Behaviour                                                |
//! |-----------|----------------------------------------------------------|
//! | `Once`    | Single fire at the scheduled instant                     |
//! | `Daily`   | Repeat daily, phase-locked to the anchor's time-of-day   |
//! | `Weekly`  | Repeat weekly, preserving the anchor's day-of-week       |
//! | `Monthly` | Repeat monthly, clamping short months (Jan 31 → Feb 28)  |
//!
//! Recurrence is catch-up, not backlog: occurrences missed while the engine
//! was offline are skipped, and the next fire lands strictly after now while
//! keeping the anchor's phase. Failures retry with exponential backoff
//! (5 min doubling) until `max_retries` consecutive attempts are spent.

pub mod db;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod recurrence;
pub mod retry;
pub mod store;
pub mod types;

pub use dispatcher::{Dispatcher, ExecutionOutcome};
pub use engine::{ExecutionRecord, SchedulerLoop};
pub use error::{Result, SchedulerError};
pub use store::{ScheduleStore, SqliteScheduleStore};
pub use types::{ErrorRecord, ScheduleFrequency, ScheduleStatus, ScheduledItem};
