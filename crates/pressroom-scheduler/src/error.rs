use pressroom_core::TargetRefError;
use thiserror::Error;

/// Errors that can occur within the scheduling subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Metadata / error-history (de)serialisation failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The item violates a construction or save-time invariant.
    /// Surfaced synchronously to the caller; never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No scheduled item with the given ID exists in the store.
    #[error("Scheduled item not found: {id}")]
    ItemNotFound { id: String },

    /// A persisted row no longer parses (bad timestamp, unknown enum value).
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

impl From<TargetRefError> for SchedulerError {
    fn from(e: TargetRefError) -> Self {
        SchedulerError::Validation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
