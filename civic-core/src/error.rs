//! Error types for the CIVIC simulation core.

use chrono::NaiveDate;
use thiserror::Error;

use crate::citizen::HouseholdId;

/// Top-level error type for all core operations.
///
/// Nothing in the tick loop propagates these to the process boundary: the
/// simulation logs them and carries on with the next citizen, household or
/// conversation.
#[derive(Error, Debug)]
pub enum CivicError {
    /// A household with the given ID does not exist.
    #[error("Household not found: {0}")]
    HouseholdNotFound(HouseholdId),

    /// A birth was requested for a household that does not qualify.
    #[error("Household {household} is not eligible for a birth: {reason}")]
    BirthIneligible {
        /// The household that was checked.
        household: HouseholdId,
        /// Why the check failed.
        reason: String,
    },

    /// The textual city map could not be parsed.
    #[error("Invalid city map at row {row}: {reason}")]
    MapParse {
        /// Zero-based row index.
        row: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// Advancing the clock would run past the last representable date.
    #[error("Simulated date overflow: cannot add {days} days to {from}")]
    DateOverflow {
        /// Date before the advance.
        from: NaiveDate,
        /// Whole days that were to be added.
        days: u64,
    },

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The conversation worker pool could not be started.
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, CivicError>;
