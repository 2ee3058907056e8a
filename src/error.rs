//! Validation errors raised when constructing engine inputs

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Malformed input rejected at construction time.
///
/// Missing reference data (no timezone, no rules, no observations) is never
/// an error; it is resolved by the fallbacks in [`crate::engine`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("unknown status {0:?} (expected \"active\" or \"inactive\")")]
    UnknownStatus(String),

    #[error("weekday {0} out of range (expected 0=Monday..6=Sunday)")]
    WeekdayOutOfRange(u32),

    #[error("interval start {start} is after end {end}")]
    InvertedInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("observation at {next} precedes earlier observation at {prev}")]
    OutOfOrder {
        prev: DateTime<Utc>,
        next: DateTime<Utc>,
    },

    #[error("store {store_id} already assigned timezone {existing}, refusing {rejected}")]
    ConflictingTimezone {
        store_id: String,
        existing: String,
        rejected: String,
    },

    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("timestamp {0} outside the supported years 1 to 9999")]
    TimestampOutOfRange(DateTime<Utc>),

    #[error("invalid local time {0:?} (expected HH:MM or HH:MM:SS)")]
    InvalidLocalTime(String),
}

/// Why one store is missing from a report
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// The worker computing this store's chunk panicked or was cancelled
    #[error("report worker aborted: {0}")]
    Aborted(String),
}
