//! Calendar arithmetic used by the recurrence engine.
//!
//! # Responsibility
//! - Resolve nth/last weekday occurrences inside a month.
//! - Map dates to canonical period keys and period keys back to bounds.
//!
//! # Invariants
//! - Every function here is pure: no clock reads, no storage access.
//! - Weeks follow ISO-8601 (Monday start, week 1 contains January 4).
//! - Period ends are inclusive and expressed as `23:59:59` UTC.

use crate::model::pattern::Frequency;
use thiserror::Error;

pub mod nth_weekday;
pub mod period;

pub use nth_weekday::{days_in_month, nth_weekday, LAST_OCCURRENCE};
pub use period::{
    period_bounds, period_end, period_key, period_start, periods_overlapping, PeriodKey,
};

pub type CalendarResult<T> = Result<T, CalendarError>;

/// Failures of pure calendar computations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarError {
    /// Requested weekday occurrence does not exist in the month.
    #[error("occurrence {occurrence} requested but month {year}-{month:02} has only {available}")]
    OutOfRange {
        year: i32,
        month: u32,
        occurrence: i8,
        available: usize,
    },
    /// The month contains no date for the weekday (invalid month input).
    #[error("no matching weekday found in {year}-{month:02}")]
    NoMatch { year: i32, month: u32 },
    /// Frequency has no bucket-based period identity.
    #[error("frequency `{0}` has no period key")]
    UnsupportedFrequency(Frequency),
    /// Period key does not match the format expected for the frequency.
    #[error("period key `{key}` is not a valid {frequency} key")]
    Parse { key: String, frequency: Frequency },
    /// Year/month/day combination cannot be represented.
    #[error("invalid calendar date {year}-{month:02}-{day:02}")]
    InvalidDate { year: i32, month: u32, day: u32 },
}
