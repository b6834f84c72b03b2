//! Recurrence use-case services.
//!
//! # Responsibility
//! - Decide satisfaction of pattern periods against persisted events.
//! - Synthesize persisted instances and transient virtual projections.
//! - Keep callers decoupled from storage details via repository traits.
//!
//! # Invariants
//! - Services never bypass repository validation or instance caps.
//! - Calculation errors are deterministic and never retried here.

use crate::calendar::{CalendarError, PeriodKey};
use crate::model::event::InvalidVirtualEventId;
use crate::model::pattern::{Frequency, PatternId, PatternValidationError, UnknownFrequency};
use crate::repo::RepoError;
use thiserror::Error;

pub mod instance_service;
pub mod pattern_service;
pub mod satisfaction;
pub mod virtual_events;

pub type RecurrenceResult<T> = Result<T, RecurrenceError>;

/// Error taxonomy surfaced to engine callers.
#[derive(Debug, Error)]
pub enum RecurrenceError {
    /// Frequency-specific configuration cannot produce a date.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Validation(#[from] PatternValidationError),
    #[error("frequency `{0}` has no period key")]
    UnsupportedFrequency(Frequency),
    #[error("`{operation}` is not supported for {frequency} patterns")]
    UnsupportedOperation {
        operation: &'static str,
        frequency: Frequency,
    },
    #[error("occurrence {occurrence} requested but {year}-{month:02} has only {available}")]
    OutOfRange {
        year: i32,
        month: u32,
        occurrence: i8,
        available: usize,
    },
    #[error("no matching weekday found in {year}-{month:02}")]
    NoMatch { year: i32, month: u32 },
    #[error("period key `{key}` is not a valid {frequency} key")]
    Parse { key: String, frequency: Frequency },
    /// The period already holds its instance limit.
    #[error("pattern {pattern_id} already has its instances for period {period_key}")]
    Conflict {
        pattern_id: PatternId,
        period_key: PeriodKey,
    },
    #[error("pattern not found or inactive: {0}")]
    NotFound(PatternId),
    #[error(transparent)]
    UnknownFrequency(#[from] UnknownFrequency),
    #[error(transparent)]
    InvalidVirtualEventId(#[from] InvalidVirtualEventId),
    #[error(transparent)]
    Repo(RepoError),
}

impl RecurrenceError {
    /// HTTP status a request handler should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Configuration(_)
            | Self::Validation(_)
            | Self::UnsupportedFrequency(_)
            | Self::UnsupportedOperation { .. }
            | Self::OutOfRange { .. }
            | Self::NoMatch { .. }
            | Self::Parse { .. }
            | Self::UnknownFrequency(_)
            | Self::InvalidVirtualEventId(_) => 400,
            Self::NotFound(_) => 404,
            Self::Conflict { .. } => 409,
            Self::Repo(_) => 500,
        }
    }

    /// Whether this is the benign outcome of a concurrent duplicate write.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<CalendarError> for RecurrenceError {
    fn from(value: CalendarError) -> Self {
        match value {
            CalendarError::OutOfRange {
                year,
                month,
                occurrence,
                available,
            } => Self::OutOfRange {
                year,
                month,
                occurrence,
                available,
            },
            CalendarError::NoMatch { year, month } => Self::NoMatch { year, month },
            CalendarError::UnsupportedFrequency(frequency) => Self::UnsupportedFrequency(frequency),
            CalendarError::Parse { key, frequency } => Self::Parse { key, frequency },
            err @ CalendarError::InvalidDate { .. } => Self::Configuration(err.to_string()),
        }
    }
}

impl From<RepoError> for RecurrenceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Conflict {
                pattern_id,
                period_key,
            } => Self::Conflict {
                pattern_id,
                period_key,
            },
            RepoError::PatternNotFound(pattern_id) => Self::NotFound(pattern_id),
            RepoError::PatternValidation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}
