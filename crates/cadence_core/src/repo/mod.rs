//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the storage contracts the recurrence engine consumes.
//! - Isolate SQLite query details from service orchestration.
//! - Provide an in-memory store with identical semantics.
//!
//! # Invariants
//! - Write paths validate models before persistence.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Exceeding a period's instance limit surfaces as `RepoError::Conflict`.

use crate::calendar::PeriodKey;
use crate::db::DbError;
use crate::model::event::{EventId, EventValidationError};
use crate::model::pattern::{PatternId, PatternValidationError};
use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod event_repo;
pub mod memory;
pub mod pattern_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for pattern and event persistence.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    PatternValidation(#[from] PatternValidationError),
    #[error(transparent)]
    EventValidation(#[from] EventValidationError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("pattern not found: {0}")]
    PatternNotFound(PatternId),
    #[error("event not found: {0}")]
    EventNotFound(EventId),
    #[error("period {period_key} of pattern {pattern_id} already holds its instance limit")]
    Conflict {
        pattern_id: PatternId,
        period_key: PeriodKey,
    },
    #[error("event {0} is a child event and cannot have children")]
    NestingTooDeep(EventId),
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}

pub(crate) fn int_to_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

pub(crate) fn from_epoch_ms(value: i64, column: &str) -> RepoResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid timestamp `{value}` in {column}"))
    })
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<uuid::Uuid> {
    uuid::Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}
