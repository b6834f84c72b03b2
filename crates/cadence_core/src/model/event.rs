//! Persisted events and transient virtual projections.
//!
//! # Responsibility
//! - Define the stored occurrence record (`Event`).
//! - Define the never-persisted projection of an unsatisfied period
//!   (`VirtualEvent`) and its deterministic identity.
//!
//! # Invariants
//! - `period_key` is only set together with `pattern_id`.
//! - Nesting is one level deep: a child event's parent has no parent.
//! - A virtual event ID is a pure function of `(pattern_id, period_key)`.

use crate::calendar::PeriodKey;
use crate::model::pattern::PatternId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub type EventId = Uuid;

const VIRTUAL_ID_PREFIX: &str = "virtual-";
const UUID_TEXT_LEN: usize = 36;

/// Validation errors for persisted events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventValidationError {
    #[error("event title must not be blank")]
    EmptyTitle,
    #[error("event duration must be at least one minute")]
    ZeroDuration,
    #[error("period key requires a pattern reference")]
    PeriodKeyWithoutPattern,
    #[error("event cannot be its own parent")]
    SelfParent,
}

/// Stored occurrence, either ad-hoc or generated from a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub title: String,
    /// `None` means unscheduled (backlog).
    pub start_time: Option<DateTime<Utc>>,
    pub duration_minutes: u32,
    pub parent_event_id: Option<EventId>,
    pub pattern_id: Option<PatternId>,
    pub period_key: Option<PeriodKey>,
    pub category: Option<String>,
    pub is_time_bound: bool,
    pub deadline: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Creates an unscheduled, standalone event with a generated ID.
    pub fn new(title: impl Into<String>, duration_minutes: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            start_time: None,
            duration_minutes,
            parent_event_id: None,
            pattern_id: None,
            period_key: None,
            category: None,
            is_time_bound: false,
            deadline: None,
            notes: None,
            created_at: now,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.start_time.is_some()
    }

    /// Returns the scheduled end instant, if scheduled.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
            .map(|start| start + Duration::minutes(i64::from(self.duration_minutes)))
    }

    pub fn validate(&self) -> Result<(), EventValidationError> {
        if self.title.trim().is_empty() {
            return Err(EventValidationError::EmptyTitle);
        }
        if self.duration_minutes == 0 {
            return Err(EventValidationError::ZeroDuration);
        }
        if self.period_key.is_some() && self.pattern_id.is_none() {
            return Err(EventValidationError::PeriodKeyWithoutPattern);
        }
        if self.parent_event_id == Some(self.id) {
            return Err(EventValidationError::SelfParent);
        }
        Ok(())
    }
}

/// Deterministic identity of a virtual event: `virtual-{patternId}-{periodKey}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualEventId {
    pub pattern_id: PatternId,
    pub period_key: PeriodKey,
}

impl VirtualEventId {
    pub fn new(pattern_id: PatternId, period_key: PeriodKey) -> Self {
        Self {
            pattern_id,
            period_key,
        }
    }
}

impl Display for VirtualEventId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{VIRTUAL_ID_PREFIX}{}-{}",
            self.pattern_id, self.period_key
        )
    }
}

/// Error for strings that are not virtual event IDs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid virtual event id `{0}`")]
pub struct InvalidVirtualEventId(pub String);

impl FromStr for VirtualEventId {
    type Err = InvalidVirtualEventId;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidVirtualEventId(value.to_string());
        let rest = value.strip_prefix(VIRTUAL_ID_PREFIX).ok_or_else(invalid)?;
        let uuid_text = rest.get(..UUID_TEXT_LEN).ok_or_else(invalid)?;
        let pattern_id = Uuid::parse_str(uuid_text).map_err(|_| invalid())?;
        let period_key = rest
            .get(UUID_TEXT_LEN..)
            .and_then(|tail| tail.strip_prefix('-'))
            .filter(|key| !key.is_empty())
            .ok_or_else(invalid)?;
        Ok(Self::new(pattern_id, PeriodKey::new(period_key)))
    }
}

impl Serialize for VirtualEventId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VirtualEventId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Transient projection of an unsatisfied pattern period.
///
/// Recomputed on every range query and never written to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualEvent {
    pub id: VirtualEventId,
    pub title: String,
    pub duration_minutes: u32,
    pub pattern_id: PatternId,
    pub period_key: PeriodKey,
    pub category: String,
    pub is_flexible: bool,
    /// End of the period this projection belongs to.
    pub deadline: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Calendar listing item: a stored event or a virtual projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalendarEntry {
    Persisted(Event),
    Virtual(VirtualEvent),
}

impl CalendarEntry {
    pub fn title(&self) -> &str {
        match self {
            Self::Persisted(event) => &event.title,
            Self::Virtual(event) => &event.title,
        }
    }

    pub fn pattern_id(&self) -> Option<PatternId> {
        match self {
            Self::Persisted(event) => event.pattern_id,
            Self::Virtual(event) => Some(event.pattern_id),
        }
    }

    /// Instant used to order entries: start time, else deadline.
    pub fn sort_instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Persisted(event) => event.start_time.or(event.deadline),
            Self::Virtual(event) => Some(event.deadline),
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, Self::Virtual(_))
    }
}
