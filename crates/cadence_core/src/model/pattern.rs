//! Recurrence pattern model.
//!
//! # Responsibility
//! - Describe a recurring-obligation template and its recurrence grammar.
//! - Validate frequency-specific configuration before persistence.
//!
//! # Invariants
//! - `recurrence` (and therefore frequency) is immutable after creation.
//! - Only `title`, `duration_minutes` and `active` change through updates.
//! - `start_time` is meaningful only when `flexible_scheduling == false`.

use crate::calendar::LAST_OCCURRENCE;
use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub type PatternId = Uuid;

/// Closed set of recurrence grammars, as named on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Weekly,
    Monthly,
    Yearly,
    EveryNDays,
    NPerPeriod,
    NthWeekdayOfMonth,
}

impl Frequency {
    pub const ALL: [Frequency; 6] = [
        Frequency::Weekly,
        Frequency::Monthly,
        Frequency::Yearly,
        Frequency::EveryNDays,
        Frequency::NPerPeriod,
        Frequency::NthWeekdayOfMonth,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::EveryNDays => "every_n_days",
            Self::NPerPeriod => "n_per_period",
            Self::NthWeekdayOfMonth => "nth_weekday_of_month",
        }
    }

    /// Whether occurrences of this frequency are bucketed by period key.
    pub fn is_period_based(self) -> bool {
        self != Self::EveryNDays
    }
}

impl Display for Frequency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for frequency names outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown frequency `{0}`")]
pub struct UnknownFrequency(pub String);

impl FromStr for Frequency {
    type Err = UnknownFrequency;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|frequency| frequency.as_str() == value)
            .ok_or_else(|| UnknownFrequency(value.to_string()))
    }
}

/// Day selection for yearly patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum YearlyRule {
    /// Fixed month/day; Feb 29 falls back to Feb 28 in common years.
    Date { month: u32, day: u32 },
    /// Nth (or last, `-1`) weekday of a fixed month.
    NthWeekday {
        month: u32,
        weekday: Weekday,
        occurrence: i8,
    },
}

impl YearlyRule {
    pub fn month(&self) -> u32 {
        match *self {
            Self::Date { month, .. } | Self::NthWeekday { month, .. } => month,
        }
    }
}

/// Recurrence grammar together with its frequency-specific configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "frequency")]
pub enum Recurrence {
    Weekly,
    Monthly,
    Yearly { rule: YearlyRule },
    EveryNDays { interval_days: u32 },
    NPerPeriod { target: u32 },
    NthWeekdayOfMonth { weekday: Weekday, occurrence: i8 },
}

impl Recurrence {
    pub fn frequency(&self) -> Frequency {
        match self {
            Self::Weekly => Frequency::Weekly,
            Self::Monthly => Frequency::Monthly,
            Self::Yearly { .. } => Frequency::Yearly,
            Self::EveryNDays { .. } => Frequency::EveryNDays,
            Self::NPerPeriod { .. } => Frequency::NPerPeriod,
            Self::NthWeekdayOfMonth { .. } => Frequency::NthWeekdayOfMonth,
        }
    }

    /// Interval in days for every-n-days, target count for n-per-period,
    /// and `1` for every other frequency.
    pub fn frequency_value(&self) -> u32 {
        match *self {
            Self::EveryNDays { interval_days } => interval_days,
            Self::NPerPeriod { target } => target,
            _ => 1,
        }
    }

    /// Number of persisted instances one period may hold.
    pub fn instances_per_period(&self) -> u32 {
        match *self {
            Self::NPerPeriod { target } => target,
            _ => 1,
        }
    }

    /// Validates the configuration carried by this variant.
    pub fn validate(&self) -> Result<(), PatternValidationError> {
        match *self {
            Self::Weekly | Self::Monthly => Ok(()),
            Self::Yearly {
                rule: YearlyRule::Date { month, day },
            } => {
                validate_month(month)?;
                if !(1..=31).contains(&day) {
                    return Err(PatternValidationError::InvalidDay(day));
                }
                Ok(())
            }
            Self::Yearly {
                rule: YearlyRule::NthWeekday {
                    month, occurrence, ..
                },
            } => {
                validate_month(month)?;
                validate_occurrence(occurrence)
            }
            Self::EveryNDays { interval_days: 0 } | Self::NPerPeriod { target: 0 } => {
                Err(PatternValidationError::ZeroFrequencyValue(self.frequency()))
            }
            Self::EveryNDays { .. } | Self::NPerPeriod { .. } => Ok(()),
            Self::NthWeekdayOfMonth { occurrence, .. } => validate_occurrence(occurrence),
        }
    }
}

fn validate_month(month: u32) -> Result<(), PatternValidationError> {
    if (1..=12).contains(&month) {
        Ok(())
    } else {
        Err(PatternValidationError::InvalidMonth(month))
    }
}

fn validate_occurrence(occurrence: i8) -> Result<(), PatternValidationError> {
    if occurrence == LAST_OCCURRENCE || (1..=4).contains(&occurrence) {
        Ok(())
    } else {
        Err(PatternValidationError::InvalidOccurrence(occurrence))
    }
}

/// Validation errors for recurrence patterns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternValidationError {
    #[error("pattern title must not be blank")]
    EmptyTitle,
    #[error("pattern duration must be at least one minute")]
    ZeroDuration,
    #[error("month must be within 1..=12, got {0}")]
    InvalidMonth(u32),
    #[error("day must be within 1..=31, got {0}")]
    InvalidDay(u32),
    #[error("weekday occurrence must be 1..=4 or -1, got {0}")]
    InvalidOccurrence(i8),
    #[error("{0} patterns need a frequency value of at least 1")]
    ZeroFrequencyValue(Frequency),
}

/// Recurring-obligation template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrencePattern {
    pub id: PatternId,
    pub title: String,
    #[serde(flatten)]
    pub recurrence: Recurrence,
    pub duration_minutes: u32,
    /// `true` leaves generated occurrences unscheduled (backlog).
    pub flexible_scheduling: bool,
    /// Time of day for inflexible patterns; the engine default applies when unset.
    pub start_time: Option<NaiveTime>,
    pub notes: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurrencePattern {
    /// Creates an active, flexible pattern with a generated ID.
    pub fn new(
        title: impl Into<String>,
        recurrence: Recurrence,
        duration_minutes: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            recurrence,
            duration_minutes,
            flexible_scheduling: true,
            start_time: None,
            notes: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn frequency(&self) -> Frequency {
        self.recurrence.frequency()
    }

    pub fn frequency_value(&self) -> u32 {
        self.recurrence.frequency_value()
    }

    /// Checks title, duration and recurrence configuration.
    pub fn validate(&self) -> Result<(), PatternValidationError> {
        if self.title.trim().is_empty() {
            return Err(PatternValidationError::EmptyTitle);
        }
        if self.duration_minutes == 0 {
            return Err(PatternValidationError::ZeroDuration);
        }
        self.recurrence.validate()
    }
}

/// Mutable subset of a pattern. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternUpdate {
    pub title: Option<String>,
    pub duration_minutes: Option<u32>,
    pub active: Option<bool>,
}

impl PatternUpdate {
    pub fn apply_to(&self, pattern: &mut RecurrencePattern, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            pattern.title = title.trim().to_string();
        }
        if let Some(duration) = self.duration_minutes {
            pattern.duration_minutes = duration;
        }
        if let Some(active) = self.active {
            pattern.active = active;
        }
        pattern.updated_at = now;
    }
}
