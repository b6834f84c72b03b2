//! Satisfaction oracle over persisted events.
//!
//! # Invariants
//! - n-per-period patterns are satisfied once `count >= target`.
//! - Other period-based patterns are satisfied by any one event.
//! - Every-n-days patterns are not period-based; see `next_suggested_date`.

use crate::calendar::PeriodKey;
use crate::model::pattern::{PatternId, Recurrence, RecurrencePattern};
use crate::repo::event_repo::EventRepository;
use crate::repo::RepoResult;
use chrono::{DateTime, Duration, Utc};

/// Read-only view deciding whether pattern periods are fulfilled.
pub struct SatisfactionOracle<E: EventRepository> {
    events: E,
}

impl<E: EventRepository> SatisfactionOracle<E> {
    pub fn new(events: E) -> Self {
        Self { events }
    }

    /// `true` iff at least one event references `(pattern_id, period_key)`.
    pub fn is_satisfied(&self, pattern_id: PatternId, period_key: &PeriodKey) -> RepoResult<bool> {
        Ok(self
            .events
            .find_for_period(pattern_id, period_key)?
            .is_some())
    }

    pub fn completion_count(
        &self,
        pattern_id: PatternId,
        period_key: &PeriodKey,
    ) -> RepoResult<u32> {
        self.events.count_for_period(pattern_id, period_key)
    }

    /// Applies the frequency-appropriate satisfaction rule to one period.
    pub fn is_period_satisfied(
        &self,
        pattern: &RecurrencePattern,
        period_key: &PeriodKey,
    ) -> RepoResult<bool> {
        match pattern.recurrence {
            Recurrence::NPerPeriod { target } => {
                Ok(self.completion_count(pattern.id, period_key)? >= target)
            }
            _ => self.is_satisfied(pattern.id, period_key),
        }
    }

    /// Last completion (latest event starting at or before `now`) plus
    /// `interval_days`, or `now` when the pattern has no completion yet.
    pub fn next_suggested_date(
        &self,
        pattern_id: PatternId,
        interval_days: u32,
        now: DateTime<Utc>,
    ) -> RepoResult<DateTime<Utc>> {
        let last_completion = self
            .events
            .find_latest_before(pattern_id, now)?
            .and_then(|event| event.start_time);
        Ok(last_completion.map_or(now, |start| {
            start + Duration::days(i64::from(interval_days))
        }))
    }
}
