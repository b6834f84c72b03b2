//! Instance synthesis for recurrence patterns.
//!
//! # Responsibility
//! - Persist one occurrence per unsatisfied pattern period.
//! - Compute concrete start times for inflexible patterns.
//! - Run per-frequency batches and materialize virtual events.
//!
//! # Invariants
//! - Generation is idempotent: a satisfied period yields `Ok(None)`.
//! - Satisfaction is checked before writing, but the instance cap is
//!   enforced by the repository; concurrent duplicates surface as `Conflict`.
//! - One failing pattern never aborts a batch.

use super::satisfaction::SatisfactionOracle;
use super::{RecurrenceError, RecurrenceResult};
use crate::calendar::{days_in_month, nth_weekday, period_end, period_key, PeriodKey};
use crate::config::EngineConfig;
use crate::model::event::{Event, VirtualEventId};
use crate::model::pattern::{Frequency, PatternId, Recurrence, RecurrencePattern, YearlyRule};
use crate::repo::event_repo::EventRepository;
use crate::repo::pattern_repo::{PatternListQuery, PatternRepository};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use log::{debug, info, warn};
use serde::Serialize;

/// Outcome of one per-frequency batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub frequency: Frequency,
    pub period_key: PeriodKey,
    /// Events persisted by this run.
    pub created: Vec<Event>,
    /// Patterns whose period was already satisfied (including concurrent writes).
    pub skipped: Vec<PatternId>,
    pub failures: Vec<BatchFailure>,
}

/// One pattern that failed inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub pattern_id: PatternId,
    pub error: String,
}

/// Use-case service creating persisted pattern instances.
pub struct InstanceService<P: PatternRepository, E: EventRepository> {
    patterns: P,
    events: E,
    config: EngineConfig,
}

impl<P: PatternRepository, E: EventRepository> InstanceService<P, E> {
    pub fn new(patterns: P, events: E, config: EngineConfig) -> Self {
        Self {
            patterns,
            events,
            config,
        }
    }

    pub(crate) fn patterns(&self) -> &P {
        &self.patterns
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn oracle(&self) -> SatisfactionOracle<&E> {
        SatisfactionOracle::new(&self.events)
    }

    /// Persists an instance of `pattern` for `period_key` unless the period
    /// is already satisfied.
    ///
    /// Returns `Ok(None)` for a satisfied period. Inflexible patterns get a
    /// start time derived from `reference_date`; flexible ones stay unscheduled.
    ///
    /// # Errors
    /// - `UnsupportedOperation` for every-n-days patterns.
    /// - `Parse` when `period_key` does not fit the pattern frequency.
    /// - `Conflict` when a concurrent writer filled the period first.
    pub fn generate_for_period(
        &self,
        pattern: &RecurrencePattern,
        period_key: &PeriodKey,
        reference_date: NaiveDate,
    ) -> RecurrenceResult<Option<Event>> {
        let frequency = pattern.frequency();
        if !frequency.is_period_based() {
            return Err(RecurrenceError::UnsupportedOperation {
                operation: "generate_for_period",
                frequency,
            });
        }

        if self.oracle().is_period_satisfied(pattern, period_key)? {
            debug!(
                "event=instance_generate module=recurrence status=skip reason=satisfied pattern_id={} period_key={period_key}",
                pattern.id
            );
            return Ok(None);
        }

        let start_time = if pattern.flexible_scheduling {
            None
        } else {
            Some(compute_start_time(pattern, reference_date, &self.config)?)
        };
        let deadline = period_end(period_key, frequency)?;

        let event = build_instance(
            pattern,
            period_key.clone(),
            start_time,
            deadline,
            &self.config,
        );
        self.events.create_event(&event)?;

        info!(
            "event=instance_generate module=recurrence status=ok pattern_id={} period_key={period_key} event_id={} scheduled={}",
            pattern.id,
            event.id,
            event.is_scheduled()
        );
        Ok(Some(event))
    }

    /// Generates the instance for the period containing `now`.
    ///
    /// Returns `Ok(None)` when the pattern is missing, inactive or already
    /// satisfied for the current period.
    pub fn generate_for_current_period(
        &self,
        pattern_id: PatternId,
        now: DateTime<Utc>,
    ) -> RecurrenceResult<Option<Event>> {
        let Some(pattern) = self.patterns.get_pattern(pattern_id)? else {
            return Ok(None);
        };
        if !pattern.active {
            return Ok(None);
        }
        if !pattern.frequency().is_period_based() {
            return Err(RecurrenceError::UnsupportedOperation {
                operation: "generate_for_current_period",
                frequency: pattern.frequency(),
            });
        }

        let today = now.date_naive();
        let key = period_key(today, pattern.frequency())?;
        self.generate_for_period(&pattern, &key, today)
    }

    /// Attempts generation for every active pattern of `frequency` in the
    /// period containing `reference_date`.
    ///
    /// Per-pattern failures are recorded in the report; only failures to
    /// compute the shared period key or to list patterns abort the run.
    pub fn generate_for_frequency_batch(
        &self,
        frequency: Frequency,
        reference_date: NaiveDate,
    ) -> RecurrenceResult<BatchReport> {
        if !frequency.is_period_based() {
            return Err(RecurrenceError::UnsupportedOperation {
                operation: "generate_for_frequency_batch",
                frequency,
            });
        }

        let key = period_key(reference_date, frequency)?;
        let patterns = self
            .patterns
            .find_patterns(&PatternListQuery::active_with(frequency))?;
        info!(
            "event=instance_batch module=recurrence status=start frequency={frequency} period_key={key} patterns={}",
            patterns.len()
        );

        let mut report = BatchReport {
            frequency,
            period_key: key.clone(),
            created: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
        };

        for pattern in &patterns {
            match self.generate_for_period(pattern, &key, reference_date) {
                Ok(Some(event)) => report.created.push(event),
                Ok(None) => report.skipped.push(pattern.id),
                Err(err) if err.is_conflict() => {
                    info!(
                        "event=instance_batch module=recurrence status=skip reason=conflict pattern_id={} period_key={key}",
                        pattern.id
                    );
                    report.skipped.push(pattern.id);
                }
                Err(err) => {
                    warn!(
                        "event=instance_batch module=recurrence status=error pattern_id={} period_key={key} error={err}",
                        pattern.id
                    );
                    report.failures.push(BatchFailure {
                        pattern_id: pattern.id,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            "event=instance_batch module=recurrence status=ok frequency={frequency} period_key={key} created={} skipped={} failed={}",
            report.created.len(),
            report.skipped.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Next due instant for an every-n-days pattern.
    pub fn next_suggested_date(
        &self,
        pattern_id: PatternId,
        now: DateTime<Utc>,
    ) -> RecurrenceResult<DateTime<Utc>> {
        let pattern = self
            .patterns
            .get_pattern(pattern_id)?
            .ok_or(RecurrenceError::NotFound(pattern_id))?;
        match pattern.recurrence {
            Recurrence::EveryNDays { interval_days } => Ok(self
                .oracle()
                .next_suggested_date(pattern.id, interval_days, now)?),
            _ => Err(RecurrenceError::UnsupportedOperation {
                operation: "next_suggested_date",
                frequency: pattern.frequency(),
            }),
        }
    }

    /// Converts a virtual event into a persisted event at `start_time`.
    ///
    /// # Errors
    /// - `NotFound` when the pattern is missing or inactive.
    /// - `Parse` when the embedded period key does not fit the frequency.
    /// - `Conflict` when the period has been satisfied in the meantime.
    pub fn commit_virtual_event(
        &self,
        virtual_id: &VirtualEventId,
        start_time: DateTime<Utc>,
    ) -> RecurrenceResult<Event> {
        let pattern = self
            .patterns
            .get_pattern(virtual_id.pattern_id)?
            .filter(|pattern| pattern.active)
            .ok_or(RecurrenceError::NotFound(virtual_id.pattern_id))?;
        let period_key = &virtual_id.period_key;
        let deadline = period_end(period_key, pattern.frequency())?;

        if self.oracle().is_period_satisfied(&pattern, period_key)? {
            return Err(RecurrenceError::Conflict {
                pattern_id: pattern.id,
                period_key: period_key.clone(),
            });
        }

        let event = build_instance(
            &pattern,
            period_key.clone(),
            Some(start_time),
            deadline,
            &self.config,
        );
        self.events.create_event(&event)?;

        info!(
            "event=virtual_commit module=recurrence status=ok pattern_id={} period_key={period_key} event_id={}",
            pattern.id, event.id
        );
        Ok(event)
    }
}

/// Computes the concrete start instant of an inflexible pattern instance.
///
/// The day comes from `reference_date` for weekly, monthly, n-per-period and
/// every-n-days patterns, from the yearly rule in `reference_date`'s year, or
/// from the nth-weekday rule in `reference_date`'s month. The time of day is
/// the pattern's fixed start time or the engine default hour.
///
/// # Errors
/// - `Configuration` when a yearly month cannot be resolved.
/// - `OutOfRange` / `NoMatch` from nth-weekday resolution.
pub fn compute_start_time(
    pattern: &RecurrencePattern,
    reference_date: NaiveDate,
    config: &EngineConfig,
) -> RecurrenceResult<DateTime<Utc>> {
    let date = match pattern.recurrence {
        Recurrence::Weekly
        | Recurrence::Monthly
        | Recurrence::NPerPeriod { .. }
        | Recurrence::EveryNDays { .. } => reference_date,
        Recurrence::Yearly {
            rule: YearlyRule::Date { month, day },
        } => yearly_date(reference_date.year(), month, day)?,
        Recurrence::Yearly {
            rule:
                YearlyRule::NthWeekday {
                    month,
                    weekday,
                    occurrence,
                },
        } => nth_weekday(reference_date.year(), month, weekday, occurrence)?,
        Recurrence::NthWeekdayOfMonth {
            weekday,
            occurrence,
        } => nth_weekday(
            reference_date.year(),
            reference_date.month(),
            weekday,
            occurrence,
        )?,
    };

    let time = pattern
        .start_time
        .unwrap_or_else(|| config.default_start_time());
    Ok(date.and_time(time).and_utc())
}

/// Resolves a yearly month/day in `year`, moving Feb 29 to Feb 28 in common
/// years and clamping any day past the month's end.
fn yearly_date(year: i32, month: u32, day: u32) -> RecurrenceResult<NaiveDate> {
    let last_day = days_in_month(year, month).ok_or_else(|| {
        RecurrenceError::Configuration(format!("yearly month {month} is not a calendar month"))
    })?;
    let is_leap_year = NaiveDate::from_ymd_opt(year, 2, 29).is_some();
    let day = if month == 2 && day == 29 && !is_leap_year {
        28
    } else {
        day
    };

    NaiveDate::from_ymd_opt(year, month, day.clamp(1, last_day)).ok_or_else(|| {
        RecurrenceError::Configuration(format!("cannot build date {year}-{month:02}-{day:02}"))
    })
}

fn build_instance(
    pattern: &RecurrencePattern,
    period_key: PeriodKey,
    start_time: Option<DateTime<Utc>>,
    deadline: DateTime<Utc>,
    config: &EngineConfig,
) -> Event {
    let mut event = Event::new(pattern.title.clone(), pattern.duration_minutes, Utc::now());
    event.start_time = start_time;
    event.pattern_id = Some(pattern.id);
    event.period_key = Some(period_key);
    event.category = Some(config.recurring_category.clone());
    event.is_time_bound = true;
    event.deadline = Some(deadline);
    event.notes = pattern.notes.clone();
    event
}
