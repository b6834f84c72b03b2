//! Virtual event projection over date ranges.
//!
//! # Invariants
//! - Read-only: nothing here writes to storage, so calls may overlap freely.
//! - Every-n-days patterns are never projected.
//! - A virtual event's ID depends only on `(pattern_id, period_key)`.

use super::satisfaction::SatisfactionOracle;
use super::RecurrenceResult;
use crate::calendar::{period_end, periods_overlapping};
use crate::config::EngineConfig;
use crate::model::event::{CalendarEntry, VirtualEvent, VirtualEventId};
use crate::model::pattern::RecurrencePattern;
use crate::repo::event_repo::EventRepository;
use crate::repo::pattern_repo::{PatternListQuery, PatternRepository};
use chrono::{DateTime, Utc};
use log::debug;

/// Use-case service projecting unsatisfied periods into virtual events.
pub struct VirtualEventService<P: PatternRepository, E: EventRepository> {
    patterns: P,
    events: E,
    config: EngineConfig,
}

impl<P: PatternRepository, E: EventRepository> VirtualEventService<P, E> {
    pub fn new(patterns: P, events: E, config: EngineConfig) -> Self {
        Self {
            patterns,
            events,
            config,
        }
    }

    /// Projects every unsatisfied period of every active period-based
    /// pattern overlapping `[start, end]`.
    pub fn virtual_events_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RecurrenceResult<Vec<VirtualEvent>> {
        let oracle = SatisfactionOracle::new(&self.events);
        let patterns = self.patterns.find_patterns(&PatternListQuery::active())?;

        let mut projected = Vec::new();
        for pattern in patterns
            .iter()
            .filter(|pattern| pattern.frequency().is_period_based())
        {
            for key in periods_overlapping(start, end, pattern.frequency())? {
                if oracle.is_period_satisfied(pattern, &key)? {
                    continue;
                }
                let deadline = period_end(&key, pattern.frequency())?;
                let id = VirtualEventId::new(pattern.id, key);
                projected.push(self.project(pattern, id, deadline));
            }
        }

        debug!(
            "event=virtual_range module=recurrence status=ok start={} end={} patterns={} virtual_events={}",
            start.to_rfc3339(),
            end.to_rfc3339(),
            patterns.len(),
            projected.len()
        );
        Ok(projected)
    }

    /// Lists scheduled persisted events in `[start, end]`, optionally merged
    /// with virtual projections, ordered by start time (virtual: deadline).
    pub fn calendar_entries_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        include_virtual: bool,
    ) -> RecurrenceResult<Vec<CalendarEntry>> {
        let mut entries: Vec<CalendarEntry> = self
            .events
            .list_scheduled_between(start, end)?
            .into_iter()
            .map(CalendarEntry::Persisted)
            .collect();

        if include_virtual {
            entries.extend(
                self.virtual_events_in_range(start, end)?
                    .into_iter()
                    .map(CalendarEntry::Virtual),
            );
        }

        entries.sort_by_key(CalendarEntry::sort_instant);
        Ok(entries)
    }

    fn project(
        &self,
        pattern: &RecurrencePattern,
        id: VirtualEventId,
        deadline: DateTime<Utc>,
    ) -> VirtualEvent {
        VirtualEvent {
            title: pattern.title.clone(),
            duration_minutes: pattern.duration_minutes,
            pattern_id: pattern.id,
            period_key: id.period_key.clone(),
            category: self.config.recurring_category.clone(),
            is_flexible: pattern.flexible_scheduling,
            deadline,
            notes: pattern.notes.clone(),
            id,
        }
    }
}
