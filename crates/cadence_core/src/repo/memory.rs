//! In-memory pattern/event store.
//!
//! Mirrors the SQLite repositories' contracts, including the per-period
//! instance cap, so services can run without a database.

use super::event_repo::EventRepository;
use super::pattern_repo::{PatternListQuery, PatternRepository};
use super::{RepoError, RepoResult};
use crate::calendar::PeriodKey;
use crate::model::event::{Event, EventId};
use crate::model::pattern::{PatternId, RecurrencePattern};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MemoryState {
    patterns: Vec<RecurrencePattern>,
    events: Vec<Event>,
}

/// Thread-safe store holding patterns and events in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a pattern without validation, for fixtures that need
    /// configurations the write path would reject.
    pub fn seed_pattern(&self, pattern: RecurrencePattern) {
        self.lock().patterns.push(pattern);
    }

    /// Snapshot of all stored events in insertion order.
    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    /// Snapshot of events generated for one pattern.
    pub fn events_for_pattern(&self, pattern_id: PatternId) -> Vec<Event> {
        self.lock()
            .events
            .iter()
            .filter(|event| event.pattern_id == Some(pattern_id))
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn references(event: &Event, pattern_id: PatternId, period_key: &PeriodKey) -> bool {
    event.pattern_id == Some(pattern_id) && event.period_key.as_ref() == Some(period_key)
}

impl PatternRepository for InMemoryStore {
    fn create_pattern(&self, pattern: &RecurrencePattern) -> RepoResult<PatternId> {
        pattern.validate()?;
        let mut state = self.lock();
        if state.patterns.iter().any(|stored| stored.id == pattern.id) {
            return Err(RepoError::InvalidData(format!(
                "duplicate pattern id {}",
                pattern.id
            )));
        }
        state.patterns.push(pattern.clone());
        Ok(pattern.id)
    }

    fn update_pattern(&self, pattern: &RecurrencePattern) -> RepoResult<()> {
        pattern.validate()?;
        let mut state = self.lock();
        let stored = state
            .patterns
            .iter_mut()
            .find(|stored| stored.id == pattern.id)
            .ok_or(RepoError::PatternNotFound(pattern.id))?;
        stored.title = pattern.title.clone();
        stored.duration_minutes = pattern.duration_minutes;
        stored.active = pattern.active;
        stored.updated_at = pattern.updated_at;
        Ok(())
    }

    fn get_pattern(&self, id: PatternId) -> RepoResult<Option<RecurrencePattern>> {
        Ok(self
            .lock()
            .patterns
            .iter()
            .find(|pattern| pattern.id == id)
            .cloned())
    }

    fn find_patterns(&self, query: &PatternListQuery) -> RepoResult<Vec<RecurrencePattern>> {
        let mut patterns: Vec<RecurrencePattern> = self
            .lock()
            .patterns
            .iter()
            .filter(|pattern| query.matches(pattern))
            .cloned()
            .collect();
        patterns.sort_by_key(|pattern| (pattern.created_at, pattern.id));
        Ok(patterns)
    }
}

impl EventRepository for InMemoryStore {
    fn count_for_period(&self, pattern_id: PatternId, period_key: &PeriodKey) -> RepoResult<u32> {
        let count = self
            .lock()
            .events
            .iter()
            .filter(|event| references(event, pattern_id, period_key))
            .count();
        u32::try_from(count).map_err(|_| RepoError::InvalidData("event count overflow".into()))
    }

    fn find_for_period(
        &self,
        pattern_id: PatternId,
        period_key: &PeriodKey,
    ) -> RepoResult<Option<Event>> {
        Ok(self
            .lock()
            .events
            .iter()
            .find(|event| references(event, pattern_id, period_key))
            .cloned())
    }

    fn create_event(&self, event: &Event) -> RepoResult<EventId> {
        event.validate()?;
        let mut state = self.lock();

        if state.events.iter().any(|stored| stored.id == event.id) {
            return Err(RepoError::InvalidData(format!(
                "duplicate event id {}",
                event.id
            )));
        }

        if let Some(parent_id) = event.parent_event_id {
            let parent = state
                .events
                .iter()
                .find(|stored| stored.id == parent_id)
                .ok_or(RepoError::EventNotFound(parent_id))?;
            if parent.parent_event_id.is_some() {
                return Err(RepoError::NestingTooDeep(parent_id));
            }
        }

        if let (Some(pattern_id), Some(period_key)) = (event.pattern_id, &event.period_key) {
            let limit = state
                .patterns
                .iter()
                .find(|pattern| pattern.id == pattern_id)
                .ok_or(RepoError::PatternNotFound(pattern_id))?
                .recurrence
                .instances_per_period();
            let existing = state
                .events
                .iter()
                .filter(|stored| references(stored, pattern_id, period_key))
                .count();
            if existing >= limit as usize {
                return Err(RepoError::Conflict {
                    pattern_id,
                    period_key: period_key.clone(),
                });
            }
        }

        state.events.push(event.clone());
        Ok(event.id)
    }

    fn find_latest_before(
        &self,
        pattern_id: PatternId,
        before: DateTime<Utc>,
    ) -> RepoResult<Option<Event>> {
        Ok(self
            .lock()
            .events
            .iter()
            .filter(|event| event.pattern_id == Some(pattern_id))
            .filter(|event| event.start_time.is_some_and(|start| start <= before))
            .max_by_key(|event| event.start_time)
            .cloned())
    }

    fn get_event(&self, id: EventId) -> RepoResult<Option<Event>> {
        Ok(self
            .lock()
            .events
            .iter()
            .find(|event| event.id == id)
            .cloned())
    }

    fn list_scheduled_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepoResult<Vec<Event>> {
        let mut events: Vec<Event> = self
            .lock()
            .events
            .iter()
            .filter(|event| {
                event
                    .start_time
                    .is_some_and(|time| time >= start && time <= end)
            })
            .cloned()
            .collect();
        events.sort_by_key(|event| (event.start_time, event.id));
        Ok(events)
    }
}
