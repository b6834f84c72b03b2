//! Pattern lifecycle use-cases.
//!
//! # Invariants
//! - A new active period-based pattern gets its current period's instance
//!   generated right after creation.
//! - Updates never touch frequency or frequency-specific configuration.

use super::instance_service::InstanceService;
use super::{RecurrenceError, RecurrenceResult};
use crate::calendar::period_key;
use crate::model::event::Event;
use crate::model::pattern::{PatternId, PatternUpdate, RecurrencePattern};
use crate::repo::event_repo::EventRepository;
use crate::repo::pattern_repo::{PatternListQuery, PatternRepository};
use chrono::{DateTime, Utc};
use log::info;

/// Result of creating a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternCreation {
    pub pattern: RecurrencePattern,
    /// Instance for the period containing the creation instant, if generated.
    pub initial_instance: Option<Event>,
}

/// Pattern service facade over repository implementations.
pub struct PatternService<P: PatternRepository, E: EventRepository> {
    instances: InstanceService<P, E>,
}

impl<P: PatternRepository, E: EventRepository> PatternService<P, E> {
    pub fn new(instances: InstanceService<P, E>) -> Self {
        Self { instances }
    }

    /// Persists `pattern` and generates its first instance.
    pub fn create_pattern(
        &self,
        pattern: RecurrencePattern,
        now: DateTime<Utc>,
    ) -> RecurrenceResult<PatternCreation> {
        self.instances.patterns().create_pattern(&pattern)?;
        info!(
            "event=pattern_create module=recurrence status=ok pattern_id={} frequency={} category={}",
            pattern.id,
            pattern.frequency(),
            self.instances.config().recurring_category
        );

        let initial_instance = if pattern.active && pattern.frequency().is_period_based() {
            let today = now.date_naive();
            let key = period_key(today, pattern.frequency())?;
            self.instances.generate_for_period(&pattern, &key, today)?
        } else {
            None
        };

        Ok(PatternCreation {
            pattern,
            initial_instance,
        })
    }

    /// Applies title/duration/active changes.
    pub fn update_pattern(
        &self,
        pattern_id: PatternId,
        update: &PatternUpdate,
        now: DateTime<Utc>,
    ) -> RecurrenceResult<RecurrencePattern> {
        let mut pattern = self
            .instances
            .patterns()
            .get_pattern(pattern_id)?
            .ok_or(RecurrenceError::NotFound(pattern_id))?;
        update.apply_to(&mut pattern, now);
        self.instances.patterns().update_pattern(&pattern)?;
        Ok(pattern)
    }

    pub fn get_pattern(
        &self,
        pattern_id: PatternId,
    ) -> RecurrenceResult<Option<RecurrencePattern>> {
        Ok(self.instances.patterns().get_pattern(pattern_id)?)
    }

    pub fn list_patterns(
        &self,
        query: &PatternListQuery,
    ) -> RecurrenceResult<Vec<RecurrencePattern>> {
        Ok(self.instances.patterns().find_patterns(query)?)
    }

    pub fn instances(&self) -> &InstanceService<P, E> {
        &self.instances
    }
}
