//! Event repository contract and SQLite implementation.
//!
//! # Invariants
//! - Instance caps per `(pattern_id, period_key)` are enforced by the
//!   `events_period_instance_guard` trigger and reported as `Conflict`.
//! - Only one level of parent/child nesting is accepted.

use super::{bool_to_int, from_epoch_ms, int_to_bool, parse_uuid, RepoError, RepoResult};
use crate::calendar::PeriodKey;
use crate::model::event::{Event, EventId};
use crate::model::pattern::PatternId;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const EVENT_SELECT_SQL: &str = "SELECT
    id,
    title,
    start_time,
    duration_minutes,
    parent_event_id,
    pattern_id,
    period_key,
    category,
    is_time_bound,
    deadline,
    notes,
    created_at
FROM events";

/// Repository interface for persisted events.
pub trait EventRepository {
    /// Number of events referencing `(pattern_id, period_key)`.
    fn count_for_period(&self, pattern_id: PatternId, period_key: &PeriodKey) -> RepoResult<u32>;
    /// Any one event referencing `(pattern_id, period_key)`.
    fn find_for_period(
        &self,
        pattern_id: PatternId,
        period_key: &PeriodKey,
    ) -> RepoResult<Option<Event>>;
    fn create_event(&self, event: &Event) -> RepoResult<EventId>;
    /// Most recent event of the pattern with `start_time <= before`.
    fn find_latest_before(
        &self,
        pattern_id: PatternId,
        before: DateTime<Utc>,
    ) -> RepoResult<Option<Event>>;
    fn get_event(&self, id: EventId) -> RepoResult<Option<Event>>;
    /// Scheduled events with `start <= start_time <= end`, ascending.
    fn list_scheduled_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepoResult<Vec<Event>>;
}

impl<T: EventRepository + ?Sized> EventRepository for &T {
    fn count_for_period(&self, pattern_id: PatternId, period_key: &PeriodKey) -> RepoResult<u32> {
        (**self).count_for_period(pattern_id, period_key)
    }

    fn find_for_period(
        &self,
        pattern_id: PatternId,
        period_key: &PeriodKey,
    ) -> RepoResult<Option<Event>> {
        (**self).find_for_period(pattern_id, period_key)
    }

    fn create_event(&self, event: &Event) -> RepoResult<EventId> {
        (**self).create_event(event)
    }

    fn find_latest_before(
        &self,
        pattern_id: PatternId,
        before: DateTime<Utc>,
    ) -> RepoResult<Option<Event>> {
        (**self).find_latest_before(pattern_id, before)
    }

    fn get_event(&self, id: EventId) -> RepoResult<Option<Event>> {
        (**self).get_event(id)
    }

    fn list_scheduled_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepoResult<Vec<Event>> {
        (**self).list_scheduled_between(start, end)
    }
}

/// SQLite-backed event repository.
#[derive(Clone, Copy)]
pub struct SqliteEventRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEventRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn ensure_parent_accepts_children(&self, parent_id: EventId) -> RepoResult<()> {
        let grandparent: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT parent_event_id FROM events WHERE id = ?1;",
                [parent_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match grandparent {
            None => Err(RepoError::EventNotFound(parent_id)),
            Some(Some(_)) => Err(RepoError::NestingTooDeep(parent_id)),
            Some(None) => Ok(()),
        }
    }
}

impl EventRepository for SqliteEventRepository<'_> {
    fn count_for_period(&self, pattern_id: PatternId, period_key: &PeriodKey) -> RepoResult<u32> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM events WHERE pattern_id = ?1 AND period_key = ?2;",
            params![pattern_id.to_string(), period_key.as_str()],
            |row| row.get::<_, u32>(0),
        )?;
        Ok(count)
    }

    fn find_for_period(
        &self,
        pattern_id: PatternId,
        period_key: &PeriodKey,
    ) -> RepoResult<Option<Event>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EVENT_SELECT_SQL}
             WHERE pattern_id = ?1 AND period_key = ?2
             ORDER BY created_at ASC, id ASC
             LIMIT 1;"
        ))?;
        let mut rows = stmt.query(params![pattern_id.to_string(), period_key.as_str()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_event_row(row)?));
        }
        Ok(None)
    }

    fn create_event(&self, event: &Event) -> RepoResult<EventId> {
        event.validate()?;
        if let Some(parent_id) = event.parent_event_id {
            self.ensure_parent_accepts_children(parent_id)?;
        }

        let inserted = self.conn.execute(
            "INSERT INTO events (
                id,
                title,
                start_time,
                duration_minutes,
                parent_event_id,
                pattern_id,
                period_key,
                category,
                is_time_bound,
                deadline,
                notes,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12);",
            params![
                event.id.to_string(),
                event.title.as_str(),
                event.start_time.map(|time| time.timestamp_millis()),
                event.duration_minutes,
                event.parent_event_id.map(|id| id.to_string()),
                event.pattern_id.map(|id| id.to_string()),
                event.period_key.as_ref().map(PeriodKey::as_str),
                event.category.as_deref(),
                bool_to_int(event.is_time_bound),
                event.deadline.map(|time| time.timestamp_millis()),
                event.notes.as_deref(),
                event.created_at.timestamp_millis(),
            ],
        );

        match inserted {
            Ok(_) => Ok(event.id),
            Err(err) if is_instance_guard_violation(&err) => {
                match (event.pattern_id, event.period_key.clone()) {
                    (Some(pattern_id), Some(period_key)) => Err(RepoError::Conflict {
                        pattern_id,
                        period_key,
                    }),
                    _ => Err(err.into()),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    fn find_latest_before(
        &self,
        pattern_id: PatternId,
        before: DateTime<Utc>,
    ) -> RepoResult<Option<Event>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EVENT_SELECT_SQL}
             WHERE pattern_id = ?1
               AND start_time IS NOT NULL
               AND start_time <= ?2
             ORDER BY start_time DESC, id ASC
             LIMIT 1;"
        ))?;
        let mut rows = stmt.query(params![pattern_id.to_string(), before.timestamp_millis()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_event_row(row)?));
        }
        Ok(None)
    }

    fn get_event(&self, id: EventId) -> RepoResult<Option<Event>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{EVENT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_event_row(row)?));
        }
        Ok(None)
    }

    fn list_scheduled_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepoResult<Vec<Event>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EVENT_SELECT_SQL}
             WHERE start_time IS NOT NULL
               AND start_time >= ?1
               AND start_time <= ?2
             ORDER BY start_time ASC, id ASC;"
        ))?;
        let mut rows = stmt.query(params![start.timestamp_millis(), end.timestamp_millis()])?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            events.push(parse_event_row(row)?);
        }
        Ok(events)
    }
}

fn is_instance_guard_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_TRIGGER
    )
}

fn parse_event_row(row: &Row<'_>) -> RepoResult<Event> {
    let id_text: String = row.get("id")?;
    let parent_event_id = row
        .get::<_, Option<String>>("parent_event_id")?
        .map(|value| parse_uuid(&value, "events.parent_event_id"))
        .transpose()?;
    let pattern_id = row
        .get::<_, Option<String>>("pattern_id")?
        .map(|value| parse_uuid(&value, "events.pattern_id"))
        .transpose()?;
    let start_time = row
        .get::<_, Option<i64>>("start_time")?
        .map(|value| from_epoch_ms(value, "events.start_time"))
        .transpose()?;
    let deadline = row
        .get::<_, Option<i64>>("deadline")?
        .map(|value| from_epoch_ms(value, "events.deadline"))
        .transpose()?;

    let event = Event {
        id: parse_uuid(&id_text, "events.id")?,
        title: row.get("title")?,
        start_time,
        duration_minutes: row.get("duration_minutes")?,
        parent_event_id,
        pattern_id,
        period_key: row.get::<_, Option<String>>("period_key")?.map(PeriodKey::new),
        category: row.get("category")?,
        is_time_bound: int_to_bool(row.get("is_time_bound")?, "events.is_time_bound")?,
        deadline,
        notes: row.get("notes")?,
        created_at: from_epoch_ms(row.get("created_at")?, "events.created_at")?,
    };
    event.validate()?;
    Ok(event)
}
