//! Pattern repository contract and SQLite implementation.
//!
//! # Invariants
//! - Frequency-specific configuration round-trips through nullable
//!   `config_*` columns and is rebuilt into a `Recurrence` on read.
//! - Updates write only the mutable fields (title, duration, active).

use super::{bool_to_int, from_epoch_ms, int_to_bool, parse_uuid, RepoError, RepoResult};
use crate::model::pattern::{Frequency, PatternId, Recurrence, RecurrencePattern, YearlyRule};
use chrono::{NaiveTime, Timelike, Weekday};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

const PATTERN_SELECT_SQL: &str = "SELECT
    id,
    title,
    frequency,
    frequency_value,
    config_month,
    config_day,
    config_weekday,
    config_occurrence,
    duration_minutes,
    flexible_scheduling,
    start_time_secs,
    notes,
    active,
    created_at,
    updated_at
FROM recurrence_patterns";

/// Query options for listing patterns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatternListQuery {
    pub frequency: Option<Frequency>,
    /// `Some(true)` returns only active patterns; `None` returns all.
    pub active: Option<bool>,
}

impl PatternListQuery {
    /// Active patterns of every frequency.
    pub fn active() -> Self {
        Self {
            frequency: None,
            active: Some(true),
        }
    }

    /// Active patterns of one frequency.
    pub fn active_with(frequency: Frequency) -> Self {
        Self {
            frequency: Some(frequency),
            active: Some(true),
        }
    }

    pub fn matches(&self, pattern: &RecurrencePattern) -> bool {
        self.frequency
            .map_or(true, |frequency| pattern.frequency() == frequency)
            && self.active.map_or(true, |active| pattern.active == active)
    }
}

/// Repository interface for recurrence patterns.
pub trait PatternRepository {
    fn create_pattern(&self, pattern: &RecurrencePattern) -> RepoResult<PatternId>;
    /// Persists title, duration, active and `updated_at` only.
    fn update_pattern(&self, pattern: &RecurrencePattern) -> RepoResult<()>;
    fn get_pattern(&self, id: PatternId) -> RepoResult<Option<RecurrencePattern>>;
    /// Lists patterns ordered by creation time.
    fn find_patterns(&self, query: &PatternListQuery) -> RepoResult<Vec<RecurrencePattern>>;
}

impl<T: PatternRepository + ?Sized> PatternRepository for &T {
    fn create_pattern(&self, pattern: &RecurrencePattern) -> RepoResult<PatternId> {
        (**self).create_pattern(pattern)
    }

    fn update_pattern(&self, pattern: &RecurrencePattern) -> RepoResult<()> {
        (**self).update_pattern(pattern)
    }

    fn get_pattern(&self, id: PatternId) -> RepoResult<Option<RecurrencePattern>> {
        (**self).get_pattern(id)
    }

    fn find_patterns(&self, query: &PatternListQuery) -> RepoResult<Vec<RecurrencePattern>> {
        (**self).find_patterns(query)
    }
}

/// SQLite-backed pattern repository.
#[derive(Clone, Copy)]
pub struct SqlitePatternRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePatternRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl PatternRepository for SqlitePatternRepository<'_> {
    fn create_pattern(&self, pattern: &RecurrencePattern) -> RepoResult<PatternId> {
        pattern.validate()?;
        let config = ConfigColumns::from(&pattern.recurrence);

        self.conn.execute(
            "INSERT INTO recurrence_patterns (
                id,
                title,
                frequency,
                frequency_value,
                config_month,
                config_day,
                config_weekday,
                config_occurrence,
                duration_minutes,
                flexible_scheduling,
                start_time_secs,
                notes,
                active,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15);",
            params![
                pattern.id.to_string(),
                pattern.title.as_str(),
                pattern.frequency().as_str(),
                pattern.frequency_value(),
                config.month,
                config.day,
                config.weekday,
                config.occurrence,
                pattern.duration_minutes,
                bool_to_int(pattern.flexible_scheduling),
                pattern.start_time.map(|time| time.num_seconds_from_midnight()),
                pattern.notes.as_deref(),
                bool_to_int(pattern.active),
                pattern.created_at.timestamp_millis(),
                pattern.updated_at.timestamp_millis(),
            ],
        )?;

        Ok(pattern.id)
    }

    fn update_pattern(&self, pattern: &RecurrencePattern) -> RepoResult<()> {
        pattern.validate()?;

        let changed = self.conn.execute(
            "UPDATE recurrence_patterns
             SET
                title = ?1,
                duration_minutes = ?2,
                active = ?3,
                updated_at = ?4
             WHERE id = ?5;",
            params![
                pattern.title.as_str(),
                pattern.duration_minutes,
                bool_to_int(pattern.active),
                pattern.updated_at.timestamp_millis(),
                pattern.id.to_string(),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::PatternNotFound(pattern.id));
        }
        Ok(())
    }

    fn get_pattern(&self, id: PatternId) -> RepoResult<Option<RecurrencePattern>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PATTERN_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_pattern_row(row)?));
        }
        Ok(None)
    }

    fn find_patterns(&self, query: &PatternListQuery) -> RepoResult<Vec<RecurrencePattern>> {
        let mut sql = format!("{PATTERN_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(frequency) = query.frequency {
            sql.push_str(" AND frequency = ?");
            bind_values.push(Value::Text(frequency.as_str().to_string()));
        }
        if let Some(active) = query.active {
            sql.push_str(" AND active = ?");
            bind_values.push(Value::Integer(bool_to_int(active)));
        }
        sql.push_str(" ORDER BY created_at ASC, id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut patterns = Vec::new();
        while let Some(row) = rows.next()? {
            patterns.push(parse_pattern_row(row)?);
        }
        Ok(patterns)
    }
}

/// Nullable column projection of `Recurrence` configuration.
#[derive(Debug, Default)]
struct ConfigColumns {
    month: Option<u32>,
    day: Option<u32>,
    weekday: Option<u32>,
    occurrence: Option<i8>,
}

impl From<&Recurrence> for ConfigColumns {
    fn from(recurrence: &Recurrence) -> Self {
        match *recurrence {
            Recurrence::Yearly {
                rule: YearlyRule::Date { month, day },
            } => Self {
                month: Some(month),
                day: Some(day),
                ..Self::default()
            },
            Recurrence::Yearly {
                rule:
                    YearlyRule::NthWeekday {
                        month,
                        weekday,
                        occurrence,
                    },
            } => Self {
                month: Some(month),
                weekday: Some(weekday.num_days_from_sunday()),
                occurrence: Some(occurrence),
                ..Self::default()
            },
            Recurrence::NthWeekdayOfMonth {
                weekday,
                occurrence,
            } => Self {
                weekday: Some(weekday.num_days_from_sunday()),
                occurrence: Some(occurrence),
                ..Self::default()
            },
            _ => Self::default(),
        }
    }
}

fn parse_pattern_row(row: &Row<'_>) -> RepoResult<RecurrencePattern> {
    let id_text: String = row.get("id")?;
    let id = parse_uuid(&id_text, "recurrence_patterns.id")?;

    let frequency_text: String = row.get("frequency")?;
    let frequency = frequency_text.parse::<Frequency>().map_err(|err| {
        RepoError::InvalidData(format!("{err} in recurrence_patterns.frequency"))
    })?;

    let config = ConfigColumns {
        month: row.get("config_month")?,
        day: row.get("config_day")?,
        weekday: row.get("config_weekday")?,
        occurrence: row.get("config_occurrence")?,
    };
    let recurrence = recurrence_from_columns(frequency, row.get("frequency_value")?, &config)?;

    let start_time = match row.get::<_, Option<u32>>("start_time_secs")? {
        Some(secs) => Some(
            NaiveTime::from_num_seconds_from_midnight_opt(secs, 0).ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "invalid start time `{secs}` in recurrence_patterns.start_time_secs"
                ))
            })?,
        ),
        None => None,
    };

    let pattern = RecurrencePattern {
        id,
        title: row.get("title")?,
        recurrence,
        duration_minutes: row.get("duration_minutes")?,
        flexible_scheduling: int_to_bool(
            row.get("flexible_scheduling")?,
            "recurrence_patterns.flexible_scheduling",
        )?,
        start_time,
        notes: row.get("notes")?,
        active: int_to_bool(row.get("active")?, "recurrence_patterns.active")?,
        created_at: from_epoch_ms(row.get("created_at")?, "recurrence_patterns.created_at")?,
        updated_at: from_epoch_ms(row.get("updated_at")?, "recurrence_patterns.updated_at")?,
    };
    pattern.validate()?;
    Ok(pattern)
}

fn recurrence_from_columns(
    frequency: Frequency,
    frequency_value: u32,
    config: &ConfigColumns,
) -> RepoResult<Recurrence> {
    let missing = |column: &str| {
        RepoError::InvalidData(format!(
            "{frequency} pattern is missing recurrence_patterns.{column}"
        ))
    };

    let recurrence = match frequency {
        Frequency::Weekly => Recurrence::Weekly,
        Frequency::Monthly => Recurrence::Monthly,
        Frequency::EveryNDays => Recurrence::EveryNDays {
            interval_days: frequency_value,
        },
        Frequency::NPerPeriod => Recurrence::NPerPeriod {
            target: frequency_value,
        },
        Frequency::Yearly => {
            let month = config.month.ok_or_else(|| missing("config_month"))?;
            let rule = match (config.day, config.weekday, config.occurrence) {
                (Some(day), None, None) => YearlyRule::Date { month, day },
                (None, Some(weekday), Some(occurrence)) => YearlyRule::NthWeekday {
                    month,
                    weekday: weekday_from_db(weekday)?,
                    occurrence,
                },
                _ => {
                    return Err(RepoError::InvalidData(
                        "yearly pattern needs either config_day or config_weekday+config_occurrence"
                            .to_string(),
                    ))
                }
            };
            Recurrence::Yearly { rule }
        }
        Frequency::NthWeekdayOfMonth => Recurrence::NthWeekdayOfMonth {
            weekday: weekday_from_db(config.weekday.ok_or_else(|| missing("config_weekday"))?)?,
            occurrence: config
                .occurrence
                .ok_or_else(|| missing("config_occurrence"))?,
        },
    };
    Ok(recurrence)
}

fn weekday_from_db(value: u32) -> RepoResult<Weekday> {
    match value {
        0 => Ok(Weekday::Sun),
        1 => Ok(Weekday::Mon),
        2 => Ok(Weekday::Tue),
        3 => Ok(Weekday::Wed),
        4 => Ok(Weekday::Thu),
        5 => Ok(Weekday::Fri),
        6 => Ok(Weekday::Sat),
        other => Err(RepoError::InvalidData(format!(
            "invalid weekday `{other}` in recurrence_patterns.config_weekday"
        ))),
    }
}
