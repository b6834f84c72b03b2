//! Core recurrence engine for Cadence.
//! This crate is the single source of truth for recurrence invariants.

pub mod calendar;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use calendar::{
    nth_weekday, period_bounds, period_end, period_key, period_start, periods_overlapping,
    CalendarError, PeriodKey, LAST_OCCURRENCE,
};
pub use config::{load_config, CadenceConfig, ConfigError, EngineConfig, LoggingConfig};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::event::{CalendarEntry, Event, EventId, VirtualEvent, VirtualEventId};
pub use model::pattern::{
    Frequency, PatternId, PatternUpdate, PatternValidationError, Recurrence, RecurrencePattern,
    YearlyRule,
};
pub use repo::event_repo::{EventRepository, SqliteEventRepository};
pub use repo::memory::InMemoryStore;
pub use repo::pattern_repo::{PatternListQuery, PatternRepository, SqlitePatternRepository};
pub use repo::{RepoError, RepoResult};
pub use service::instance_service::{compute_start_time, BatchFailure, BatchReport, InstanceService};
pub use service::pattern_service::{PatternCreation, PatternService};
pub use service::satisfaction::SatisfactionOracle;
pub use service::virtual_events::VirtualEventService;
pub use service::{RecurrenceError, RecurrenceResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
