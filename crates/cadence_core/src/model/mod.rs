//! Domain model for recurring obligations and their occurrences.
//!
//! # Responsibility
//! - Define recurrence patterns with frequency-specific configuration.
//! - Define persisted events and transient virtual projections.
//!
//! # Invariants
//! - Frequency-specific configuration is carried by the `Recurrence`
//!   variant itself, so a pattern can never hold a mismatched config.
//! - Persisted and virtual occurrences are distinct types joined only by
//!   `CalendarEntry`.

pub mod event;
pub mod pattern;
