//! Nth-weekday-of-month resolution.

use super::{CalendarError, CalendarResult};
use chrono::{Datelike, Months, NaiveDate, Weekday};

/// Occurrence value selecting the last matching weekday of a month.
pub const LAST_OCCURRENCE: i8 = -1;

/// Returns the number of days in the given month, or `None` for an invalid month.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = first.checked_add_months(Months::new(1))?;
    Some(next.signed_duration_since(first).num_days() as u32)
}

/// Finds the `occurrence`-th `weekday` of `year`/`month`.
///
/// `occurrence == LAST_OCCURRENCE` selects the last match; positive values
/// select the 1-based match in ascending order.
///
/// # Errors
/// - `NoMatch` when the month yields no matching date at all.
/// - `OutOfRange` when the month has fewer matches than requested, or when
///   `occurrence` is neither positive nor `LAST_OCCURRENCE`.
pub fn nth_weekday(
    year: i32,
    month: u32,
    weekday: Weekday,
    occurrence: i8,
) -> CalendarResult<NaiveDate> {
    let matches: Vec<NaiveDate> = (1..=days_in_month(year, month).unwrap_or(0))
        .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
        .filter(|date| date.weekday() == weekday)
        .collect();

    if matches.is_empty() {
        return Err(CalendarError::NoMatch { year, month });
    }

    let out_of_range = || CalendarError::OutOfRange {
        year,
        month,
        occurrence,
        available: matches.len(),
    };

    if occurrence == LAST_OCCURRENCE {
        return matches.last().copied().ok_or_else(out_of_range);
    }
    if occurrence < 1 {
        return Err(out_of_range());
    }

    matches
        .get(usize::from(occurrence.unsigned_abs()) - 1)
        .copied()
        .ok_or_else(out_of_range)
}
