//! Period key derivation and inverse period bounds.
//!
//! # Invariants
//! - Weekly and n-per-period keys use ISO week-year (`YYYY-Www`).
//! - Monthly and nth-weekday keys use calendar year-month (`YYYY-MM`).
//! - Yearly keys use the calendar year (`YYYY`).
//! - Years outside `0000..=9999` keep the `{:04}` form (`-001`, `10000`) and
//!   parse back to the same period.
//! - Every-n-days patterns have no period key.

use super::{CalendarError, CalendarResult};
use crate::model::pattern::Frequency;
use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveDate, NaiveTime, Utc, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

static ISO_WEEK_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(-?\d{3,})-W(\d{2})$").expect("valid iso week key regex"));
static MONTH_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(-?\d{3,})-(\d{2})$").expect("valid month key regex"));
static YEAR_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(-?\d{3,})$").expect("valid year key regex"));

/// Canonical identity of a calendar bucket.
///
/// Opaque to callers; only the calendar module interprets its contents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeriodKey(String);

impl PeriodKey {
    /// Wraps an externally supplied key (for example from a request path).
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for PeriodKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Granularity {
    IsoWeek,
    Month,
    Year,
}

fn granularity(frequency: Frequency) -> CalendarResult<Granularity> {
    match frequency {
        Frequency::Weekly | Frequency::NPerPeriod => Ok(Granularity::IsoWeek),
        Frequency::Monthly | Frequency::NthWeekdayOfMonth => Ok(Granularity::Month),
        Frequency::Yearly => Ok(Granularity::Year),
        Frequency::EveryNDays => Err(CalendarError::UnsupportedFrequency(frequency)),
    }
}

/// Maps a calendar date to the key of the period containing it.
///
/// # Errors
/// - `UnsupportedFrequency` for `Frequency::EveryNDays`.
pub fn period_key(date: NaiveDate, frequency: Frequency) -> CalendarResult<PeriodKey> {
    let key = match granularity(frequency)? {
        Granularity::IsoWeek => {
            let week = date.iso_week();
            format!("{:04}-W{:02}", week.year(), week.week())
        }
        Granularity::Month => format!("{:04}-{:02}", date.year(), date.month()),
        Granularity::Year => format!("{:04}", date.year()),
    };
    Ok(PeriodKey(key))
}

/// Returns the first and last calendar day (both inclusive) of a period.
///
/// # Errors
/// - `UnsupportedFrequency` for `Frequency::EveryNDays`.
/// - `Parse` when `key` does not match the frequency's key format or names a
///   nonexistent week/month.
pub fn period_bounds(
    key: &PeriodKey,
    frequency: Frequency,
) -> CalendarResult<(NaiveDate, NaiveDate)> {
    let parse_error = || CalendarError::Parse {
        key: key.as_str().to_string(),
        frequency,
    };

    let first = match granularity(frequency)? {
        Granularity::IsoWeek => {
            let caps = ISO_WEEK_KEY_RE.captures(key.as_str()).ok_or_else(parse_error)?;
            let year = parse_year(&caps[1]).ok_or_else(parse_error)?;
            let week = caps[2].parse::<u32>().map_err(|_| parse_error())?;
            NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).ok_or_else(parse_error)?
        }
        Granularity::Month => {
            let caps = MONTH_KEY_RE.captures(key.as_str()).ok_or_else(parse_error)?;
            let year = parse_year(&caps[1]).ok_or_else(parse_error)?;
            let month = caps[2].parse::<u32>().map_err(|_| parse_error())?;
            NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(parse_error)?
        }
        Granularity::Year => {
            let caps = YEAR_KEY_RE.captures(key.as_str()).ok_or_else(parse_error)?;
            let year = parse_year(&caps[1]).ok_or_else(parse_error)?;
            NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(parse_error)?
        }
    };

    // The last representable period is cut at NaiveDate::MAX.
    let last = match next_period_start(first, granularity(frequency)?) {
        Some(next) => next.pred_opt().ok_or_else(parse_error)?,
        None => NaiveDate::MAX,
    };
    Ok((first, last))
}

/// Returns the instant a period starts (`00:00:00` UTC on its first day).
pub fn period_start(key: &PeriodKey, frequency: Frequency) -> CalendarResult<DateTime<Utc>> {
    let (first, _) = period_bounds(key, frequency)?;
    Ok(first.and_time(NaiveTime::MIN).and_utc())
}

/// Returns the instant a period ends (`23:59:59` UTC on its last day).
pub fn period_end(key: &PeriodKey, frequency: Frequency) -> CalendarResult<DateTime<Utc>> {
    let (_, last) = period_bounds(key, frequency)?;
    Ok(end_of_day(last))
}

/// Enumerates every period whose span overlaps `[start, end]`, in order.
///
/// Returns an empty list when `end < start`.
pub fn periods_overlapping(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    frequency: Frequency,
) -> CalendarResult<Vec<PeriodKey>> {
    let granularity = granularity(frequency)?;
    if end < start {
        return Ok(Vec::new());
    }

    let last_day = end.date_naive();
    let mut cursor = align_to_period_start(start.date_naive(), granularity);
    let mut keys = Vec::new();
    while let Some(current) = cursor {
        if current > last_day {
            break;
        }
        keys.push(period_key(current, frequency)?);
        cursor = next_period_start(current, granularity);
    }
    Ok(keys)
}

/// First day of the period containing `date`.
///
/// A week starting before `NaiveDate::MIN` has no parseable key, so the
/// following week is returned instead.
fn align_to_period_start(date: NaiveDate, granularity: Granularity) -> Option<NaiveDate> {
    match granularity {
        Granularity::IsoWeek => {
            let offset = date.weekday().num_days_from_monday();
            date.checked_sub_days(Days::new(u64::from(offset)))
                .or_else(|| date.checked_add_days(Days::new(u64::from(7 - offset))))
        }
        Granularity::Month => date.with_day(1),
        Granularity::Year => date.with_ordinal(1),
    }
}

/// Parses a key year, accepting only the canonical `{:04}` rendering.
fn parse_year(text: &str) -> Option<i32> {
    let year = text.parse::<i32>().ok()?;
    (format!("{year:04}") == text).then_some(year)
}

fn next_period_start(first: NaiveDate, granularity: Granularity) -> Option<NaiveDate> {
    match granularity {
        Granularity::IsoWeek => first.checked_add_days(Days::new(7)),
        Granularity::Month => first.checked_add_months(Months::new(1)),
        Granularity::Year => first.checked_add_months(Months::new(12)),
    }
}

pub(crate) fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    // NaiveTime arithmetic wraps within the day: 00:00:00 - 1s = 23:59:59.
    date.and_time(NaiveTime::MIN - Duration::seconds(1)).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn instant(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        date(y, m, d).and_hms_opt(h, min, s).unwrap().and_utc()
    }

    #[test]
    fn weekly_key_uses_iso_week() {
        let key = period_key(date(2025, 10, 10), Frequency::Weekly).unwrap();
        assert_eq!(key.as_str(), "2025-W41");
    }

    #[test]
    fn iso_week_year_differs_from_calendar_year_at_boundaries() {
        assert_eq!(
            period_key(date(2024, 12, 30), Frequency::Weekly)
                .unwrap()
                .as_str(),
            "2025-W01"
        );
        assert_eq!(
            period_key(date(2021, 1, 3), Frequency::NPerPeriod)
                .unwrap()
                .as_str(),
            "2020-W53"
        );
    }

    #[test]
    fn monthly_and_yearly_keys() {
        assert_eq!(
            period_key(date(2025, 3, 9), Frequency::Monthly)
                .unwrap()
                .as_str(),
            "2025-03"
        );
        assert_eq!(
            period_key(date(2025, 3, 9), Frequency::NthWeekdayOfMonth)
                .unwrap()
                .as_str(),
            "2025-03"
        );
        assert_eq!(
            period_key(date(2025, 3, 9), Frequency::Yearly)
                .unwrap()
                .as_str(),
            "2025"
        );
    }

    #[test]
    fn every_n_days_has_no_period_key() {
        assert_eq!(
            period_key(date(2025, 3, 9), Frequency::EveryNDays).unwrap_err(),
            CalendarError::UnsupportedFrequency(Frequency::EveryNDays)
        );
    }

    #[test]
    fn weekly_period_ends_sunday_before_midnight() {
        let end = period_end(&PeriodKey::new("2025-W41"), Frequency::Weekly).unwrap();
        assert_eq!(end, instant(2025, 10, 12, 23, 59, 59));
    }

    #[test]
    fn week_one_contains_january_fourth() {
        let start = period_start(&PeriodKey::new("2026-W01"), Frequency::Weekly).unwrap();
        assert_eq!(start, instant(2025, 12, 29, 0, 0, 0));
    }

    #[test]
    fn monthly_period_ends_on_last_day() {
        let end = period_end(&PeriodKey::new("2024-02"), Frequency::Monthly).unwrap();
        assert_eq!(end, instant(2024, 2, 29, 23, 59, 59));
        let end = period_end(&PeriodKey::new("2025-12"), Frequency::NthWeekdayOfMonth).unwrap();
        assert_eq!(end, instant(2025, 12, 31, 23, 59, 59));
    }

    #[test]
    fn yearly_period_ends_on_new_years_eve() {
        let end = period_end(&PeriodKey::new("2025"), Frequency::Yearly).unwrap();
        assert_eq!(end, instant(2025, 12, 31, 23, 59, 59));
    }

    #[test]
    fn malformed_keys_fail_to_parse() {
        for (key, frequency) in [
            ("2025-10", Frequency::Weekly),
            ("2025-W41", Frequency::Monthly),
            ("2025-13", Frequency::Monthly),
            ("2025-W54", Frequency::NPerPeriod),
            ("25", Frequency::Yearly),
            ("2025-01", Frequency::Yearly),
            ("02025", Frequency::Yearly),
            ("+2025", Frequency::Yearly),
            ("-1-06", Frequency::Monthly),
        ] {
            let err = period_end(&PeriodKey::new(key), frequency).unwrap_err();
            assert!(
                matches!(err, CalendarError::Parse { .. }),
                "{key} should not parse as {frequency}"
            );
        }
    }

    #[test]
    fn overlapping_weeks_cover_partial_edges() {
        let keys = periods_overlapping(
            instant(2025, 10, 8, 12, 0, 0),
            instant(2025, 10, 14, 8, 0, 0),
            Frequency::Weekly,
        )
        .unwrap();
        let keys: Vec<&str> = keys.iter().map(PeriodKey::as_str).collect();
        assert_eq!(keys, vec!["2025-W41", "2025-W42"]);
    }

    #[test]
    fn overlapping_months_and_years() {
        let months = periods_overlapping(
            instant(2025, 11, 30, 0, 0, 0),
            instant(2026, 1, 1, 0, 0, 0),
            Frequency::Monthly,
        )
        .unwrap();
        assert_eq!(
            months.iter().map(PeriodKey::as_str).collect::<Vec<_>>(),
            vec!["2025-11", "2025-12", "2026-01"]
        );

        let years = periods_overlapping(
            instant(2024, 6, 1, 0, 0, 0),
            instant(2025, 2, 1, 0, 0, 0),
            Frequency::Yearly,
        )
        .unwrap();
        assert_eq!(
            years.iter().map(PeriodKey::as_str).collect::<Vec<_>>(),
            vec!["2024", "2025"]
        );
    }

    #[test]
    fn inverted_range_is_empty() {
        let keys = periods_overlapping(
            instant(2025, 10, 14, 0, 0, 0),
            instant(2025, 10, 1, 0, 0, 0),
            Frequency::Weekly,
        )
        .unwrap();
        assert!(keys.is_empty());
    }

    #[test]
    fn years_beyond_four_digits_parse_back() {
        assert_eq!(parse_year("10000"), Some(10000));
        assert_eq!(parse_year("-001"), Some(-1));
        assert_eq!(parse_year("0025"), Some(25));
        assert_eq!(parse_year("250"), None);
        assert_eq!(
            period_bounds(&PeriodKey::new("-001-06"), Frequency::Monthly).unwrap(),
            (date(-1, 6, 1), date(-1, 6, 30))
        );
    }

    #[test]
    fn last_representable_period_ends_at_max_date() {
        let key = period_key(NaiveDate::MAX, Frequency::Monthly).unwrap();
        assert_eq!(
            period_end(&key, Frequency::Monthly).unwrap(),
            end_of_day(NaiveDate::MAX)
        );
        assert_eq!(
            end_of_day(NaiveDate::MAX).time(),
            NaiveTime::from_hms_opt(23, 59, 59).unwrap()
        );
    }

    #[test]
    fn week_alignment_near_min_date_skips_unrepresentable_week() {
        let aligned = align_to_period_start(NaiveDate::MIN, Granularity::IsoWeek).unwrap();
        assert_eq!(aligned.weekday(), Weekday::Mon);
        assert!(aligned >= NaiveDate::MIN);
        assert!(aligned - NaiveDate::MIN < Duration::days(7));
    }
}
