use cadence_core::{
    compute_start_time, EngineConfig, Event, EventRepository, Frequency, InMemoryStore,
    InstanceService, PatternRepository, PatternService, PatternUpdate, PeriodKey, Recurrence,
    RecurrenceError, RecurrencePattern, VirtualEventId, YearlyRule,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    date(y, m, d).and_hms_opt(h, min, 0).unwrap().and_utc()
}

fn service(store: &InMemoryStore) -> InstanceService<&InMemoryStore, &InMemoryStore> {
    InstanceService::new(store, store, EngineConfig::default())
}

fn stored_pattern(
    store: &InMemoryStore,
    recurrence: Recurrence,
    flexible: bool,
) -> RecurrencePattern {
    let mut pattern = RecurrencePattern::new("Review budget", recurrence, 30, at(2025, 1, 1, 8, 0));
    pattern.flexible_scheduling = flexible;
    store.create_pattern(&pattern).unwrap();
    pattern
}

fn manual_instance(store: &InMemoryStore, pattern: &RecurrencePattern, key: &str) {
    let mut event = Event::new(pattern.title.clone(), 30, Utc::now());
    event.pattern_id = Some(pattern.id);
    event.period_key = Some(PeriodKey::new(key));
    store.create_event(&event).unwrap();
}

#[test]
fn generate_for_period_is_idempotent() {
    let store = InMemoryStore::new();
    let service = service(&store);
    let pattern = stored_pattern(&store, Recurrence::Weekly, true);
    let key = PeriodKey::new("2025-W41");

    let first = service
        .generate_for_period(&pattern, &key, date(2025, 10, 10))
        .unwrap()
        .unwrap();
    let second = service
        .generate_for_period(&pattern, &key, date(2025, 10, 10))
        .unwrap();

    assert!(second.is_none());
    let stored = store.events_for_pattern(pattern.id);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, first.id);
}

#[test]
fn generated_instance_carries_period_metadata() {
    let store = InMemoryStore::new();
    let service = service(&store);
    let mut pattern = RecurrencePattern::new("Call parents", Recurrence::Weekly, 45, Utc::now());
    pattern.notes = Some("ask about the garden".to_string());
    store.create_pattern(&pattern).unwrap();
    let key = PeriodKey::new("2025-W41");

    let event = service
        .generate_for_period(&pattern, &key, date(2025, 10, 10))
        .unwrap()
        .unwrap();

    assert_eq!(event.title, "Call parents");
    assert_eq!(event.duration_minutes, 45);
    assert_eq!(event.pattern_id, Some(pattern.id));
    assert_eq!(event.period_key, Some(key));
    assert_eq!(event.category.as_deref(), Some("recurring"));
    assert!(event.is_time_bound);
    assert_eq!(event.deadline, Some(at(2025, 10, 12, 23, 59) + chrono::Duration::seconds(59)));
    assert_eq!(event.notes.as_deref(), Some("ask about the garden"));
    assert_eq!(event.start_time, None, "flexible patterns stay unscheduled");
}

#[test]
fn inflexible_weekly_uses_reference_day_at_default_hour() {
    let store = InMemoryStore::new();
    let service = service(&store);
    let pattern = stored_pattern(&store, Recurrence::Weekly, false);

    let event = service
        .generate_for_period(&pattern, &PeriodKey::new("2025-W41"), date(2025, 10, 8))
        .unwrap()
        .unwrap();
    assert_eq!(event.start_time, Some(at(2025, 10, 8, 19, 0)));
}

#[test]
fn fixed_start_time_replaces_default_hour() {
    let store = InMemoryStore::new();
    let service = service(&store);
    let mut pattern = RecurrencePattern::new("Standup", Recurrence::Monthly, 15, Utc::now());
    pattern.flexible_scheduling = false;
    pattern.start_time = Some(NaiveTime::from_hms_opt(7, 30, 0).unwrap());
    store.create_pattern(&pattern).unwrap();

    let event = service
        .generate_for_period(&pattern, &PeriodKey::new("2025-10"), date(2025, 10, 3))
        .unwrap()
        .unwrap();
    assert_eq!(event.start_time, Some(at(2025, 10, 3, 7, 30)));
}

#[test]
fn n_per_period_allows_up_to_target_instances() {
    let store = InMemoryStore::new();
    let service = service(&store);
    let pattern = stored_pattern(&store, Recurrence::NPerPeriod { target: 3 }, true);
    let key = PeriodKey::new("2025-W41");
    manual_instance(&store, &pattern, "2025-W41");
    manual_instance(&store, &pattern, "2025-W41");

    let third = service
        .generate_for_period(&pattern, &key, date(2025, 10, 10))
        .unwrap();
    assert!(third.is_some(), "two of three completions leave room for one more");

    let fourth = service
        .generate_for_period(&pattern, &key, date(2025, 10, 10))
        .unwrap();
    assert!(fourth.is_none());
    assert_eq!(store.events_for_pattern(pattern.id).len(), 3);
}

#[test]
fn leap_day_yearly_pattern_falls_back_in_common_years() {
    let config = EngineConfig::default();
    let pattern = RecurrencePattern::new(
        "Leap birthday",
        Recurrence::Yearly {
            rule: YearlyRule::Date { month: 2, day: 29 },
        },
        60,
        Utc::now(),
    );

    let common = compute_start_time(&pattern, date(2025, 6, 1), &config).unwrap();
    assert_eq!(common, at(2025, 2, 28, 19, 0));

    let leap = compute_start_time(&pattern, date(2024, 6, 1), &config).unwrap();
    assert_eq!(leap, at(2024, 2, 29, 19, 0));
}

#[test]
fn yearly_nth_weekday_rule_resolves_in_reference_year() {
    let pattern = RecurrencePattern::new(
        "Mother's day",
        Recurrence::Yearly {
            rule: YearlyRule::NthWeekday {
                month: 5,
                weekday: Weekday::Sun,
                occurrence: 2,
            },
        },
        60,
        Utc::now(),
    );
    let start = compute_start_time(&pattern, date(2025, 1, 15), &EngineConfig::default()).unwrap();
    assert_eq!(start, at(2025, 5, 11, 19, 0));
}

#[test]
fn nth_weekday_of_month_resolves_in_reference_month() {
    let pattern = RecurrencePattern::new(
        "Book club",
        Recurrence::NthWeekdayOfMonth {
            weekday: Weekday::Fri,
            occurrence: -1,
        },
        90,
        Utc::now(),
    );
    let start = compute_start_time(&pattern, date(2025, 2, 3), &EngineConfig::default()).unwrap();
    assert_eq!(start, at(2025, 2, 28, 19, 0));
}

#[test]
fn every_n_days_cannot_be_generated_by_period() {
    let store = InMemoryStore::new();
    let service = service(&store);
    let pattern = stored_pattern(&store, Recurrence::EveryNDays { interval_days: 3 }, true);

    let err = service
        .generate_for_period(&pattern, &PeriodKey::new("2025-W41"), date(2025, 10, 10))
        .unwrap_err();
    assert!(matches!(err, RecurrenceError::UnsupportedOperation { .. }));

    let err = service
        .generate_for_current_period(pattern.id, at(2025, 10, 10, 9, 0))
        .unwrap_err();
    assert!(matches!(err, RecurrenceError::UnsupportedOperation { .. }));
    assert_eq!(err.status_code(), 400);
}

#[test]
fn mismatched_period_key_is_a_parse_error() {
    let store = InMemoryStore::new();
    let service = service(&store);
    let pattern = stored_pattern(&store, Recurrence::Monthly, true);

    let err = service
        .generate_for_period(&pattern, &PeriodKey::new("2025-W41"), date(2025, 10, 10))
        .unwrap_err();
    assert!(matches!(err, RecurrenceError::Parse { .. }));
    assert!(store.events().is_empty());
}

#[test]
fn current_period_generation_skips_missing_and_inactive_patterns() {
    let store = InMemoryStore::new();
    let service = service(&store);
    let now = at(2025, 10, 10, 9, 0);

    assert!(service
        .generate_for_current_period(uuid::Uuid::new_v4(), now)
        .unwrap()
        .is_none());

    let mut inactive = RecurrencePattern::new("Paused", Recurrence::Weekly, 10, now);
    inactive.active = false;
    store.create_pattern(&inactive).unwrap();
    assert!(service
        .generate_for_current_period(inactive.id, now)
        .unwrap()
        .is_none());

    let active = stored_pattern(&store, Recurrence::Weekly, true);
    let event = service
        .generate_for_current_period(active.id, now)
        .unwrap()
        .unwrap();
    assert_eq!(event.period_key, Some(PeriodKey::new("2025-W41")));
}

#[test]
fn batch_continues_past_failing_patterns() {
    let store = InMemoryStore::new();
    let service = service(&store);

    let healthy = stored_pattern(
        &store,
        Recurrence::NthWeekdayOfMonth {
            weekday: Weekday::Mon,
            occurrence: 1,
        },
        false,
    );
    // February 2025 has only four Saturdays.
    let mut broken = RecurrencePattern::new(
        "Fifth Saturday hike",
        Recurrence::NthWeekdayOfMonth {
            weekday: Weekday::Sat,
            occurrence: 5,
        },
        120,
        Utc::now(),
    );
    broken.flexible_scheduling = false;
    store.seed_pattern(broken.clone());

    let report = service
        .generate_for_frequency_batch(Frequency::NthWeekdayOfMonth, date(2025, 2, 10))
        .unwrap();

    assert_eq!(report.period_key, PeriodKey::new("2025-02"));
    assert_eq!(report.created.len(), 1);
    assert_eq!(report.created[0].pattern_id, Some(healthy.id));
    assert_eq!(report.created[0].start_time, Some(at(2025, 2, 3, 19, 0)));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].pattern_id, broken.id);

    let rerun = service
        .generate_for_frequency_batch(Frequency::NthWeekdayOfMonth, date(2025, 2, 20))
        .unwrap();
    assert!(rerun.created.is_empty());
    assert_eq!(rerun.skipped, vec![healthy.id]);
}

#[test]
fn batch_only_touches_active_patterns_of_the_frequency() {
    let store = InMemoryStore::new();
    let service = service(&store);
    let weekly = stored_pattern(&store, Recurrence::Weekly, true);
    stored_pattern(&store, Recurrence::Monthly, true);
    let mut paused = RecurrencePattern::new("Paused", Recurrence::Weekly, 10, Utc::now());
    paused.active = false;
    store.create_pattern(&paused).unwrap();

    let report = service
        .generate_for_frequency_batch(Frequency::Weekly, date(2025, 10, 10))
        .unwrap();
    assert_eq!(report.created.len(), 1);
    assert_eq!(report.created[0].pattern_id, Some(weekly.id));
    assert!(report.failures.is_empty());

    let err = service
        .generate_for_frequency_batch(Frequency::EveryNDays, date(2025, 10, 10))
        .unwrap_err();
    assert!(matches!(err, RecurrenceError::UnsupportedOperation { .. }));
}

#[test]
fn next_suggested_date_counts_from_last_completion() {
    let store = InMemoryStore::new();
    let service = service(&store);
    let pattern = stored_pattern(&store, Recurrence::EveryNDays { interval_days: 3 }, true);
    let now = at(2025, 10, 10, 12, 0);

    assert_eq!(service.next_suggested_date(pattern.id, now).unwrap(), now);

    for start in [at(2025, 10, 2, 8, 0), at(2025, 10, 6, 18, 0), at(2025, 10, 20, 8, 0)] {
        let mut done = Event::new("Water plants", 10, start);
        done.pattern_id = Some(pattern.id);
        done.start_time = Some(start);
        store.create_event(&done).unwrap();
    }

    assert_eq!(
        service.next_suggested_date(pattern.id, now).unwrap(),
        at(2025, 10, 9, 18, 0)
    );

    let weekly = stored_pattern(&store, Recurrence::Weekly, true);
    assert!(matches!(
        service.next_suggested_date(weekly.id, now),
        Err(RecurrenceError::UnsupportedOperation { .. })
    ));
}

#[test]
fn committing_a_virtual_event_persists_it_once() {
    let store = InMemoryStore::new();
    let service = service(&store);
    let pattern = stored_pattern(&store, Recurrence::Monthly, true);
    let id: VirtualEventId = format!("virtual-{}-2025-11", pattern.id).parse().unwrap();

    let event = service
        .commit_virtual_event(&id, at(2025, 11, 4, 10, 0))
        .unwrap();
    assert_eq!(event.start_time, Some(at(2025, 11, 4, 10, 0)));
    assert_eq!(event.period_key, Some(PeriodKey::new("2025-11")));
    assert_eq!(event.deadline, Some(at(2025, 11, 30, 23, 59) + chrono::Duration::seconds(59)));

    let err = service
        .commit_virtual_event(&id, at(2025, 11, 5, 10, 0))
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(err.status_code(), 409);
}

#[test]
fn committing_for_unknown_pattern_is_not_found() {
    let store = InMemoryStore::new();
    let service = service(&store);
    let id = VirtualEventId::new(uuid::Uuid::new_v4(), PeriodKey::new("2025-W41"));
    let err = service
        .commit_virtual_event(&id, at(2025, 10, 8, 10, 0))
        .unwrap_err();
    assert!(matches!(err, RecurrenceError::NotFound(_)));
}

#[test]
fn pattern_creation_generates_initial_instance() {
    let store = InMemoryStore::new();
    let patterns = PatternService::new(service(&store));
    let now = at(2025, 10, 10, 9, 0);

    let created = patterns
        .create_pattern(RecurrencePattern::new("Laundry", Recurrence::Weekly, 60, now), now)
        .unwrap();
    let instance = created.initial_instance.unwrap();
    assert_eq!(instance.period_key, Some(PeriodKey::new("2025-W41")));

    let interval = patterns
        .create_pattern(
            RecurrencePattern::new(
                "Haircut",
                Recurrence::EveryNDays { interval_days: 30 },
                30,
                now,
            ),
            now,
        )
        .unwrap();
    assert!(interval.initial_instance.is_none());

    let err = patterns
        .create_pattern(RecurrencePattern::new(" ", Recurrence::Weekly, 60, now), now)
        .unwrap_err();
    assert!(matches!(err, RecurrenceError::Validation(_)));
}

#[test]
fn pattern_update_changes_only_mutable_fields() {
    let store = InMemoryStore::new();
    let patterns = PatternService::new(service(&store));
    let now = at(2025, 10, 10, 9, 0);
    let created = patterns
        .create_pattern(
            RecurrencePattern::new("Laundry", Recurrence::NPerPeriod { target: 2 }, 60, now),
            now,
        )
        .unwrap();

    let updated = patterns
        .update_pattern(
            created.pattern.id,
            &PatternUpdate {
                title: Some("Big laundry".to_string()),
                duration_minutes: Some(90),
                active: Some(false),
            },
            at(2025, 10, 11, 9, 0),
        )
        .unwrap();
    assert_eq!(updated.title, "Big laundry");
    assert_eq!(updated.duration_minutes, 90);
    assert!(!updated.active);
    assert_eq!(updated.recurrence, Recurrence::NPerPeriod { target: 2 });

    let reloaded = patterns.get_pattern(created.pattern.id).unwrap().unwrap();
    assert_eq!(reloaded, updated);

    let missing = patterns
        .update_pattern(uuid::Uuid::new_v4(), &PatternUpdate::default(), now)
        .unwrap_err();
    assert_eq!(missing.status_code(), 404);
}
