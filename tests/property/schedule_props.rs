//! Property tests for reset boundaries and reset decisions.
//!
//! 1. The daily boundary is a cutover instant at or before `now`, and the
//!    next cutover is after `now`.
//! 2. The weekly boundary falls on the reset weekday, within the six days
//!    before the daily boundary.
//! 3. The boundaries do not depend on the zone `now` is expressed in.
//! 4. Re-deciding with the advanced cursor never fires again.
//! 5. Counters always reset to exactly their limit.

use chrono::{DateTime, Datelike, FixedOffset, TimeDelta, Timelike, Utc, Weekday};
use proptest::prelude::*;
use questlog_proto::catalog::{self, Catalog};
use questlog_proto::model::{Entity, ResetCursor, ResetScope, TaskId, TaskValue};
use questlog_proto::reset::{apply_reset, decide_resets};
use questlog_proto::schedule::{ResetSchedule, compute_boundaries};

/// Any instant between 2000 and 2100.
fn arb_now() -> impl Strategy<Value = DateTime<Utc>> {
    (946_684_800_i64..4_102_444_800_i64)
        .prop_map(|secs| DateTime::from_timestamp(secs, 0).unwrap_or_default())
}

fn arb_offset() -> impl Strategy<Value = FixedOffset> {
    (-12 * 3600..=14 * 3600_i32)
        .prop_map(|secs| FixedOffset::east_opt(secs).unwrap_or_else(|| FixedOffset::east_opt(0).unwrap()))
}

fn arb_weekday() -> impl Strategy<Value = Weekday> {
    prop::sample::select(vec![
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ])
}

fn arb_cursor_field() -> impl Strategy<Value = Option<DateTime<FixedOffset>>> {
    prop::option::of(arb_now().prop_map(|t| t.fixed_offset()))
}

proptest! {
    #[test]
    fn daily_boundary_is_most_recent_cutover(now in arb_now()) {
        let b = compute_boundaries(&now);
        prop_assert!(b.daily <= now);
        prop_assert!(b.daily + TimeDelta::days(1) > now);
        prop_assert_eq!(b.daily.hour(), 6);
        prop_assert_eq!(b.daily.minute(), 0);
        prop_assert_eq!(b.daily.offset().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn weekly_boundary_is_monday_before_daily(now in arb_now()) {
        let b = compute_boundaries(&now);
        prop_assert_eq!(b.weekly.weekday(), Weekday::Mon);
        prop_assert_eq!(b.weekly.hour(), 6);
        prop_assert!(b.weekly <= b.daily);
        prop_assert!(b.daily - b.weekly < TimeDelta::days(7));
    }

    #[test]
    fn custom_schedule_holds_same_shape(
        now in arb_now(),
        offset_hours in -12i32..=14,
        hour in 0u32..24,
        day in arb_weekday(),
    ) {
        let schedule = ResetSchedule::new(offset_hours, hour, day).unwrap();
        let b = schedule.boundaries(&now);
        prop_assert!(b.daily <= now);
        prop_assert!(b.daily + TimeDelta::days(1) > now);
        prop_assert_eq!(b.daily.hour(), hour);
        prop_assert_eq!(b.weekly.weekday(), day);
        prop_assert!(b.daily - b.weekly < TimeDelta::days(7));
    }

    #[test]
    fn caller_zone_is_irrelevant(now in arb_now(), offset in arb_offset()) {
        prop_assert_eq!(compute_boundaries(&now), compute_boundaries(&now.with_timezone(&offset)));
    }

    #[test]
    fn decision_is_idempotent(
        now in arb_now(),
        daily in arb_cursor_field(),
        weekly in arb_cursor_field(),
    ) {
        let b = compute_boundaries(&now);
        let cursor = ResetCursor { last_daily_reset: daily, last_weekly_reset: weekly };
        let first = decide_resets(&cursor, &b);
        let second = decide_resets(&first.new_cursor, &b);
        prop_assert!(!second.any());
        prop_assert_eq!(&second.new_cursor, &first.new_cursor);
        // Never moves backwards.
        if let (Some(old), Some(new)) = (cursor.last_daily_reset, first.new_cursor.last_daily_reset) {
            prop_assert!(new >= old);
        }
    }

    #[test]
    fn counters_reset_to_limit(value in 0u32..=20, present in any::<bool>()) {
        let list = catalog::default_list(ResetScope::Daily);
        let catalog = Catalog::new(ResetScope::Daily, &list);
        let mut entity = Entity::new("Mari");
        if present {
            entity.task_state.insert(TaskId::new("daily-black-hole"), TaskValue::Count(value));
        }
        let mut entities = vec![entity];
        apply_reset(&mut entities, &catalog);
        prop_assert_eq!(
            entities[0].task_state.get(&TaskId::new("daily-black-hole")),
            Some(&TaskValue::Count(3))
        );
    }
}
