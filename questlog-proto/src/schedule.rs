//! Reset boundary calculation.
//!
//! All boundaries are computed in one fixed UTC offset, independent of the
//! caller's local zone. The current instant is always a parameter; nothing
//! in this module reads the system clock.

use chrono::{
    DateTime, Datelike, Days, FixedOffset, NaiveDate, NaiveTime, Offset, TimeDelta, TimeZone, Utc,
    Weekday,
};

use crate::model::ResetScope;

/// Default fixed offset of the reset zone (UTC+9).
pub const DEFAULT_UTC_OFFSET_SECS: i32 = 9 * 3600;

/// Default hour of day at which both resets happen.
pub const DEFAULT_CUTOVER_HOUR: u32 = 6;

/// Errors produced when building a [`ResetSchedule`] from raw settings.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// Offset outside the range a fixed zone can express.
    #[error("utc offset out of range: {0} hours")]
    OffsetOutOfRange(i32),
    /// Cutover hour not in `0..24`.
    #[error("cutover hour out of range: {0}")]
    HourOutOfRange(u32),
}

/// Most recent reset instants at or before some "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundaries {
    /// Most recent daily cutover.
    pub daily: DateTime<FixedOffset>,
    /// Most recent weekly cutover, never after `daily`.
    pub weekly: DateTime<FixedOffset>,
}

impl Boundaries {
    /// Boundary for the given scope.
    #[must_use]
    pub const fn get(&self, scope: ResetScope) -> DateTime<FixedOffset> {
        match scope {
            ResetScope::Daily => self.daily,
            ResetScope::Weekly => self.weekly,
        }
    }
}

/// Zone, cutover time and weekly reset day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetSchedule {
    offset: FixedOffset,
    cutover: NaiveTime,
    weekly_day: Weekday,
}

impl Default for ResetSchedule {
    fn default() -> Self {
        Self {
            offset: FixedOffset::east_opt(DEFAULT_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix()),
            cutover: NaiveTime::from_hms_opt(DEFAULT_CUTOVER_HOUR, 0, 0).unwrap_or(NaiveTime::MIN),
            weekly_day: Weekday::Mon,
        }
    }
}

impl ResetSchedule {
    /// Builds a schedule from whole-hour settings.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError`] if the offset or hour is out of range.
    pub fn new(utc_offset_hours: i32, cutover_hour: u32, weekly_day: Weekday) -> Result<Self, ScheduleError> {
        let offset = utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or(ScheduleError::OffsetOutOfRange(utc_offset_hours))?;
        let cutover = NaiveTime::from_hms_opt(cutover_hour, 0, 0)
            .ok_or(ScheduleError::HourOutOfRange(cutover_hour))?;
        Ok(Self {
            offset,
            cutover,
            weekly_day,
        })
    }

    /// Offset of the reset zone.
    #[must_use]
    pub const fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Time of day of the cutover, in the reset zone.
    #[must_use]
    pub const fn cutover(&self) -> NaiveTime {
        self.cutover
    }

    /// Day of the week on which the weekly reset happens.
    #[must_use]
    pub const fn weekly_day(&self) -> Weekday {
        self.weekly_day
    }

    /// Computes the most recent daily and weekly boundaries at or before `now`.
    ///
    /// A `now` exactly on the cutover yields that same instant.
    pub fn boundaries<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Boundaries {
        let local = now.with_timezone(&self.offset);
        let mut day = local.date_naive();
        if local.time() < self.cutover {
            day = day.pred_opt().unwrap_or(day);
        }

        let back = days_since(day.weekday(), self.weekly_day);
        let week_start = day.checked_sub_days(Days::new(back)).unwrap_or(day);

        Boundaries {
            daily: self.at_cutover(day),
            weekly: self.at_cutover(week_start),
        }
    }

    /// The cutover instant on a calendar day of the reset zone.
    fn at_cutover(&self, day: NaiveDate) -> DateTime<FixedOffset> {
        let local = day.and_time(self.cutover);
        let utc = local - TimeDelta::seconds(i64::from(self.offset.local_minus_utc()));
        self.offset.from_utc_datetime(&utc)
    }
}

/// Computes boundaries with the default UTC+9, 06:00, Monday schedule.
pub fn compute_boundaries<Tz: TimeZone>(now: &DateTime<Tz>) -> Boundaries {
    ResetSchedule::default().boundaries(now)
}

/// Days to step back from `from` to reach the previous (or same) `target`.
fn days_since(from: Weekday, target: Weekday) -> u64 {
    u64::from((from.num_days_from_monday() + 7 - target.num_days_from_monday()) % 7)
}

/// Parses a weekday name such as `mon` or `Monday`.
///
/// # Errors
///
/// Returns the unrecognised input.
pub fn parse_weekday(s: &str) -> Result<Weekday, String> {
    s.trim()
        .parse::<Weekday>()
        .map_err(|_| format!("unknown weekday: {s}"))
}
