//! Time-zone aware recurrence expansion
//!
//! [`RuleExpander`] walks the local calendar of the series day by day,
//! starting at the series start, and keeps the days the rule selects. Every
//! occurrence keeps the local wall-clock time of the series start, so a
//! daily 09:00 meeting stays at 09:00 across a DST change.
//!
//! Limits are applied from the series start, not from the window:
//! - `Count(n)` stops after the n-th occurrence
//! - `Until(date)` stops after the last occurrence on that local date

use calbridge_core::RecurrenceExpander;
use calbridge_domain::{Frequency, RecurrenceRule, TimeWindow};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Upper bound on the number of days scanned for one expansion.
pub const DEFAULT_HORIZON_DAYS: i64 = 366 * 100;

/// Expander for daily, weekly, monthly and yearly rules.
#[derive(Debug, Clone, Copy)]
pub struct RuleExpander {
    horizon_days: i64,
}

impl Default for RuleExpander {
    fn default() -> Self {
        Self { horizon_days: DEFAULT_HORIZON_DAYS }
    }
}

impl RuleExpander {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop scanning `days` after the series start.
    pub fn with_horizon_days(days: i64) -> Self {
        Self { horizon_days: days.max(0) }
    }

    /// Number of occurrences of the series that start before `before`.
    pub fn count_before(
        &self,
        rule: &RecurrenceRule,
        series_start: DateTime<Utc>,
        zone: Tz,
        before: DateTime<Utc>,
    ) -> usize {
        let window = TimeWindow { start: None, end: Some(before) };
        self.expand(rule, series_start, zone, &window, usize::MAX).len()
    }
}

impl RecurrenceExpander for RuleExpander {
    fn expand(
        &self,
        rule: &RecurrenceRule,
        series_start: DateTime<Utc>,
        zone: Tz,
        window: &TimeWindow,
        max: usize,
    ) -> Vec<DateTime<Utc>> {
        let mut starts = Vec::new();
        if max == 0 {
            return starts;
        }

        let local_start = series_start.with_timezone(&zone);
        let first_day = local_start.date_naive();
        let wall_clock = local_start.time();
        let interval = i64::from(rule.interval.max(1));
        let until = rule.limit_date();
        let count = rule.limit_count();
        let mut generated: u32 = 0;

        for offset in 0..=self.horizon_days {
            let Some(day) = first_day.checked_add_signed(Duration::days(offset)) else {
                break;
            };
            if until.is_some_and(|last| day > last) {
                break;
            }
            if offset > 0 && !selects(rule, first_day, day, interval) {
                continue;
            }
            let Some(at) = local_instant(zone, day, wall_clock) else {
                continue;
            };

            generated += 1;
            if count.is_some_and(|limit| generated > limit) {
                break;
            }
            if window.end.is_some_and(|end| at >= end) {
                break;
            }
            if window.contains(at) {
                starts.push(at);
                if starts.len() >= max {
                    break;
                }
            }
        }

        starts
    }
}

/// True when the rule produces an occurrence on local date `day`.
fn selects(rule: &RecurrenceRule, first_day: NaiveDate, day: NaiveDate, interval: i64) -> bool {
    match rule.frequency {
        Frequency::Daily => (day - first_day).num_days() % interval == 0,
        Frequency::Weekly => {
            let weeks = (week_start(day) - week_start(first_day)).num_days() / 7;
            let on_day = if rule.days_of_week.is_empty() {
                day.weekday() == first_day.weekday()
            } else {
                rule.days_of_week.contains(&day.weekday())
            };
            weeks % interval == 0 && on_day
        }
        Frequency::Monthly => {
            let months = i64::from(day.year() - first_day.year()) * 12
                + i64::from(day.month())
                - i64::from(first_day.month());
            let on_day = if rule.days_of_month.is_empty() {
                day.day() == first_day.day()
            } else {
                rule.days_of_month.contains(&day.day())
            };
            months % interval == 0 && on_day
        }
        Frequency::Yearly => {
            let years = i64::from(day.year() - first_day.year());
            years % interval == 0 && day.month() == first_day.month() && day.day() == first_day.day()
        }
    }
}

/// Monday of the week containing `day`.
fn week_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(i64::from(day.weekday().num_days_from_monday()))
}

/// UTC instant of `time` on local `day`; a wall-clock time skipped by a DST
/// gap moves one hour later.
fn local_instant(zone: Tz, day: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    let naive = day.and_time(time);
    zone.from_local_datetime(&naive)
        .earliest()
        .or_else(|| zone.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|local| local.with_timezone(&Utc))
}
