// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Calendar field arithmetic
//!
//! - [`CalendarField`]: truncation to a field boundary and relative shifts
//! - [`CalendarSetter`]: absolute field assignments ("16:00", "Tuesday")
//! - [`CalendarInterval`]: relative offsets ("+28 minutes +16 seconds")
//! - [`CalendarAnchor`]: truncate, offset, then step one field per launch

use chrono::{Datelike, Months, NaiveDateTime, NaiveTime, TimeDelta, Timelike, Weekday};
use std::fmt;

/// A calendar granularity, finest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CalendarField {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    /// Weeks start on Monday
    Week,
    Month,
    Year,
}

impl fmt::Display for CalendarField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CalendarField::Millisecond => "millisecond",
            CalendarField::Second => "second",
            CalendarField::Minute => "minute",
            CalendarField::Hour => "hour",
            CalendarField::Day => "day",
            CalendarField::Week => "week",
            CalendarField::Month => "month",
            CalendarField::Year => "year",
        };
        write!(f, "{s}")
    }
}

impl CalendarField {
    /// Fields cleared when truncating to this field
    pub fn resets(self) -> &'static [CalendarField] {
        use CalendarField::*;
        match self {
            Millisecond => &[],
            Second => &[Millisecond],
            Minute => &[Millisecond, Second],
            Hour => &[Millisecond, Second, Minute],
            Day => &[Millisecond, Second, Minute, Hour],
            Week => &[Millisecond, Second, Minute, Hour, Day],
            Month => &[Millisecond, Second, Minute, Hour, Day, Week],
            Year => &[Millisecond, Second, Minute, Hour, Day, Week, Month],
        }
    }

    pub fn resets_field(self, field: CalendarField) -> bool {
        self.resets().contains(&field)
    }

    /// Start of the unit of this field containing `at`
    pub fn truncate(self, at: NaiveDateTime) -> NaiveDateTime {
        let date = at.date();
        let midnight = date.and_time(NaiveTime::MIN);
        let secs = i64::from(at.num_seconds_from_midnight());
        match self {
            CalendarField::Millisecond => {
                at - TimeDelta::nanoseconds(i64::from(at.nanosecond() % 1_000_000))
            }
            CalendarField::Second => midnight + TimeDelta::seconds(secs),
            CalendarField::Minute => midnight + TimeDelta::seconds(secs - secs % 60),
            CalendarField::Hour => midnight + TimeDelta::seconds(secs - secs % 3600),
            CalendarField::Day => midnight,
            CalendarField::Week => {
                midnight - TimeDelta::days(i64::from(date.weekday().num_days_from_monday()))
            }
            CalendarField::Month => midnight - TimeDelta::days(i64::from(date.day0())),
            CalendarField::Year => midnight - TimeDelta::days(i64::from(date.ordinal0())),
        }
    }

    /// Length of one unit, for fields that do not depend on the calendar
    pub fn fixed_length(self) -> Option<TimeDelta> {
        match self {
            CalendarField::Millisecond => Some(TimeDelta::milliseconds(1)),
            CalendarField::Second => Some(TimeDelta::seconds(1)),
            CalendarField::Minute => Some(TimeDelta::minutes(1)),
            CalendarField::Hour => Some(TimeDelta::hours(1)),
            CalendarField::Day => Some(TimeDelta::days(1)),
            CalendarField::Week => Some(TimeDelta::weeks(1)),
            CalendarField::Month | CalendarField::Year => None,
        }
    }

    /// Shift `at` by `amount` units of this field.
    ///
    /// Month and year shifts clamp the day to the target month's length.
    /// Results saturate at the representable range.
    pub fn add(self, at: NaiveDateTime, amount: i64) -> NaiveDateTime {
        let shifted = match self {
            CalendarField::Millisecond => TimeDelta::try_milliseconds(amount)
                .and_then(|d| at.checked_add_signed(d)),
            CalendarField::Second => {
                TimeDelta::try_seconds(amount).and_then(|d| at.checked_add_signed(d))
            }
            CalendarField::Minute => {
                TimeDelta::try_minutes(amount).and_then(|d| at.checked_add_signed(d))
            }
            CalendarField::Hour => {
                TimeDelta::try_hours(amount).and_then(|d| at.checked_add_signed(d))
            }
            CalendarField::Day => TimeDelta::try_days(amount).and_then(|d| at.checked_add_signed(d)),
            CalendarField::Week => {
                TimeDelta::try_weeks(amount).and_then(|d| at.checked_add_signed(d))
            }
            CalendarField::Month => add_months(at, amount),
            CalendarField::Year => add_months(at, amount.saturating_mul(12)),
        };
        shifted.unwrap_or(if amount < 0 {
            NaiveDateTime::MIN
        } else {
            NaiveDateTime::MAX
        })
    }
}

fn add_months(at: NaiveDateTime, amount: i64) -> Option<NaiveDateTime> {
    let months = Months::new(u32::try_from(amount.unsigned_abs()).ok()?);
    if amount < 0 {
        at.checked_sub_months(months)
    } else {
        at.checked_add_months(months)
    }
}

/// One absolute assignment applied by a [`CalendarSetter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue {
    Second(u32),
    Minute(u32),
    Hour(u32),
    /// Moves within the Monday-based week
    DayOfWeek(Weekday),
    /// Clamped to the month's length
    DayOfMonth(u32),
    /// 1-based; the day is clamped to the target month's length
    Month(u32),
}

/// Ordered absolute field assignments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarSetter {
    assignments: Vec<FieldValue>,
}

impl CalendarSetter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets hour, minute and second to `time`
    pub fn at_time(time: NaiveTime) -> Self {
        Self::new()
            .set(FieldValue::Hour(time.hour()))
            .set(FieldValue::Minute(time.minute()))
            .set(FieldValue::Second(time.second()))
    }

    pub fn set(mut self, value: FieldValue) -> Self {
        self.assignments.push(value);
        self
    }

    pub fn assignments(&self) -> &[FieldValue] {
        &self.assignments
    }

    /// Apply every assignment to `at`, in insertion order
    pub fn apply(&self, at: NaiveDateTime) -> NaiveDateTime {
        self.assignments
            .iter()
            .fold(at, |at, value| assign(at, *value))
    }
}

fn assign(at: NaiveDateTime, value: FieldValue) -> NaiveDateTime {
    match value {
        FieldValue::Second(s) => {
            at + TimeDelta::seconds(i64::from(s.min(59)) - i64::from(at.second()))
        }
        FieldValue::Minute(m) => {
            at + TimeDelta::minutes(i64::from(m.min(59)) - i64::from(at.minute()))
        }
        FieldValue::Hour(h) => at + TimeDelta::hours(i64::from(h.min(23)) - i64::from(at.hour())),
        FieldValue::DayOfWeek(day) => {
            let current = i64::from(at.weekday().num_days_from_monday());
            at + TimeDelta::days(i64::from(day.num_days_from_monday()) - current)
        }
        FieldValue::DayOfMonth(d) => {
            let first = CalendarField::Month.truncate(at);
            let length = (CalendarField::Month.add(first, 1) - first).num_days();
            let day = i64::from(d).clamp(1, length);
            at + TimeDelta::days(day - i64::from(at.day()))
        }
        FieldValue::Month(m) => {
            let target = i64::from(m.clamp(1, 12));
            CalendarField::Month.add(at, target - i64::from(at.month()))
        }
    }
}

/// Ordered relative field shifts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarInterval {
    parts: Vec<(CalendarField, i64)>,
}

impl CalendarInterval {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: CalendarField, amount: i64) -> Self {
        self.push(field, amount);
        self
    }

    pub fn push(&mut self, field: CalendarField, amount: i64) {
        self.parts.push((field, amount));
    }

    pub fn parts(&self) -> &[(CalendarField, i64)] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn apply(&self, at: NaiveDateTime) -> NaiveDateTime {
        self.parts
            .iter()
            .fold(at, |at, (field, amount)| field.add(at, *amount))
    }
}

/// Calendar-aligned launch rule: truncate to `base`, apply `offset`,
/// then advance one `step` per launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarAnchor {
    pub base: CalendarField,
    pub step: CalendarField,
    pub offset: CalendarInterval,
}

impl CalendarAnchor {
    pub fn new(base: CalendarField, step: CalendarField) -> Self {
        Self {
            base,
            step,
            offset: CalendarInterval::new(),
        }
    }

    pub fn with_offset(mut self, field: CalendarField, amount: i64) -> Self {
        self.offset.push(field, amount);
        self
    }

    /// Whether every offset field is cleared by truncating to `base`
    pub fn offset_is_aligned(&self) -> bool {
        self.offset
            .parts()
            .iter()
            .all(|(field, _)| self.base.resets_field(*field))
    }

    /// The launch time inside the `base` unit containing `at`
    pub fn launch_in(&self, at: NaiveDateTime) -> NaiveDateTime {
        self.offset.apply(self.base.truncate(at))
    }

    /// First launch at or after `now`, skipping launches already missed
    pub fn first_launch(&self, now: NaiveDateTime) -> NaiveDateTime {
        self.catch_up(self.launch_in(now), now)
    }

    /// The launch after `launch`
    pub fn following(&self, launch: NaiveDateTime) -> NaiveDateTime {
        self.step.add(launch, 1)
    }

    /// The launch after `launch`, skipping any that `now` has already passed
    pub fn following_from(&self, launch: NaiveDateTime, now: NaiveDateTime) -> NaiveDateTime {
        self.catch_up(self.following(launch), now)
    }

    /// Advance `launch` by whole steps until it is not before `now`
    fn catch_up(&self, mut launch: NaiveDateTime, now: NaiveDateTime) -> NaiveDateTime {
        if launch >= now {
            return launch;
        }
        // Fixed-length steps jump straight to the last launch before `now`
        if let Some(unit) = self.step.fixed_length() {
            let behind = (now - launch).num_milliseconds() / unit.num_milliseconds();
            if behind > 1 {
                launch = self.step.add(launch, behind - 1);
            }
        }
        while launch < now {
            let next = self.following(launch);
            if next <= launch {
                break;
            }
            launch = next;
        }
        launch
    }
}

#[cfg(test)]
#[path = "calendar_tests.rs"]
mod tests;
