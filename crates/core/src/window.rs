// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Time windows: when a schedule level is active
//!
//! A window answers three questions about the calendar and keeps no state
//! of its own. `None` from `next_start`/`next_stop` means the window never
//! opens again / never closes.

use crate::calendar::{CalendarField, CalendarSetter, FieldValue};
use chrono::{NaiveDateTime, NaiveTime, Weekday};

/// Calendar rule deciding when a level's children run
pub trait TimeWindow: Send + Sync {
    /// Start of the window containing `at`, or of the last one before it
    fn ambient_start(&self, at: NaiveDateTime) -> Option<NaiveDateTime>;

    /// First opening strictly after `after`
    fn next_start(&self, after: NaiveDateTime) -> Option<NaiveDateTime>;

    /// First closing strictly after `after`
    fn next_stop(&self, after: NaiveDateTime) -> Option<NaiveDateTime>;
}

/// Where `now` falls relative to a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// Open since `since`; closes at `until` (never if `None`)
    Active {
        since: NaiveDateTime,
        until: Option<NaiveDateTime>,
    },
    /// Closed; opens at `until` (never if `None`)
    Inactive { until: Option<NaiveDateTime> },
}

/// Evaluate `window` at `now`
pub fn state_at(window: &dyn TimeWindow, now: NaiveDateTime) -> WindowState {
    let Some(since) = window.ambient_start(now) else {
        return WindowState::Inactive {
            until: window.next_start(now),
        };
    };
    match window.next_stop(since) {
        Some(stop) if stop <= now => WindowState::Inactive {
            until: window.next_start(now),
        },
        until => WindowState::Active { since, until },
    }
}

/// A window repeating every `period`, opening at `open` and closing at the
/// next `close`, both applied to the start of the period.
///
/// Windows may wrap past the period boundary (22:00 to 02:00).
#[derive(Debug, Clone)]
pub struct CalendarWindow {
    period: CalendarField,
    open: CalendarSetter,
    close: CalendarSetter,
}

impl CalendarWindow {
    pub fn new(period: CalendarField, open: CalendarSetter, close: CalendarSetter) -> Self {
        Self {
            period,
            open,
            close,
        }
    }

    /// Active every day from `open` until `close`
    pub fn daily(open: NaiveTime, close: NaiveTime) -> Self {
        Self::new(
            CalendarField::Day,
            CalendarSetter::at_time(open),
            CalendarSetter::at_time(close),
        )
    }

    /// Active every week from `first` 00:00 through the end of `last`
    pub fn weekdays(first: Weekday, last: Weekday) -> Self {
        Self::new(
            CalendarField::Week,
            CalendarSetter::new().set(FieldValue::DayOfWeek(first)),
            CalendarSetter::new().set(FieldValue::DayOfWeek(last.succ())),
        )
    }

    fn in_period(&self, setter: &CalendarSetter, at: NaiveDateTime, shift: i64) -> NaiveDateTime {
        let base = self.period.truncate(at);
        setter.apply(self.period.add(base, shift))
    }

    fn strictly_after(&self, setter: &CalendarSetter, after: NaiveDateTime) -> NaiveDateTime {
        let candidate = self.in_period(setter, after, 0);
        if candidate > after {
            candidate
        } else {
            self.in_period(setter, after, 1)
        }
    }
}

impl TimeWindow for CalendarWindow {
    fn ambient_start(&self, at: NaiveDateTime) -> Option<NaiveDateTime> {
        let opening = self.in_period(&self.open, at, 0);
        if opening <= at {
            Some(opening)
        } else {
            Some(self.in_period(&self.open, at, -1))
        }
    }

    fn next_start(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        Some(self.strictly_after(&self.open, after))
    }

    fn next_stop(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        Some(self.strictly_after(&self.close, after))
    }
}

/// A single absolute interval `[start, stop)` that never reopens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindow {
    pub start: NaiveDateTime,
    pub stop: NaiveDateTime,
}

impl FixedWindow {
    pub fn new(start: NaiveDateTime, stop: NaiveDateTime) -> Self {
        Self { start, stop }
    }
}

impl TimeWindow for FixedWindow {
    fn ambient_start(&self, at: NaiveDateTime) -> Option<NaiveDateTime> {
        (self.start <= at).then_some(self.start)
    }

    fn next_start(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        (after < self.start).then_some(self.start)
    }

    fn next_stop(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        (after < self.stop).then_some(self.stop)
    }
}

/// Open from the first evaluation onwards; never closes
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysActive;

impl TimeWindow for AlwaysActive {
    fn ambient_start(&self, at: NaiveDateTime) -> Option<NaiveDateTime> {
        Some(at)
    }

    fn next_start(&self, _after: NaiveDateTime) -> Option<NaiveDateTime> {
        None
    }

    fn next_stop(&self, _after: NaiveDateTime) -> Option<NaiveDateTime> {
        None
    }
}

#[cfg(test)]
#[path = "window_tests.rs"]
mod tests;
