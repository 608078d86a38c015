// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! courier-core: embedded scheduling engine
//!
//! Two entry points share one low-level [`Timer`] primitive:
//! - [`Scheduler`]: named groups of independently cancellable work, one
//!   timer per group, released when the group empties
//! - [`ScheduleLevel`] trees: calendar windows that start and stop nested
//!   listeners, down to periodic and calendar-anchored launchers

pub mod calendar;
pub mod clock;
pub mod config;
pub mod error;
pub mod group;
pub mod id;
pub mod launcher;
pub mod level;
pub mod listener;
pub mod scheduler;
pub mod timer;
pub mod window;
pub mod work;

#[cfg(test)]
mod test_support;

pub use calendar::{CalendarAnchor, CalendarField, CalendarInterval, CalendarSetter, FieldValue};
pub use clock::{Clock, FakeClock, SharedClock, SystemClock};
pub use config::SchedulerConfig;
pub use error::{ConfigError, LaunchError, TimerError, WorkError, WorkResult};
pub use group::{GroupSnapshot, GroupTimer, Registration, TaskHandle, TaskSnapshot, TaskState, Work};
pub use id::{EntryId, GroupId, TaskId};
pub use launcher::{CalendarPeriodicLauncher, OneTimeLauncher, PeriodicLauncher, Runnable};
pub use level::ScheduleLevel;
pub use listener::{Listener, StartStopContainer, StartStopListener};
pub use scheduler::{Scheduler, SchedulerSnapshot};
pub use timer::{Job, Repeat, Timer, TimerDriver};
pub use window::{state_at, AlwaysActive, CalendarWindow, FixedWindow, TimeWindow, WindowState};
pub use work::{CalendarWork, OneShotWork, PeriodicWork, WorkFn};
