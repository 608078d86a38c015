// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wall-clock abstraction for testable calendar scheduling

use chrono::{Local, NaiveDateTime, TimeDelta};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A clock that provides the current local wall time
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Clock handle shared between timers, levels and launchers
pub type SharedClock = Arc<dyn Clock>;

/// Real system clock (local time zone)
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn shared() -> SharedClock {
        Arc::new(SystemClock)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Fake clock for testing with controllable time
#[derive(Clone, Debug, Default)]
pub struct FakeClock {
    current: Arc<Mutex<NaiveDateTime>>,
}

impl FakeClock {
    pub fn new(at: NaiveDateTime) -> Self {
        Self {
            current: Arc::new(Mutex::new(at)),
        }
    }

    /// Advance the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = add(*current, duration);
    }

    /// Set the clock to a specific wall time
    pub fn set(&self, at: NaiveDateTime) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = at;
    }

    /// A shared handle reading this clock
    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }
}

impl Clock for FakeClock {
    fn now(&self) -> NaiveDateTime {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// `at + duration`, saturating at the representable range
pub fn add(at: NaiveDateTime, duration: Duration) -> NaiveDateTime {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(NaiveDateTime::MAX)
}

/// Time left from `now` until `due`, zero if `due` has passed
pub fn until(now: NaiveDateTime, due: NaiveDateTime) -> Duration {
    (due - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
