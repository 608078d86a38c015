// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leaf listeners that launch work
//!
//! - [`OneTimeLauncher`]: runs once, synchronously, on `start`
//! - [`PeriodicLauncher`]: immediately, then every fixed interval
//! - [`CalendarPeriodicLauncher`]: at calendar-anchored instants
//!
//! Every launcher keeps at most one pending timer entry. After `stop`
//! returns no further firing is armed; one already in flight completes.

use crate::calendar::{CalendarAnchor, CalendarField};
use crate::error::{LaunchError, TimerError, WorkResult};
use crate::id::EntryId;
use crate::listener::StartStopListener;
use crate::timer::{Job, Repeat, Timer};
use chrono::NaiveDateTime;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Work body run by a launcher
pub type Runnable = Arc<dyn Fn() -> WorkResult + Send + Sync>;

/// Runs its work once per `start`; nothing stays pending
pub struct OneTimeLauncher {
    description: String,
    work: Runnable,
}

impl OneTimeLauncher {
    pub fn new<F>(description: impl Into<String>, work: F) -> Arc<Self>
    where
        F: Fn() -> WorkResult + Send + Sync + 'static,
    {
        Arc::new(Self {
            description: description.into(),
            work: Arc::new(work),
        })
    }
}

impl StartStopListener for OneTimeLauncher {
    fn description(&self) -> &str {
        &self.description
    }

    fn start(&self, reference: NaiveDateTime) -> Result<(), LaunchError> {
        debug!(launcher = %self.description, %reference, "launching once");
        let result = panic::catch_unwind(AssertUnwindSafe(|| (self.work)()))
            .unwrap_or_else(|_| Err("work panicked".into()));
        result.map_err(|source| LaunchError::Failed {
            launcher: self.description.clone(),
            source,
        })
    }

    fn stop(&self) {}
}

struct PeriodicState {
    interval: Duration,
    entry: Option<EntryId>,
}

/// Runs its work on `start` and then every `interval`
pub struct PeriodicLauncher {
    description: String,
    work: Runnable,
    timer: Timer,
    state: Mutex<PeriodicState>,
}

impl PeriodicLauncher {
    pub fn new<F>(
        description: impl Into<String>,
        interval: Duration,
        timer: Timer,
        work: F,
    ) -> Arc<Self>
    where
        F: Fn() -> WorkResult + Send + Sync + 'static,
    {
        Arc::new(Self {
            description: description.into(),
            work: Arc::new(work),
            timer,
            state: Mutex::new(PeriodicState {
                interval,
                entry: None,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, PeriodicState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn interval(&self) -> Duration {
        self.lock().interval
    }

    pub fn is_running(&self) -> bool {
        self.lock().entry.is_some()
    }

    /// Change the period. A running launcher restarts with it; a stopped
    /// one uses it on the next `start`.
    pub fn set_interval(&self, interval: Duration) -> Result<(), LaunchError> {
        let mut state = self.lock();
        state.interval = interval;
        if let Some(entry) = state.entry.take() {
            self.timer.cancel(entry);
            debug!(launcher = %self.description, ?interval, "restarting with new interval");
            self.arm(&mut state)?;
        }
        Ok(())
    }

    fn arm(&self, state: &mut PeriodicState) -> Result<(), TimerError> {
        let work = Arc::clone(&self.work);
        let description = self.description.clone();
        let job: Job = Arc::new(move || {
            if let Err(e) = work() {
                warn!(launcher = %description, error = %e, "periodic work failed");
            }
        });
        let entry = self
            .timer
            .schedule(self.timer.now(), Repeat::FixedRate(state.interval), job)?;
        state.entry = Some(entry);
        Ok(())
    }
}

impl StartStopListener for PeriodicLauncher {
    fn description(&self) -> &str {
        &self.description
    }

    fn start(&self, reference: NaiveDateTime) -> Result<(), LaunchError> {
        let mut state = self.lock();
        if state.entry.is_some() {
            return Ok(());
        }
        debug!(launcher = %self.description, %reference, interval = ?state.interval, "starting");
        Ok(self.arm(&mut state)?)
    }

    fn stop(&self) {
        if let Some(entry) = self.lock().entry.take() {
            self.timer.cancel(entry);
            debug!(launcher = %self.description, "stopped");
        }
    }
}

struct CalendarState {
    anchor: CalendarAnchor,
    next: Option<NaiveDateTime>,
    /// Set while armed or firing
    entry: Option<EntryId>,
    epoch: u64,
}

/// Runs its work at calendar-aligned instants: truncate now to `base`,
/// apply the offset, then advance one `step` per launch.
pub struct CalendarPeriodicLauncher {
    description: String,
    work: Runnable,
    timer: Timer,
    me: Weak<CalendarPeriodicLauncher>,
    state: Mutex<CalendarState>,
}

impl CalendarPeriodicLauncher {
    pub fn new<F>(
        description: impl Into<String>,
        base: CalendarField,
        step: CalendarField,
        timer: Timer,
        work: F,
    ) -> Arc<Self>
    where
        F: Fn() -> WorkResult + Send + Sync + 'static,
    {
        let description = description.into();
        Arc::new_cyclic(|me| Self {
            description,
            work: Arc::new(work),
            timer,
            me: me.clone(),
            state: Mutex::new(CalendarState {
                anchor: CalendarAnchor::new(base, step),
                next: None,
                entry: None,
                epoch: 0,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, CalendarState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append one part of the launch offset, e.g. `(Minute, 28)`.
    ///
    /// Warns when `field` is not cleared by truncating to the base field:
    /// such an offset shifts launches across base units.
    pub fn add_offset_part(&self, field: CalendarField, amount: i64) {
        let mut state = self.lock();
        let base = state.anchor.base;
        if !base.resets_field(field) {
            warn!(launcher = %self.description, %base, %field, amount, "offset field is not reset by base field");
        }
        state.anchor.offset.push(field, amount);
    }

    pub fn with_offset_part(self: Arc<Self>, field: CalendarField, amount: i64) -> Arc<Self> {
        self.add_offset_part(field, amount);
        self
    }

    pub fn anchor(&self) -> CalendarAnchor {
        self.lock().anchor.clone()
    }

    /// The armed launch time, if running
    pub fn next_launch(&self) -> Option<NaiveDateTime> {
        self.lock().next
    }

    pub fn is_running(&self) -> bool {
        self.lock().entry.is_some()
    }

    fn arm(&self, state: &mut CalendarState, at: NaiveDateTime) -> Result<(), TimerError> {
        let launcher = self.me.clone();
        let epoch = state.epoch;
        let job: Job = Arc::new(move || {
            if let Some(launcher) = launcher.upgrade() {
                launcher.on_fire(epoch);
            }
        });
        let entry = self.timer.schedule(at, Repeat::Once, job)?;
        state.entry = Some(entry);
        state.next = Some(at);
        debug!(launcher = %self.description, %at, "launch armed");
        Ok(())
    }

    fn on_fire(&self, epoch: u64) {
        let launch = {
            let state = self.lock();
            if state.epoch != epoch {
                return;
            }
            state.next
        };
        let Some(launch) = launch else {
            return;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| (self.work)())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(launcher = %self.description, %launch, error = %e, "calendar work failed");
            }
            Err(_) => {
                error!(launcher = %self.description, %launch, "calendar work panicked");
            }
        }

        let mut state = self.lock();
        if state.epoch != epoch {
            // Stopped while running
            return;
        }
        let next = state.anchor.following_from(launch, self.timer.now());
        if let Err(e) = self.arm(&mut state, next) {
            state.entry = None;
            state.next = None;
            error!(launcher = %self.description, error = %e, "failed to re-arm launch");
        }
    }
}

impl StartStopListener for CalendarPeriodicLauncher {
    fn description(&self) -> &str {
        &self.description
    }

    fn start(&self, reference: NaiveDateTime) -> Result<(), LaunchError> {
        let mut state = self.lock();
        if state.entry.is_some() {
            return Ok(());
        }
        let first = state.anchor.first_launch(self.timer.now());
        debug!(launcher = %self.description, %reference, %first, "starting");
        Ok(self.arm(&mut state, first)?)
    }

    fn stop(&self) {
        let mut state = self.lock();
        if let Some(entry) = state.entry.take() {
            self.timer.cancel(entry);
            debug!(launcher = %self.description, "stopped");
        }
        state.next = None;
        state.epoch += 1;
    }
}

#[cfg(test)]
#[path = "launcher_tests.rs"]
mod tests;
