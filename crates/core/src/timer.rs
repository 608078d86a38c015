// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Low-level timer shared by groups, levels and launchers
//!
//! A timer owns a min-heap of armed entries. A threaded timer fires them
//! serially on one dedicated worker thread; a manual timer fires them from
//! [`Timer::run_pending`] on the calling thread, which keeps tests and
//! embedders with their own loop deterministic.
//!
//! Jobs never run with the timer's lock held. A job that panics is caught
//! and logged, and a repeating entry is re-armed as usual.

use crate::clock::{self, SharedClock};
use crate::error::TimerError;
use crate::id::EntryId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, trace};

/// Callback invoked when an entry fires
pub type Job = Arc<dyn Fn() + Send + Sync>;

/// Wall time may jump; a sleeping worker re-checks at least this often.
const MAX_WAIT: Duration = Duration::from_secs(60);

/// Stale heap items tolerated beyond twice the armed entries
const COMPACT_SLACK: usize = 32;

/// How a timer executes its entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerDriver {
    /// One worker thread per timer
    #[default]
    Threaded,
    /// Entries fire only from [`Timer::run_pending`]
    Manual,
}

/// Repetition policy of an armed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Once,
    /// Next due = previous due + period (missed periods are caught up)
    FixedRate(Duration),
    /// Next due = completion time + delay
    FixedDelay(Duration),
}

impl Repeat {
    fn period(self) -> Option<Duration> {
        match self {
            Repeat::Once => None,
            Repeat::FixedRate(period) | Repeat::FixedDelay(period) => Some(period),
        }
    }
}

struct Entry {
    job: Job,
    due: NaiveDateTime,
    repeat: Repeat,
}

#[derive(Default)]
struct TimerState {
    /// Armed entries, including repeating entries that are currently firing
    entries: HashMap<EntryId, Entry>,
    /// Earliest first; stale items for cancelled entries are skipped on pop
    queue: BinaryHeap<Reverse<(NaiveDateTime, EntryId)>>,
    next_entry: u64,
    shutdown: bool,
}

impl TimerState {
    fn next_due(&mut self) -> Option<NaiveDateTime> {
        while let Some(Reverse((due, id))) = self.queue.peek().copied() {
            match self.entries.get(&id) {
                Some(entry) if entry.due == due => return Some(due),
                _ => {
                    self.queue.pop();
                }
            }
        }
        None
    }

    /// Pop the earliest entry if it is due at `now`
    fn take_due(&mut self, now: NaiveDateTime) -> Option<Fired> {
        let due = self.next_due()?;
        if due > now {
            return None;
        }
        let Reverse((_, id)) = self.queue.pop()?;
        let entry = self.entries.get(&id)?;
        let fired = Fired {
            id,
            job: Arc::clone(&entry.job),
            due,
            repeat: entry.repeat,
        };
        if entry.repeat == Repeat::Once {
            self.entries.remove(&id);
        }
        Some(fired)
    }

    /// Drop heap items left behind by cancelled entries once they dominate
    fn compact(&mut self) {
        if self.queue.len() <= 2 * self.entries.len() + COMPACT_SLACK {
            return;
        }
        let entries = &self.entries;
        self.queue
            .retain(|Reverse((due, id))| entries.get(id).is_some_and(|entry| entry.due == *due));
    }

    /// Put a repeating entry back in the queue unless it was cancelled mid-flight
    fn rearm(&mut self, fired: &Fired, now: NaiveDateTime) {
        let next = match fired.repeat {
            Repeat::Once => return,
            Repeat::FixedRate(period) => clock::add(fired.due, period),
            Repeat::FixedDelay(delay) => clock::add(now, delay),
        };
        if let Some(entry) = self.entries.get_mut(&fired.id) {
            entry.due = next;
            self.queue.push(Reverse((next, fired.id)));
        }
    }
}

struct Fired {
    id: EntryId,
    job: Job,
    due: NaiveDateTime,
    repeat: Repeat,
}

struct Shared {
    name: String,
    clock: SharedClock,
    state: Mutex<TimerState>,
    wakeup: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fire(&self, fired: &Fired) {
        trace!(timer = %self.name, entry = %fired.id, due = %fired.due, "firing");
        if panic::catch_unwind(AssertUnwindSafe(|| (fired.job)())).is_err() {
            error!(timer = %self.name, entry = %fired.id, "timer job panicked");
        }
        let now = self.clock.now();
        self.lock().rearm(fired, now);
    }

    fn shutdown(&self) {
        let mut state = self.lock();
        if state.shutdown {
            return;
        }
        state.shutdown = true;
        state.entries.clear();
        state.queue.clear();
        drop(state);
        self.wakeup.notify_all();
        debug!(timer = %self.name, "timer shut down");
    }
}

/// Shared by every [`Timer`] clone; the last one dropped shuts the timer down
struct Handles(Arc<Shared>);

impl Drop for Handles {
    fn drop(&mut self) {
        self.0.shutdown();
    }
}

/// Handle to a low-level timer; clones share the same entries
#[derive(Clone)]
pub struct Timer {
    shared: Arc<Shared>,
    _handles: Arc<Handles>,
    driver: TimerDriver,
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("name", &self.shared.name)
            .field("driver", &self.driver)
            .field("pending", &self.pending())
            .finish()
    }
}

impl Timer {
    /// Create a timer that only fires from [`Timer::run_pending`]
    pub fn manual(name: impl Into<String>, clock: SharedClock) -> Self {
        let shared = Arc::new(Shared {
            name: name.into(),
            clock,
            state: Mutex::new(TimerState::default()),
            wakeup: Condvar::new(),
        });
        Self {
            _handles: Arc::new(Handles(Arc::clone(&shared))),
            shared,
            driver: TimerDriver::Manual,
        }
    }

    /// Create a timer with its own worker thread named after the timer
    pub fn threaded(name: impl Into<String>, clock: SharedClock) -> Result<Self, TimerError> {
        let name = name.into();
        let thread_name = name.clone();
        Self::spawn(name, clock, thread_name)
    }

    /// Create a timer with its own worker thread called `thread_name`
    pub fn spawn(
        name: impl Into<String>,
        clock: SharedClock,
        thread_name: impl Into<String>,
    ) -> Result<Self, TimerError> {
        let mut timer = Self::manual(name, clock);
        timer.driver = TimerDriver::Threaded;
        let shared = Arc::clone(&timer.shared);
        thread::Builder::new()
            .name(thread_name.into())
            .spawn(move || run_worker(shared))
            .map_err(|source| TimerError::Spawn {
                timer: timer.shared.name.clone(),
                source,
            })?;
        Ok(timer)
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn driver(&self) -> TimerDriver {
        self.driver
    }

    pub fn clock(&self) -> &SharedClock {
        &self.shared.clock
    }

    /// Current wall time as seen by this timer
    pub fn now(&self) -> NaiveDateTime {
        self.shared.clock.now()
    }

    /// Arm `job` to fire at `at` (immediately if `at` has passed)
    pub fn schedule(
        &self,
        at: NaiveDateTime,
        repeat: Repeat,
        job: Job,
    ) -> Result<EntryId, TimerError> {
        if repeat.period() == Some(Duration::ZERO) {
            return Err(TimerError::ZeroPeriod {
                timer: self.shared.name.clone(),
            });
        }
        let mut state = self.shared.lock();
        if state.shutdown {
            return Err(TimerError::Shutdown {
                timer: self.shared.name.clone(),
            });
        }
        state.next_entry += 1;
        let id = EntryId(state.next_entry);
        state.entries.insert(id, Entry { job, due: at, repeat });
        state.queue.push(Reverse((at, id)));
        drop(state);
        self.shared.wakeup.notify_all();

        debug!(timer = %self.shared.name, entry = %id, due = %at, ?repeat, "entry armed");
        Ok(id)
    }

    /// Arm `job` to fire `delay` from now
    pub fn schedule_after(
        &self,
        delay: Duration,
        repeat: Repeat,
        job: Job,
    ) -> Result<EntryId, TimerError> {
        self.schedule(clock::add(self.now(), delay), repeat, job)
    }

    /// Disarm an entry. A firing already in flight completes but is not re-armed.
    pub fn cancel(&self, id: EntryId) -> bool {
        let removed = {
            let mut state = self.shared.lock();
            let removed = state.entries.remove(&id).is_some();
            state.compact();
            removed
        };
        if removed {
            self.shared.wakeup.notify_all();
            debug!(timer = %self.shared.name, entry = %id, "entry cancelled");
        }
        removed
    }

    /// Whether `id` is still armed
    pub fn is_scheduled(&self, id: EntryId) -> bool {
        self.shared.lock().entries.contains_key(&id)
    }

    /// Drop every entry and stop the worker.
    ///
    /// Never waits for the worker, so it is safe to call from inside a job.
    /// Dropping the last handle to a timer does the same.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.lock().shutdown
    }

    /// Number of armed entries
    pub fn pending(&self) -> usize {
        self.shared.lock().entries.len()
    }

    /// Due time of the earliest armed entry, if any
    pub fn next_due(&self) -> Option<NaiveDateTime> {
        self.shared.lock().next_due()
    }

    /// Fire every entry due at the clock's current time on this thread.
    ///
    /// Returns the number of firings. Threaded timers are driven by their
    /// worker and always return 0.
    pub fn run_pending(&self) -> usize {
        if self.driver == TimerDriver::Threaded {
            return 0;
        }
        let mut fired_count = 0;
        loop {
            let fired = {
                let mut state = self.shared.lock();
                if state.shutdown {
                    break;
                }
                state.take_due(self.shared.clock.now())
            };
            let Some(fired) = fired else {
                break;
            };
            self.shared.fire(&fired);
            fired_count += 1;
        }
        fired_count
    }
}

fn run_worker(shared: Arc<Shared>) {
    debug!(timer = %shared.name, "timer worker started");
    loop {
        let fired = {
            let mut state = shared.lock();
            loop {
                if state.shutdown {
                    debug!(timer = %shared.name, "timer worker stopped");
                    return;
                }
                let now = shared.clock.now();
                match state.next_due() {
                    Some(due) if due <= now => {
                        if let Some(fired) = state.take_due(now) {
                            break fired;
                        }
                    }
                    Some(due) => {
                        let wait = clock::until(now, due).min(MAX_WAIT);
                        state = shared
                            .wakeup
                            .wait_timeout(state, wait)
                            .unwrap_or_else(|e| e.into_inner())
                            .0;
                    }
                    None => {
                        state = shared
                            .wakeup
                            .wait_timeout(state, MAX_WAIT)
                            .unwrap_or_else(|e| e.into_inner())
                            .0;
                    }
                }
            }
        };
        shared.fire(&fired);
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
