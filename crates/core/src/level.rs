// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Calendar-windowed activation of a set of child listeners
//!
//! A [`ScheduleLevel`] starts its children when its [`TimeWindow`] opens and
//! stops them when it closes, arming one one-shot timer entry for the next
//! transition. Children see a strictly alternating start/stop sequence no
//! matter how often `start` and `stop` are called on the level.
//!
//! The level's lock only guards its flags; children are called with no lock
//! held, one thread at a time. A request arriving while another thread is
//! calling into children (including from a child itself) is queued and
//! applied by that thread once it is done.

use crate::error::{LaunchError, TimerError};
use crate::id::EntryId;
use crate::listener::{start_all, stop_all, Listener, StartStopListener};
use crate::timer::{Job, Repeat, Timer};
use crate::window::{state_at, TimeWindow, WindowState};
use chrono::NaiveDateTime;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy)]
enum Request {
    Start(NaiveDateTime),
    Stop,
    Fire { epoch: u64, transition: Transition },
}

/// Child calls decided under the lock, performed after releasing it
#[derive(Default)]
struct Fanout {
    children: Vec<Listener>,
    stop: bool,
    start: Option<NaiveDateTime>,
}

impl Fanout {
    fn perform(&self) -> Result<(), LaunchError> {
        if self.stop {
            stop_all(&self.children);
        }
        match self.start {
            Some(since) => start_all(&self.children, since),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct LevelState {
    children: Vec<Listener>,
    active: bool,
    pending: Option<EntryId>,
    /// Bumped on every disarm; callbacks from older epochs are ignored
    epoch: u64,
    /// Set while some thread is calling into children
    busy: bool,
    queued: VecDeque<Request>,
}

pub struct ScheduleLevel {
    description: String,
    window: Box<dyn TimeWindow>,
    timer: Timer,
    me: Weak<ScheduleLevel>,
    state: Mutex<LevelState>,
}

impl ScheduleLevel {
    /// A level driven by `window`, arming its transitions on `timer`.
    ///
    /// The timer may be shared by a whole tree.
    pub fn new(
        description: impl Into<String>,
        window: impl TimeWindow + 'static,
        timer: Timer,
    ) -> Arc<Self> {
        let description = description.into();
        Arc::new_cyclic(|me| Self {
            description,
            window: Box::new(window),
            timer,
            me: me.clone(),
            state: Mutex::new(LevelState::default()),
        })
    }

    pub fn with_child(self: Arc<Self>, child: Listener) -> Arc<Self> {
        self.add_child(child);
        self
    }

    /// Add a child; takes effect from the next activation
    pub fn add_child(&self, child: Listener) {
        self.lock().children.push(child);
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn has_pending_transition(&self) -> bool {
        self.lock().pending.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, LevelState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `request` and everything queued behind it.
    ///
    /// Returns the first failure among the requests this thread applied.
    fn drive(&self, request: Request) -> Result<(), LaunchError> {
        let mut state = self.lock();
        if state.busy {
            if matches!(request, Request::Stop) {
                self.disarm(&mut state);
            }
            debug!(level = %self.description, ?request, "queued behind running transition");
            state.queued.push_back(request);
            return Ok(());
        }
        state.busy = true;

        let mut result = Ok(());
        let mut next = Some(request);
        while let Some(request) = next {
            let (fanout, planned) = self.plan(&mut state, request);
            drop(state);
            let performed = fanout.perform();
            result = result.and(planned).and(performed);
            state = self.lock();
            next = state.queued.pop_front();
        }
        state.busy = false;
        result
    }

    /// Update flags and timer entries for `request`; no child is called here
    fn plan(&self, state: &mut LevelState, request: Request) -> (Fanout, Result<(), LaunchError>) {
        match request {
            Request::Start(_) if state.active => {
                debug!(level = %self.description, "already active");
                (Fanout::default(), Ok(()))
            }
            Request::Start(reference) => {
                debug!(level = %self.description, %reference, "starting");
                self.disarm(state);
                self.evaluate(state, false)
            }
            Request::Stop => {
                self.disarm(state);
                self.evaluate_stop(state)
            }
            Request::Fire { epoch, transition } => {
                if state.epoch != epoch || state.pending.is_none() {
                    debug!(level = %self.description, ?transition, "stale transition ignored");
                    return (Fanout::default(), Ok(()));
                }
                state.pending = None;
                match transition {
                    Transition::Stop => {
                        let was_active = state.active;
                        state.active = false;
                        self.evaluate(state, was_active)
                    }
                    Transition::Start if state.active => (Fanout::default(), Ok(())),
                    Transition::Start => self.evaluate(state, false),
                }
            }
        }
    }

    fn evaluate_stop(&self, state: &mut LevelState) -> (Fanout, Result<(), LaunchError>) {
        let stop = state.active;
        state.active = false;
        if stop {
            debug!(level = %self.description, "stopping children");
        }
        let fanout = Fanout {
            children: state.children.clone(),
            stop,
            start: None,
        };
        (fanout, Ok(()))
    }

    /// Decide from where "now" falls in the window; `stop` carries a
    /// pending stop of the children into the same fan-out.
    fn evaluate(&self, state: &mut LevelState, stop: bool) -> (Fanout, Result<(), LaunchError>) {
        let now = self.timer.now();
        let mut fanout = Fanout {
            children: state.children.clone(),
            stop,
            start: None,
        };
        let armed = match state_at(self.window.as_ref(), now) {
            WindowState::Active { since, until } => {
                state.active = true;
                fanout.start = Some(since);
                debug!(level = %self.description, %since, ?until, "window active, starting children");
                match until {
                    Some(at) => self.arm(state, at, Transition::Stop),
                    None => Ok(()),
                }
            }
            WindowState::Inactive { until } => {
                debug!(level = %self.description, ?until, "window inactive");
                match until {
                    Some(at) => self.arm(state, at, Transition::Start),
                    None => Ok(()),
                }
            }
        };
        (fanout, armed.map_err(LaunchError::from))
    }

    fn arm(
        &self,
        state: &mut LevelState,
        at: NaiveDateTime,
        transition: Transition,
    ) -> Result<(), TimerError> {
        let level = self.me.clone();
        let epoch = state.epoch;
        let job: Job = Arc::new(move || {
            if let Some(level) = level.upgrade() {
                level.on_transition(epoch, transition);
            }
        });
        let entry = self.timer.schedule(at, Repeat::Once, job)?;
        state.pending = Some(entry);
        debug!(level = %self.description, ?transition, %at, "transition armed");
        Ok(())
    }

    fn disarm(&self, state: &mut LevelState) {
        if let Some(entry) = state.pending.take() {
            self.timer.cancel(entry);
        }
        state.epoch += 1;
    }

    fn on_transition(&self, epoch: u64, transition: Transition) {
        if let Err(e) = self.drive(Request::Fire { epoch, transition }) {
            error!(level = %self.description, ?transition, error = %e, "transition failed");
        }
    }
}

impl StartStopListener for ScheduleLevel {
    fn description(&self) -> &str {
        &self.description
    }

    fn start(&self, reference: NaiveDateTime) -> Result<(), LaunchError> {
        self.drive(Request::Start(reference))
    }

    /// Stops the children and disarms the next transition. If another
    /// thread is mid-transition, the children are stopped by that thread.
    fn stop(&self) {
        if let Err(e) = self.drive(Request::Stop) {
            error!(level = %self.description, error = %e, "stop failed");
        }
    }
}

#[cfg(test)]
#[path = "level_tests.rs"]
mod tests;
