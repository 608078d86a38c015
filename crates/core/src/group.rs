// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task groups sharing one low-level timer
//!
//! A [`GroupTimer`] owns a map of tasks and one lazily created [`Timer`].
//! The timer exists exactly while the map is non-empty: it is created by the
//! first registration and shut down the moment the last task leaves.
//!
//! Cancelling a task that is idle removes it at once. Cancelling a task whose
//! work is running (from inside its own callback or from another thread)
//! only marks it; the removal is applied right after the callback returns.
//! Every transition happens under the group's mutex, which is never held
//! while work runs.

use crate::clock::{self, SharedClock};
use crate::config::SchedulerConfig;
use crate::error::{TimerError, WorkResult};
use crate::id::{EntryId, GroupId, TaskId};
use crate::timer::{Job, Repeat, Timer};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// A unit of work registered in a group
///
/// The work decides its own firing policy in [`Work::register`]; the group
/// never interprets it.
pub trait Work: Send + Sync + 'static {
    fn description(&self) -> &str;

    /// Arm the first (or every) firing through `registration`.
    ///
    /// Called with the group locked: only arm entries here.
    fn register(&self, registration: &mut Registration<'_>) -> Result<(), TimerError>;

    /// Invoked on every firing
    fn run(&self, task: &TaskHandle) -> WorkResult;
}

/// Lifecycle of a task inside its group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Idle,
    Running,
    /// Cancelled while running; removed when the callback returns
    PendingRemoval,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Idle => write!(f, "idle"),
            TaskState::Running => write!(f, "running"),
            TaskState::PendingRemoval => write!(f, "pending_removal"),
        }
    }
}

struct TaskSlot {
    work: Arc<dyn Work>,
    state: TaskState,
    /// Timer entries armed for this task
    entries: Vec<EntryId>,
}

#[derive(Default)]
struct GroupState {
    tasks: HashMap<TaskId, TaskSlot>,
    timer: Option<Timer>,
    next_task: u64,
    running: Option<TaskId>,
}

struct GroupInner {
    id: GroupId,
    description: String,
    clock: SharedClock,
    config: SchedulerConfig,
    state: Mutex<GroupState>,
}

impl GroupInner {
    fn lock(&self) -> MutexGuard<'_, GroupState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn timer_name(&self) -> String {
        format!("group-{}", self.id)
    }

    /// Cancellation protocol; returns false for unknown ids
    fn cancel_locked(&self, state: &mut GroupState, id: TaskId) -> bool {
        let Some(slot) = state.tasks.get_mut(&id) else {
            return false;
        };
        match slot.state {
            TaskState::Idle => self.remove_locked(state, id),
            TaskState::Running => {
                slot.state = TaskState::PendingRemoval;
                debug!(group = %self.id, task = %id, "removal deferred until work returns");
            }
            TaskState::PendingRemoval => {}
        }
        true
    }

    fn remove_locked(&self, state: &mut GroupState, id: TaskId) {
        let Some(slot) = state.tasks.remove(&id) else {
            return;
        };
        if let Some(timer) = &state.timer {
            for entry in &slot.entries {
                timer.cancel(*entry);
            }
        }
        debug!(group = %self.id, task = %id, work = slot.work.description(), "task removed");

        if state.tasks.is_empty() {
            if let Some(timer) = state.timer.take() {
                timer.shutdown();
                debug!(group = %self.id, "group empty, timer released");
            }
        }
    }
}

fn task_job(group: Weak<GroupInner>, id: TaskId) -> Job {
    Arc::new(move || fire(&group, id))
}

fn fire(group: &Weak<GroupInner>, id: TaskId) {
    let Some(inner) = group.upgrade() else {
        return;
    };
    let (work, handle) = {
        let mut state = inner.lock();
        let Some(slot) = state.tasks.get_mut(&id) else {
            return;
        };
        if slot.state != TaskState::Idle {
            return;
        }
        slot.state = TaskState::Running;
        let work = Arc::clone(&slot.work);
        state.running = Some(id);
        let handle = TaskHandle::new(&inner, id, work.description());
        (work, handle)
    };

    match panic::catch_unwind(AssertUnwindSafe(|| work.run(&handle))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(group = %inner.id, task = %id, work = handle.description(), error = %e, "work failed");
        }
        Err(_) => {
            error!(group = %inner.id, task = %id, work = handle.description(), "work panicked");
        }
    }

    let mut state = inner.lock();
    state.running = None;
    let finished = state.tasks.get_mut(&id).map(|slot| {
        let previous = slot.state;
        slot.state = TaskState::Idle;
        previous
    });
    if finished == Some(TaskState::PendingRemoval) {
        inner.remove_locked(&mut state, id);
    }
}

/// Arming context handed to [`Work::register`]
///
/// Every entry armed here is recorded against the task, so cancelling the
/// task disarms it.
pub struct Registration<'a> {
    timer: &'a Timer,
    task: &'a TaskHandle,
    job: Job,
    entries: Vec<EntryId>,
}

impl<'a> Registration<'a> {
    fn new(timer: &'a Timer, task: &'a TaskHandle, job: Job) -> Self {
        Self {
            timer,
            task,
            job,
            entries: Vec::new(),
        }
    }

    /// The group's low-level timer
    pub fn timer(&self) -> &Timer {
        self.timer
    }

    pub fn task(&self) -> &TaskHandle {
        self.task
    }

    pub fn now(&self) -> NaiveDateTime {
        self.timer.now()
    }

    /// Fire once at `at`
    pub fn once(&mut self, at: NaiveDateTime) -> Result<EntryId, TimerError> {
        self.arm(at, Repeat::Once)
    }

    /// Fire once after `delay`
    pub fn after(&mut self, delay: Duration) -> Result<EntryId, TimerError> {
        self.arm(clock::add(self.now(), delay), Repeat::Once)
    }

    pub fn fixed_rate(
        &mut self,
        first: NaiveDateTime,
        period: Duration,
    ) -> Result<EntryId, TimerError> {
        self.arm(first, Repeat::FixedRate(period))
    }

    pub fn fixed_delay(
        &mut self,
        first: NaiveDateTime,
        delay: Duration,
    ) -> Result<EntryId, TimerError> {
        self.arm(first, Repeat::FixedDelay(delay))
    }

    fn arm(&mut self, at: NaiveDateTime, repeat: Repeat) -> Result<EntryId, TimerError> {
        let id = self.timer.schedule(at, repeat, Arc::clone(&self.job))?;
        self.entries.push(id);
        Ok(id)
    }
}

/// Handle to one task in a group, as seen by its work
///
/// Holds only a weak reference to the group: the group owns the task.
#[derive(Clone)]
pub struct TaskHandle {
    group: Weak<GroupInner>,
    group_id: GroupId,
    id: TaskId,
    description: String,
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("group", &self.group_id)
            .field("id", &self.id)
            .field("description", &self.description)
            .finish()
    }
}

impl TaskHandle {
    fn new(group: &Arc<GroupInner>, id: TaskId, description: &str) -> Self {
        Self {
            group: Arc::downgrade(group),
            group_id: group.id,
            id,
            description: description.to_string(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The owning group, while it is alive
    pub fn group(&self) -> Option<GroupTimer> {
        self.group.upgrade().map(|inner| GroupTimer { inner })
    }

    pub fn group_description(&self) -> Option<String> {
        self.group.upgrade().map(|inner| inner.description.clone())
    }

    /// Current state, `None` once the task has left its group
    pub fn state(&self) -> Option<TaskState> {
        let inner = self.group.upgrade()?;
        let state = inner.lock();
        state.tasks.get(&self.id).map(|slot| slot.state)
    }

    /// Remove this task from its group (deferred while it is running).
    ///
    /// Idempotent; returns false if the task had already left.
    pub fn cancel(&self) -> bool {
        let Some(inner) = self.group.upgrade() else {
            return false;
        };
        let mut state = inner.lock();
        inner.cancel_locked(&mut state, self.id)
    }

    /// Arm one more one-shot firing of this task at `at`.
    ///
    /// Used by work with calendar-based policies to re-arm from `run`.
    /// Returns `Ok(false)` if the task is gone or pending removal.
    pub fn rearm_at(&self, at: NaiveDateTime) -> Result<bool, TimerError> {
        let Some(inner) = self.group.upgrade() else {
            return Ok(false);
        };
        let mut state = inner.lock();
        let Some(timer) = state.timer.clone() else {
            return Ok(false);
        };
        let Some(slot) = state.tasks.get_mut(&self.id) else {
            return Ok(false);
        };
        if slot.state == TaskState::PendingRemoval {
            return Ok(false);
        }
        slot.entries.retain(|entry| timer.is_scheduled(*entry));
        let entry = timer.schedule(at, Repeat::Once, task_job(Arc::downgrade(&inner), self.id))?;
        slot.entries.push(entry);
        Ok(true)
    }

    /// Move this task's work into `group`.
    ///
    /// Leaves the current group first (same protocol as [`TaskHandle::cancel`]),
    /// then registers the work in `group` under a fresh id. Returns the handle
    /// of the new task, or `None` if this task had already left or the new
    /// registration failed.
    pub fn set_group(&self, group: &GroupTimer) -> Option<TaskHandle> {
        let inner = self.group.upgrade()?;
        let work = {
            let mut state = inner.lock();
            let work = state
                .tasks
                .get(&self.id)
                .map(|slot| Arc::clone(&slot.work))?;
            inner.cancel_locked(&mut state, self.id);
            work
        };
        let id = group.add_work(work)?;
        group.handle(id)
    }
}

/// Structural view of one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub description: String,
    pub state: TaskState,
}

/// Structural view of one group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSnapshot {
    pub id: GroupId,
    pub description: String,
    pub has_timer: bool,
    pub next_due: Option<NaiveDateTime>,
    pub tasks: Vec<TaskSnapshot>,
}

/// A named group of tasks sharing one low-level timer
#[derive(Clone)]
pub struct GroupTimer {
    inner: Arc<GroupInner>,
}

impl fmt::Debug for GroupTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupTimer")
            .field("id", &self.inner.id)
            .field("description", &self.inner.description)
            .field("tasks", &self.len())
            .finish()
    }
}

impl GroupTimer {
    pub fn new(
        id: GroupId,
        description: impl Into<String>,
        clock: SharedClock,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                id,
                description: description.into(),
                clock,
                config,
                state: Mutex::new(GroupState::default()),
            }),
        }
    }

    pub fn id(&self) -> GroupId {
        self.inner.id
    }

    pub fn description(&self) -> &str {
        &self.inner.description
    }

    /// Current wall time from the group's clock
    pub fn now(&self) -> NaiveDateTime {
        self.inner.clock.now()
    }

    /// Register `work` under the next task id and arm it.
    ///
    /// Returns `None` if the timer could not be created or the work failed
    /// to arm; the group is then left as it was.
    pub fn add_work(&self, work: Arc<dyn Work>) -> Option<TaskId> {
        let inner = &self.inner;
        let mut state = inner.lock();
        state.next_task += 1;
        let id = TaskId(state.next_task);

        let timer = match &state.timer {
            Some(timer) => timer.clone(),
            None => match inner
                .config
                .timer(&inner.timer_name(), Arc::clone(&inner.clock))
            {
                Ok(timer) => {
                    debug!(group = %inner.id, timer = timer.name(), "group timer created");
                    state.timer = Some(timer.clone());
                    timer
                }
                Err(e) => {
                    warn!(group = %inner.id, error = %e, "failed to create group timer");
                    return None;
                }
            },
        };

        let handle = TaskHandle::new(inner, id, work.description());
        let mut registration =
            Registration::new(&timer, &handle, task_job(Arc::downgrade(inner), id));
        match work.register(&mut registration) {
            Ok(()) => {
                let entries = registration.entries;
                debug!(group = %inner.id, task = %id, work = work.description(), entries = entries.len(), "task registered");
                state.tasks.insert(
                    id,
                    TaskSlot {
                        work,
                        state: TaskState::Idle,
                        entries,
                    },
                );
                Some(id)
            }
            Err(e) => {
                for entry in &registration.entries {
                    timer.cancel(*entry);
                }
                if state.tasks.is_empty() {
                    if let Some(timer) = state.timer.take() {
                        timer.shutdown();
                    }
                }
                warn!(group = %inner.id, work = work.description(), error = %e, "work failed to register");
                None
            }
        }
    }

    /// Cancel one task; false if the id is unknown
    pub fn remove_task(&self, id: TaskId) -> bool {
        let mut state = self.inner.lock();
        self.inner.cancel_locked(&mut state, id)
    }

    /// Cancel every task (running ones are removed when they return)
    pub fn cancel_all(&self) {
        let mut state = self.inner.lock();
        let ids: Vec<TaskId> = state.tasks.keys().copied().collect();
        for id in ids {
            self.inner.cancel_locked(&mut state, id);
        }
        info!(group = %self.inner.id, description = %self.inner.description, "group cancelled");
    }

    pub fn handle(&self, id: TaskId) -> Option<TaskHandle> {
        let state = self.inner.lock();
        let slot = state.tasks.get(&id)?;
        Some(TaskHandle::new(&self.inner, id, slot.work.description()))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().tasks.is_empty()
    }

    /// Whether the group currently owns a live low-level timer
    pub fn has_timer(&self) -> bool {
        self.inner.lock().timer.is_some()
    }

    /// Task ids, ascending
    pub fn task_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.inner.lock().tasks.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.inner.lock().tasks.get(&id).map(|slot| slot.state)
    }

    /// The task whose work is executing right now, if any
    pub fn running_task(&self) -> Option<TaskId> {
        self.inner.lock().running
    }

    /// Fire due entries of a manually driven group timer.
    ///
    /// Returns the number of firings; always 0 for threaded timers.
    pub fn run_pending(&self) -> usize {
        let timer = self.inner.lock().timer.clone();
        timer.map_or(0, |timer| timer.run_pending())
    }

    pub fn snapshot(&self) -> GroupSnapshot {
        let state = self.inner.lock();
        let mut tasks: Vec<TaskSnapshot> = state
            .tasks
            .iter()
            .map(|(id, slot)| TaskSnapshot {
                id: *id,
                description: slot.work.description().to_string(),
                state: slot.state,
            })
            .collect();
        tasks.sort_by_key(|task| task.id);
        GroupSnapshot {
            id: self.inner.id,
            description: self.inner.description.clone(),
            has_timer: state.timer.is_some(),
            next_due: state.timer.as_ref().and_then(Timer::next_due),
            tasks,
        }
    }
}

#[cfg(test)]
#[path = "group_tests.rs"]
mod tests;
