// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide registry of task groups

use crate::clock::{SharedClock, SystemClock};
use crate::config::SchedulerConfig;
use crate::group::{GroupSnapshot, GroupTimer, Work};
use crate::id::{GroupId, TaskId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Default)]
struct Registry {
    groups: BTreeMap<GroupId, GroupTimer>,
    next_group: u64,
}

/// Structural view of every group, ordered by id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerSnapshot {
    pub groups: Vec<GroupSnapshot>,
}

/// Registry mapping group ids to [`GroupTimer`]s
///
/// Groups persist until removed; [`Scheduler::shutdown`] removes them all.
pub struct Scheduler {
    clock: SharedClock,
    config: SchedulerConfig,
    registry: Mutex<Registry>,
}

impl Scheduler {
    pub fn new(clock: SharedClock, config: SchedulerConfig) -> Self {
        Self {
            clock,
            config,
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn with_system_clock(config: SchedulerConfig) -> Self {
        Self::new(SystemClock::shared(), config)
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Allocate a new empty group. Ids are never reused.
    pub fn add_task_group(&self, description: impl Into<String>) -> GroupId {
        let description = description.into();
        let mut registry = self.lock();
        registry.next_group += 1;
        let id = GroupId(registry.next_group);
        let group = GroupTimer::new(
            id,
            description.clone(),
            Arc::clone(&self.clock),
            self.config.clone(),
        );
        registry.groups.insert(id, group);
        info!(group = %id, %description, "group added");
        id
    }

    /// Cancel every task of a group, then forget the group
    pub fn remove_task_group(&self, id: GroupId) {
        let Some(group) = self.lock().groups.remove(&id) else {
            debug!(group = %id, "remove of unknown group ignored");
            return;
        };
        group.cancel_all();
        info!(group = %id, description = group.description(), "group removed");
    }

    /// Register `work` in a group; `None` if the group is unknown or the
    /// work failed to arm
    pub fn add_work(&self, group: GroupId, work: Arc<dyn Work>) -> Option<TaskId> {
        let Some(target) = self.group(group) else {
            debug!(%group, work = work.description(), "add to unknown group ignored");
            return None;
        };
        target.add_work(work)
    }

    /// Cancel one task; unknown ids are ignored
    pub fn remove_task(&self, group: GroupId, task: TaskId) {
        if let Some(target) = self.group(group) {
            target.remove_task(task);
        }
    }

    pub fn group(&self, id: GroupId) -> Option<GroupTimer> {
        self.lock().groups.get(&id).cloned()
    }

    pub fn group_ids(&self) -> Vec<GroupId> {
        self.lock().groups.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().groups.is_empty()
    }

    fn groups(&self) -> Vec<GroupTimer> {
        self.lock().groups.values().cloned().collect()
    }

    /// Human-readable listing of every group and its tasks
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for group in self.snapshot().groups {
            let timer = if group.has_timer { "timer" } else { "no timer" };
            let _ = writeln!(
                out,
                "group {} \"{}\" ({}, {} tasks)",
                group.id,
                group.description,
                timer,
                group.tasks.len()
            );
            for task in group.tasks {
                let _ = writeln!(out, "  task {} [{}] {}", task.id, task.state, task.description);
            }
        }
        out
    }

    pub fn log_dump(&self) {
        for line in self.dump().lines() {
            debug!("{line}");
        }
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            groups: self.groups().iter().map(GroupTimer::snapshot).collect(),
        }
    }

    /// Fire due entries of every manually driven group timer
    pub fn run_pending(&self) -> usize {
        self.groups().iter().map(GroupTimer::run_pending).sum()
    }

    /// Remove every group
    pub fn shutdown(&self) {
        let groups = std::mem::take(&mut self.lock().groups);
        let count = groups.len();
        for group in groups.into_values() {
            group.cancel_all();
        }
        info!(groups = count, "scheduler shut down");
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
