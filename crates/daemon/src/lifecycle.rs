// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: startup and shutdown around one scheduler

use crate::config::DaemonConfig;
use courier_core::{
    ConfigError, GroupId, PeriodicWork, Scheduler, SharedClock, SystemClock, TaskId, TimerDriver,
};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during daemon lifecycle
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("log path {} has no file name", .0.display())]
    InvalidLogPath(PathBuf),

    #[error("failed to register heartbeat every {0:?}")]
    Heartbeat(Duration),
}

/// Running daemon state
pub struct Daemon {
    pub scheduler: Arc<Scheduler>,
    pub heartbeat: GroupId,
    pub heartbeat_task: TaskId,
}

/// Build the scheduler and register the heartbeat group
pub fn startup(config: &DaemonConfig) -> Result<Daemon, LifecycleError> {
    startup_with_clock(config, SystemClock::shared())
}

pub fn startup_with_clock(
    config: &DaemonConfig,
    clock: SharedClock,
) -> Result<Daemon, LifecycleError> {
    let scheduler = Arc::new(Scheduler::new(clock, config.scheduler.clone()));
    let heartbeat = scheduler.add_task_group("heartbeat");
    let work = heartbeat_work(Arc::downgrade(&scheduler), config.heartbeat_interval);
    let heartbeat_task = scheduler
        .add_work(heartbeat, Arc::new(work))
        .ok_or(LifecycleError::Heartbeat(config.heartbeat_interval))?;

    info!(
        driver = ?config.scheduler.driver,
        interval = ?config.heartbeat_interval,
        "scheduler started"
    );
    Ok(Daemon {
        scheduler,
        heartbeat,
        heartbeat_task,
    })
}

/// Logs a summary of the registry every `interval`
fn heartbeat_work(scheduler: Weak<Scheduler>, interval: Duration) -> PeriodicWork {
    PeriodicWork::fixed_rate("heartbeat", interval, move |_| {
        let Some(scheduler) = scheduler.upgrade() else {
            return Ok(());
        };
        let snapshot = scheduler.snapshot();
        let tasks: usize = snapshot.groups.iter().map(|g| g.tasks.len()).sum();
        info!(groups = snapshot.groups.len(), tasks, "heartbeat");
        debug!(state = %serde_json::to_string(&snapshot)?, "scheduler snapshot");
        Ok(())
    })
}

impl Daemon {
    /// Drive manual timers; threaded timers fire on their own workers
    pub fn pump(&self) -> usize {
        if self.scheduler.config().driver == TimerDriver::Threaded {
            return 0;
        }
        self.scheduler.run_pending()
    }

    /// Remove every group, cancelling all tasks
    pub fn shutdown(&self) {
        self.scheduler.log_dump();
        self.scheduler.shutdown();
        info!("scheduler stopped");
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
