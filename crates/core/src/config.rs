// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler configuration

use crate::clock::SharedClock;
use crate::error::{ConfigError, TimerError};
use crate::timer::{Timer, TimerDriver};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How the scheduler creates its low-level timers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub driver: TimerDriver,
    /// Worker threads are named `<prefix>-<timer name>`
    pub thread_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            driver: TimerDriver::Threaded,
            thread_prefix: "courier".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timers fire only when pumped with `run_pending`
    pub fn manual() -> Self {
        Self::default().with_driver(TimerDriver::Manual)
    }

    pub fn with_driver(mut self, driver: TimerDriver) -> Self {
        self.driver = driver;
        self
    }

    pub fn with_thread_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_prefix = prefix.into();
        self
    }

    /// Create a timer called `name` with the configured driver
    pub fn timer(&self, name: &str, clock: SharedClock) -> Result<Timer, TimerError> {
        match self.driver {
            TimerDriver::Manual => Ok(Timer::manual(name, clock)),
            TimerDriver::Threaded => {
                Timer::spawn(name, clock, format!("{}-{}", self.thread_prefix, name))
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
