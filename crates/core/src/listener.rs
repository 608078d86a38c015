// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Start/stop contract shared by schedule levels and launchers

use crate::error::LaunchError;
use chrono::NaiveDateTime;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, warn};

/// A node of an activation tree
pub trait StartStopListener: Send + Sync {
    fn description(&self) -> &str;

    /// Begin activity. `reference` is the start of the parent's active
    /// window (or the caller's notion of "now" at the root).
    fn start(&self, reference: NaiveDateTime) -> Result<(), LaunchError>;

    /// End activity and disarm anything pending. Always safe to call.
    fn stop(&self);
}

pub type Listener = Arc<dyn StartStopListener>;

/// Start every child, returning the first failure after all were tried.
///
/// A child that panics is reported as a failure of that child.
pub(crate) fn start_all(children: &[Listener], reference: NaiveDateTime) -> Result<(), LaunchError> {
    let mut first_error = None;
    for child in children {
        let result = panic::catch_unwind(AssertUnwindSafe(|| child.start(reference)))
            .unwrap_or_else(|_| {
                Err(LaunchError::Failed {
                    launcher: child.description().to_string(),
                    source: "panicked while starting".into(),
                })
            });
        if let Err(e) = result {
            warn!(child = child.description(), error = %e, "child failed to start");
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

pub(crate) fn stop_all(children: &[Listener]) {
    for child in children {
        if panic::catch_unwind(AssertUnwindSafe(|| child.stop())).is_err() {
            error!(child = child.description(), "child panicked while stopping");
        }
    }
}

/// Root of a tree: fans `start`/`stop` out to its children unconditionally
pub struct StartStopContainer {
    description: String,
    children: Mutex<Vec<Listener>>,
}

impl StartStopContainer {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            children: Mutex::new(Vec::new()),
        }
    }

    pub fn with_child(self, child: Listener) -> Self {
        self.add_child(child);
        self
    }

    pub fn add_child(&self, child: Listener) {
        self.lock().push(child);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Listener>> {
        self.children.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StartStopListener for StartStopContainer {
    fn description(&self) -> &str {
        &self.description
    }

    fn start(&self, reference: NaiveDateTime) -> Result<(), LaunchError> {
        let children = self.lock().clone();
        debug!(container = %self.description, children = children.len(), "starting");
        start_all(&children, reference)
    }

    fn stop(&self) {
        let children = self.lock().clone();
        debug!(container = %self.description, children = children.len(), "stopping");
        stop_all(&children);
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
