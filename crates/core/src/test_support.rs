// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener doubles shared by unit tests

use crate::error::LaunchError;
use crate::listener::StartStopListener;
use chrono::NaiveDateTime;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Start(NaiveDateTime),
    Stop,
}

/// Records every start/stop it receives
pub struct RecordingListener {
    description: String,
    fail_start: bool,
    calls: Mutex<Vec<Call>>,
}

impl RecordingListener {
    pub fn new(description: &str) -> Arc<Self> {
        Arc::new(Self {
            description: description.to_string(),
            fail_start: false,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Records the call, then fails every start
    pub fn failing(description: &str) -> Arc<Self> {
        Arc::new(Self {
            description: description.to_string(),
            fail_start: true,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl StartStopListener for RecordingListener {
    fn description(&self) -> &str {
        &self.description
    }

    fn start(&self, reference: NaiveDateTime) -> Result<(), LaunchError> {
        self.calls.lock().unwrap().push(Call::Start(reference));
        if self.fail_start {
            return Err(LaunchError::Failed {
                launcher: self.description.clone(),
                source: "refused".into(),
            });
        }
        Ok(())
    }

    fn stop(&self) {
        self.calls.lock().unwrap().push(Call::Stop);
    }
}
