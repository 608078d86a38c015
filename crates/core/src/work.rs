// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ready-made [`Work`] implementations wrapping a closure

use crate::calendar::{CalendarAnchor, CalendarField};
use crate::clock;
use crate::error::{TimerError, WorkResult};
use crate::group::{Registration, TaskHandle, Work};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Body invoked on every firing of a task
pub type WorkFn = Arc<dyn Fn(&TaskHandle) -> WorkResult + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pacing {
    FixedRate(Duration),
    FixedDelay(Duration),
}

/// Work firing forever at a fixed rate or with a fixed delay
///
/// The first firing comes one period after registration unless an initial
/// delay is set.
#[derive(Clone)]
pub struct PeriodicWork {
    description: String,
    pacing: Pacing,
    initial_delay: Option<Duration>,
    body: WorkFn,
}

impl fmt::Debug for PeriodicWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicWork")
            .field("description", &self.description)
            .field("pacing", &self.pacing)
            .field("initial_delay", &self.initial_delay)
            .finish()
    }
}

impl PeriodicWork {
    /// Due times advance by `period` from the previous due time
    pub fn fixed_rate<F>(description: impl Into<String>, period: Duration, body: F) -> Self
    where
        F: Fn(&TaskHandle) -> WorkResult + Send + Sync + 'static,
    {
        Self::new(description, Pacing::FixedRate(period), body)
    }

    /// Each firing is armed `delay` after the previous one completed
    pub fn fixed_delay<F>(description: impl Into<String>, delay: Duration, body: F) -> Self
    where
        F: Fn(&TaskHandle) -> WorkResult + Send + Sync + 'static,
    {
        Self::new(description, Pacing::FixedDelay(delay), body)
    }

    fn new<F>(description: impl Into<String>, pacing: Pacing, body: F) -> Self
    where
        F: Fn(&TaskHandle) -> WorkResult + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            pacing,
            initial_delay: None,
            body: Arc::new(body),
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }
}

impl Work for PeriodicWork {
    fn description(&self) -> &str {
        &self.description
    }

    fn register(&self, registration: &mut Registration<'_>) -> Result<(), TimerError> {
        let now = registration.now();
        match self.pacing {
            Pacing::FixedRate(period) => {
                let first = clock::add(now, self.initial_delay.unwrap_or(period));
                registration.fixed_rate(first, period)?;
            }
            Pacing::FixedDelay(delay) => {
                let first = clock::add(now, self.initial_delay.unwrap_or(delay));
                registration.fixed_delay(first, delay)?;
            }
        }
        Ok(())
    }

    fn run(&self, task: &TaskHandle) -> WorkResult {
        (self.body)(task)
    }
}

/// Work firing once after a delay; its task then leaves the group
#[derive(Clone)]
pub struct OneShotWork {
    description: String,
    delay: Duration,
    body: WorkFn,
}

impl fmt::Debug for OneShotWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneShotWork")
            .field("description", &self.description)
            .field("delay", &self.delay)
            .finish()
    }
}

impl OneShotWork {
    pub fn new<F>(description: impl Into<String>, delay: Duration, body: F) -> Self
    where
        F: Fn(&TaskHandle) -> WorkResult + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            delay,
            body: Arc::new(body),
        }
    }
}

impl Work for OneShotWork {
    fn description(&self) -> &str {
        &self.description
    }

    fn register(&self, registration: &mut Registration<'_>) -> Result<(), TimerError> {
        registration.after(self.delay)?;
        Ok(())
    }

    fn run(&self, task: &TaskHandle) -> WorkResult {
        let result = (self.body)(task);
        task.cancel();
        result
    }
}

/// Work launched at calendar-aligned instants ("28 past every hour")
#[derive(Clone)]
pub struct CalendarWork {
    description: String,
    anchor: CalendarAnchor,
    body: WorkFn,
}

impl fmt::Debug for CalendarWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalendarWork")
            .field("description", &self.description)
            .field("anchor", &self.anchor)
            .finish()
    }
}

impl CalendarWork {
    pub fn new<F>(description: impl Into<String>, anchor: CalendarAnchor, body: F) -> Self
    where
        F: Fn(&TaskHandle) -> WorkResult + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            anchor,
            body: Arc::new(body),
        }
    }

    pub fn with_offset(mut self, field: CalendarField, amount: i64) -> Self {
        self.anchor = self.anchor.with_offset(field, amount);
        self
    }

    pub fn anchor(&self) -> &CalendarAnchor {
        &self.anchor
    }
}

impl Work for CalendarWork {
    fn description(&self) -> &str {
        &self.description
    }

    fn register(&self, registration: &mut Registration<'_>) -> Result<(), TimerError> {
        let first = self.anchor.first_launch(registration.now());
        registration.once(first)?;
        Ok(())
    }

    fn run(&self, task: &TaskHandle) -> WorkResult {
        let result = (self.body)(task);
        let Some(group) = task.group() else {
            return result;
        };
        let now = group.now();
        let mut next = self.anchor.first_launch(now);
        if next <= now {
            next = self.anchor.following(next);
        }
        if let Err(e) = task.rearm_at(next) {
            warn!(task = %task.id(), work = %self.description, error = %e, "failed to re-arm calendar work");
        }
        result
    }
}

#[cfg(test)]
#[path = "work_tests.rs"]
mod tests;
