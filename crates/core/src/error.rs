// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the scheduling engine

use std::path::PathBuf;
use thiserror::Error;

/// Error raised by caller-supplied work bodies
pub type WorkError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of one invocation of caller-supplied work
pub type WorkResult = Result<(), WorkError>;

/// Errors from the low-level timer
#[derive(Debug, Error)]
pub enum TimerError {
    #[error("timer {timer} has been shut down")]
    Shutdown { timer: String },
    #[error("timer {timer} cannot repeat with a zero period")]
    ZeroPeriod { timer: String },
    #[error("failed to spawn worker for timer {timer}: {source}")]
    Spawn {
        timer: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced by `start` on a listener tree
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("launcher {launcher} failed: {source}")]
    Failed {
        launcher: String,
        #[source]
        source: WorkError,
    },
    #[error(transparent)]
    Timer(#[from] TimerError),
}

/// Errors loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
