// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration (TOML)
//!
//! ```toml
//! log_filter = "courier_core=debug,info"
//! log_path = "/var/log/courierd.log"
//! heartbeat_interval = "30s"
//!
//! [scheduler]
//! driver = "threaded"
//! thread_prefix = "courier"
//! ```

use courier_core::{ConfigError, SchedulerConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub scheduler: SchedulerConfig,
    /// Used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Log to this file instead of stderr
    pub log_path: Option<PathBuf>,
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            log_filter: "info".to_string(),
            log_path: None,
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

impl DaemonConfig {
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
