// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Courier daemon (courierd)
//!
//! Hosts one scheduler for the process lifetime and tears it down on
//! SIGTERM/SIGINT.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod config;
mod lifecycle;

use std::path::Path;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info};

use crate::config::DaemonConfig;
use crate::lifecycle::LifecycleError;

/// How often manual timers are pumped
const PUMP_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Optional config path argument
    let config = match std::env::args().nth(1) {
        Some(path) => DaemonConfig::load(Path::new(&path))?,
        None => DaemonConfig::default(),
    };

    let _log_guard = setup_logging(&config)?;
    info!("Starting courierd (pid: {})", std::process::id());

    let daemon = lifecycle::startup(&config)?;

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    println!("READY");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(PUMP_INTERVAL) => {
                let fired = daemon.pump();
                if fired > 0 {
                    debug!(fired, "manual timers pumped");
                }
            }

            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                break;
            }

            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down...");
                break;
            }
        }
    }

    daemon.shutdown();
    info!("Daemon stopped");
    Ok(())
}

fn setup_logging(
    config: &DaemonConfig,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let (writer, guard) = match &config.log_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file_name = path
                .file_name()
                .ok_or_else(|| LifecycleError::InvalidLogPath(path.clone()))?;
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name))
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer))
        .init();

    Ok(guard)
}
