// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use courier_core::TimerDriver;

#[test]
fn empty_file_yields_defaults() {
    let config = DaemonConfig::from_toml_str("").unwrap();
    assert_eq!(config, DaemonConfig::default());
    assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
    assert_eq!(config.scheduler.driver, TimerDriver::Threaded);
}

#[test]
fn parses_every_field() {
    let config = DaemonConfig::from_toml_str(
        r#"
log_filter = "courier_core=debug"
log_path = "/tmp/courierd.log"
heartbeat_interval = "1m 30s"

[scheduler]
driver = "manual"
thread_prefix = "etl"
"#,
    )
    .unwrap();

    assert_eq!(config.log_filter, "courier_core=debug");
    assert_eq!(config.log_path, Some(PathBuf::from("/tmp/courierd.log")));
    assert_eq!(config.heartbeat_interval, Duration::from_secs(90));
    assert_eq!(config.scheduler.driver, TimerDriver::Manual);
    assert_eq!(config.scheduler.thread_prefix, "etl");
}

#[test]
fn rejects_malformed_interval() {
    let err = DaemonConfig::from_toml_str(r#"heartbeat_interval = "soon""#).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn loads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("courierd.toml");
    std::fs::write(&path, "heartbeat_interval = \"5s\"\n").unwrap();

    let config = DaemonConfig::load(&path).unwrap();
    assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = DaemonConfig::load(&dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}
