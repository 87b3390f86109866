//! Configuration loading and validation tests

mod common;

use predicates::prelude::*;

use common::{gatepool_cmd, ConfigFixture, VALID_CONFIG};
use gatepool::config::{CliOverrides, GatepoolConfig};
use gatepool::{Error, ErrorCode};

fn validate(fixture: &ConfigFixture) -> assert_cmd::assert::Assert {
    gatepool_cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
}

// ─────────────────────────────────────────────────────────────────
// Valid Configurations
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_empty_file_uses_defaults() {
    let fixture = ConfigFixture::with("");
    validate(&fixture)
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));

    let config = GatepoolConfig::from_file(&fixture.config_path).unwrap();
    assert_eq!(config.dispatcher.capacity, 4);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_full_config() {
    let fixture = ConfigFixture::with(
        r#"
[dispatcher]
workers = 0
capacity = 8
queue_bound = 0
await_timeout_ms = 2000
drain_on_shutdown = false

[runtime]
worker_threads = 2

[logging]
level = "debug"
max_file_size_mb = 50
max_files = 3
json_format = true
"#,
    );
    validate(&fixture).success();

    let config = GatepoolConfig::from_file(&fixture.config_path).unwrap();
    let dispatcher = config.to_dispatcher_config();
    assert_eq!(dispatcher.workers, 0);
    assert_eq!(dispatcher.capacity, 8);
    assert_eq!(dispatcher.queue_bound, None);
    assert_eq!(
        dispatcher.await_timeout,
        Some(std::time::Duration::from_millis(2000))
    );
    assert!(!config.dispatcher.drain_on_shutdown);
    assert_eq!(config.runtime_threads(), 2);
}

#[test]
fn test_cli_overrides_win_over_file() {
    let fixture = ConfigFixture::with(VALID_CONFIG);
    let mut config = GatepoolConfig::from_file(&fixture.config_path).unwrap();
    config
        .apply_cli_overrides(&CliOverrides {
            workers: None,
            capacity: Some(3),
            queue_bound: None,
        })
        .unwrap();

    assert_eq!(config.dispatcher.workers, 2);
    assert_eq!(config.dispatcher.capacity, 3);
    assert_eq!(config.dispatcher.queue_bound, 16);
}

// ─────────────────────────────────────────────────────────────────
// Invalid Configurations
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_zero_capacity_rejected() {
    let fixture = ConfigFixture::with("[dispatcher]\ncapacity = 0\n");
    validate(&fixture)
        .failure()
        .code(10)
        .stderr(predicate::str::contains("capacity must be at least 1"));
}

#[test]
fn test_too_many_workers_rejected() {
    let fixture = ConfigFixture::with("[dispatcher]\nworkers = 5000\n");
    validate(&fixture)
        .failure()
        .stderr(predicate::str::contains("workers must be at most 1024"));
}

#[test]
fn test_invalid_log_level() {
    let fixture = ConfigFixture::with("[logging]\nlevel = \"chatty\"\n");
    validate(&fixture)
        .failure()
        .stderr(predicate::str::contains("invalid log level"));
}

#[test]
fn test_malformed_toml() {
    let fixture = ConfigFixture::with("[dispatcher\ncapacity = ");
    validate(&fixture)
        .failure()
        .stderr(predicate::str::contains("E101"));

    let err = GatepoolConfig::from_file(&fixture.config_path).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConfigParseError);
}

#[test]
fn test_wrong_value_type() {
    let fixture = ConfigFixture::with("[dispatcher]\nworkers = \"many\"\n");
    let err = GatepoolConfig::from_file(&fixture.config_path).unwrap_err();
    assert!(matches!(err, Error::ConfigParse { .. }));
}

#[test]
fn test_explicit_missing_path() {
    let err = GatepoolConfig::load(Some("/nonexistent/gatepool.toml")).unwrap_err();
    assert!(matches!(err, Error::ConfigNotFound { .. }));
    assert_eq!(err.exit_code(), 10);
}

// ─────────────────────────────────────────────────────────────────
// Environment Overrides
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_env_overrides_file() {
    let fixture = ConfigFixture::with(VALID_CONFIG);
    gatepool_cmd()
        .env("GATEPOOL_CAPACITY", "7")
        .env("GATEPOOL_QUEUE_BOUND", "0")
        .args(["config", "show", "--config", fixture.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("capacity = 7"))
        .stdout(predicate::str::contains("queue_bound = 0"))
        .stdout(predicate::str::contains("workers = 2"));
}

#[test]
fn test_env_invalid_level_fails_validation() {
    let fixture = ConfigFixture::with(VALID_CONFIG);
    gatepool_cmd()
        .env("GATEPOOL_LOG_LEVEL", "shouty")
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .failure();
}

// ─────────────────────────────────────────────────────────────────
// Init
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_init_writes_loadable_file() {
    let fixture = ConfigFixture::new();
    let nested = fixture.temp_dir.path().join("nested").join("gatepool.toml");

    let written = gatepool::config::init_config(nested.to_str(), false).unwrap();
    assert_eq!(written, nested);

    let config = GatepoolConfig::from_file(&written).unwrap();
    assert!(config.validate().is_ok());
    assert!(config.dispatcher.drain_on_shutdown);
}
