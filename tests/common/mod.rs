//! Shared helpers for integration tests

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use tempfile::TempDir;

/// Command for the gatepool binary, isolated from the caller's GATEPOOL_* settings
pub fn gatepool_cmd() -> Command {
    let mut cmd = Command::cargo_bin("gatepool").unwrap();
    for key in [
        "GATEPOOL_CONFIG",
        "GATEPOOL_WORKERS",
        "GATEPOOL_CAPACITY",
        "GATEPOOL_QUEUE_BOUND",
        "GATEPOOL_AWAIT_TIMEOUT_MS",
        "GATEPOOL_LOG_LEVEL",
        "GATEPOOL_LOG_FILE",
        "GATEPOOL_LOG_JSON",
        "RUST_LOG",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

/// Config file living in its own temp directory
pub struct ConfigFixture {
    pub temp_dir: TempDir,
    pub config_path: PathBuf,
}

impl ConfigFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("gatepool.toml");
        Self {
            temp_dir,
            config_path,
        }
    }

    /// Fixture pre-filled with `content`
    pub fn with(content: &str) -> Self {
        let fixture = Self::new();
        fixture.write(content);
        fixture
    }

    pub fn write(&self, content: &str) {
        fs::write(&self.config_path, content).unwrap();
    }

    pub fn path(&self) -> &str {
        self.config_path.to_str().unwrap()
    }
}

/// A small valid configuration
pub const VALID_CONFIG: &str = r#"
[dispatcher]
workers = 2
capacity = 2
queue_bound = 16

[logging]
level = "warn"
"#;
