//! Configuration for gatepool
//!
//! Sources, highest precedence first:
//! 1. CLI arguments
//! 2. Environment variables (GATEPOOL_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dispatch::DispatcherConfig;
use crate::error::{Error, Result};

/// Upper limit on fixed-pool executor loops
pub const MAX_WORKERS: usize = 1024;

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Complete gatepool configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatepoolConfig {
    /// Dispatcher sizing and timeouts
    pub dispatcher: DispatcherSettings,

    /// Async runtime settings
    pub runtime: RuntimeSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Dispatcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherSettings {
    /// Executor loops (0 = gate-only mode, one spawned task per submission)
    pub workers: usize,

    /// Maximum task bodies running at once
    pub capacity: usize,

    /// Intake queue bound (0 = unbounded)
    pub queue_bound: usize,

    /// Default producer wait limit in milliseconds (0 = wait forever)
    pub await_timeout_ms: u64,

    /// Finish queued tasks on Ctrl+C instead of abandoning them
    pub drain_on_shutdown: bool,
}

/// Runtime settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Tokio worker threads (0 = one per CPU)
    pub worker_threads: usize,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (unset = console only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Emit JSON lines instead of compact text
    pub json_format: bool,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        let defaults = DispatcherConfig::default();
        Self {
            workers: defaults.workers,
            capacity: defaults.capacity,
            queue_bound: defaults.queue_bound.unwrap_or(0),
            await_timeout_ms: 0,
            drain_on_shutdown: true,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

/// Per-run overrides from the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub workers: Option<usize>,
    pub capacity: Option<usize>,
    pub queue_bound: Option<usize>,
}

impl GatepoolConfig {
    /// Load configuration from file with environment overrides applied
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = match Self::find_config_file(config_path)? {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.expand_paths();
        config.validate()?;

        Ok(config)
    }

    /// Parse a single TOML file without env overrides or validation
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading configuration file");
        let content = fs::read_to_string(path).map_err(|e| Error::IoRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = toml::from_str(&content).map_err(|e| {
            Error::config_parse(format!("{}: {}", path.display(), e), Some(e))
        })?;
        info!(path = %path.display(), "Configuration loaded from file");
        Ok(config)
    }

    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        let search_paths = [
            Some(PathBuf::from("gatepool.toml")),
            dirs::config_dir().map(|p| p.join("gatepool").join("config.toml")),
            dirs::home_dir().map(|p| p.join(".gatepool").join("config.toml")),
            Some(PathBuf::from("/etc/gatepool/config.toml")),
        ];

        for path in search_paths.into_iter().flatten() {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply GATEPOOL_* environment variables
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup; unparsable values are ignored
    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let flag = |key: &str| lookup(key).map(|v| v.eq_ignore_ascii_case("true") || v == "1");

        if let Some(n) = number("GATEPOOL_WORKERS") {
            self.dispatcher.workers = n as usize;
        }
        if let Some(n) = number("GATEPOOL_CAPACITY") {
            self.dispatcher.capacity = n as usize;
        }
        if let Some(n) = number("GATEPOOL_QUEUE_BOUND") {
            self.dispatcher.queue_bound = n as usize;
        }
        if let Some(n) = number("GATEPOOL_AWAIT_TIMEOUT_MS") {
            self.dispatcher.await_timeout_ms = n;
        }
        if let Some(b) = flag("GATEPOOL_DRAIN_ON_SHUTDOWN") {
            self.dispatcher.drain_on_shutdown = b;
        }

        if let Some(n) = number("GATEPOOL_WORKER_THREADS") {
            self.runtime.worker_threads = n as usize;
        }

        if let Some(level) = lookup("GATEPOOL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(file) = lookup("GATEPOOL_LOG_FILE") {
            self.logging.file = Some(file);
        }
        if let Some(b) = flag("GATEPOOL_LOG_JSON") {
            self.logging.json_format = b;
        }
    }

    /// Apply command-line overrides and re-validate
    pub fn apply_cli_overrides(&mut self, overrides: &CliOverrides) -> Result<()> {
        if let Some(workers) = overrides.workers {
            self.dispatcher.workers = workers;
        }
        if let Some(capacity) = overrides.capacity {
            self.dispatcher.capacity = capacity;
        }
        if let Some(bound) = overrides.queue_bound {
            self.dispatcher.queue_bound = bound;
        }
        self.validate()
    }

    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.dispatcher.capacity == 0 {
            return Err(Error::config_field_invalid(
                "dispatcher.capacity",
                "capacity must be at least 1",
            ));
        }
        if self.dispatcher.workers > MAX_WORKERS {
            return Err(Error::config_field_invalid(
                "dispatcher.workers",
                format!(
                    "workers must be at most {} (got {})",
                    MAX_WORKERS, self.dispatcher.workers
                ),
            ));
        }
        if !VALID_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "invalid log level '{}', expected one of: {}",
                    self.logging.level,
                    VALID_LEVELS.join(", ")
                ),
            ));
        }
        Ok(())
    }

    /// Dispatcher parameters in runtime form
    pub fn to_dispatcher_config(&self) -> DispatcherConfig {
        let settings = &self.dispatcher;
        let mut config = DispatcherConfig::new(
            settings.workers,
            settings.capacity,
            (settings.queue_bound > 0).then_some(settings.queue_bound),
        );
        if settings.await_timeout_ms > 0 {
            config = config.with_await_timeout(Duration::from_millis(settings.await_timeout_ms));
        }
        config
    }

    /// Tokio worker thread count
    pub fn runtime_threads(&self) -> usize {
        match self.runtime.worker_threads {
            0 => num_cpus::get(),
            n => n,
        }
    }
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or(std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Default location for `config init`
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".gatepool")
        .join("config.toml")
}

/// Write a commented default configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(default_config_path);

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

fn generate_default_config() -> String {
    r#"# gatepool configuration

[dispatcher]
# Executor loops pulling from the intake queue.
# 0 selects gate-only mode: one spawned task per submission.
workers = 4

# Maximum number of tasks running at the same time
capacity = 4

# Pending tasks the intake holds before submit waits (0 = unbounded)
queue_bound = 100

# Default time a caller waits for a result, in milliseconds (0 = no limit)
await_timeout_ms = 0

# On Ctrl+C, finish queued tasks before exiting
drain_on_shutdown = true

[runtime]
# Tokio worker threads (0 = one per CPU)
worker_threads = 0

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.gatepool/logs/gatepool.log"

# Maximum log file size in MB before rotation
max_file_size_mb = 100

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}
