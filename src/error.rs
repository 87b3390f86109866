//! Crate error type
//!
//! Every error carries a stable `E<nnn>` code. The hundreds digit picks the
//! family and the CLI exit status: 1 configuration, 2 file IO, 5 dispatch,
//! 9 internal.

use std::fmt::{self, Write as _};
use std::path::PathBuf;

use thiserror::Error;

use crate::dispatch::TaskId;

pub type Result<T> = std::result::Result<T, Error>;

/// Stable numeric code reported alongside each error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    IoRead = 200,
    IoWrite = 201,

    DispatcherClosed = 500,
    QueueFull = 501,
    TaskFailed = 502,
    AwaitTimeout = 503,
    ReplyDropped = 504,
    ReplyConsumed = 505,

    InternalError = 900,
    SerializeError = 901,
}

impl ErrorCode {
    /// Code as printed, e.g. `E502`
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Process exit status for this code's family
    pub fn exit_code(&self) -> i32 {
        i32::from(*self as u16 / 100) * 10
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", *self as u16)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// An explicitly named config file does not exist
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// A setting is out of range; `field` is its dotted path
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Submission attempted after shutdown was signaled
    #[error("Dispatcher is closed; no new tasks are accepted")]
    Closed,

    /// Bounded intake had no room on a non-blocking submission
    #[error("Intake queue is full ({bound} pending tasks)")]
    QueueFull { bound: usize },

    /// The task's computation returned an error or panicked
    #[error("Task {task_id} failed: {message}")]
    TaskFailed { task_id: TaskId, message: String },

    /// The producer gave up waiting; the task itself keeps running
    #[error("Timed out after {timeout_ms}ms waiting for task {task_id}")]
    AwaitTimeout { task_id: TaskId, timeout_ms: u64 },

    /// The reply slot was dropped without a value being written
    #[error("Reply for task {task_id} was dropped before delivery")]
    ReplyDropped { task_id: TaskId },

    #[error("Reply for task {task_id} was already read")]
    ReplyConsumed { task_id: TaskId },

    /// Rendering the effective config for `config show`
    #[error("Could not render configuration as TOML: {0}")]
    TomlRender(#[from] toml::ser::Error),

    /// Rendering the `run --json` summary
    #[error("Could not render summary as JSON: {0}")]
    JsonRender(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } | Error::Config(_) => ErrorCode::ConfigValidation,
            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Closed => ErrorCode::DispatcherClosed,
            Error::QueueFull { .. } => ErrorCode::QueueFull,
            Error::TaskFailed { .. } => ErrorCode::TaskFailed,
            Error::AwaitTimeout { .. } => ErrorCode::AwaitTimeout,
            Error::ReplyDropped { .. } => ErrorCode::ReplyDropped,
            Error::ReplyConsumed { .. } => ErrorCode::ReplyConsumed,
            Error::TomlRender(_) | Error::JsonRender(_) => ErrorCode::SerializeError,
            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Whether resubmitting or waiting again can succeed.
    ///
    /// Nothing is retried automatically; this is a hint for callers.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::QueueFull { .. } | Error::AwaitTimeout { .. } | Error::IoRead { .. }
        )
    }

    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    /// What the user can do about it, when there is something to do
    pub fn suggestion(&self) -> Option<&'static str> {
        let hint = match self {
            Error::ConfigNotFound { .. } => "Create one with 'gatepool config init'.",
            Error::ConfigParse { .. } => "Fix the TOML syntax; 'gatepool config validate' points at the problem.",
            Error::ConfigValidation { field: Some(_), .. } => "Correct the named setting in the config file or on the command line.",
            Error::Closed => "Shutdown was already requested; start a new dispatcher for more work.",
            Error::QueueFull { .. } => "Raise [dispatcher] queue_bound, or use the blocking submit.",
            Error::AwaitTimeout { .. } => "The task keeps running; wait on its handle again or raise await_timeout_ms.",
            _ => return None,
        };
        Some(hint)
    }

    /// Red code prefix and a yellow hint line, for stderr
    pub fn format_for_terminal(&self) -> String {
        let mut out = format!("\x1b[31mError [{}]\x1b[0m: {}\n", self.code(), self);
        if let Some(hint) = self.suggestion() {
            let _ = write!(out, "\n\x1b[33mHint\x1b[0m: {}\n", hint);
        }
        out
    }

    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code(), self)
    }

    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound { path: path.into() }
    }

    pub fn config_parse(message: impl Into<String>, source: Option<toml::de::Error>) -> Self {
        Error::ConfigParse {
            message: message.into(),
            source,
        }
    }

    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn task_failed(task_id: TaskId, message: impl Into<String>) -> Self {
        Error::TaskFailed {
            task_id,
            message: message.into(),
        }
    }
}
