//! Error types for the CNC controller
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - Exit codes for CLI

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::actuator::ActuatorError;
use crate::types::{MachineStatus, TaskStatus};

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoNotFound = 203,
    JobInvalid = 210,

    // Translation errors (3xx)
    UnsupportedCommand = 300,
    InvalidParameter = 301,

    // Dispatch and queue errors (4xx)
    QueueFull = 400,
    TaskNotFound = 401,
    UnknownMachine = 402,
    DuplicateMachine = 403,
    DuplicateTask = 404,
    InvalidState = 405,

    // Execution errors (5xx)
    ActuatorFailure = 500,
    InvalidTransition = 501,
    TasksFailed = 502,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10,
            200..=299 => 20,
            300..=399 => 30,
            400..=499 => 40,
            500..=599 => 50,
            900..=999 => 90,
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the controller
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Job file could not be loaded
    #[error("Invalid job file: {0}")]
    Job(String),

    // ─────────────────────────────────────────────────────────────
    // Translation Errors
    // ─────────────────────────────────────────────────────────────

    /// Command token not in the recognised set
    #[error("Unsupported G-code command: {command}")]
    UnsupportedCommand { command: String },

    /// Missing or out-of-range parameter
    #[error("Invalid parameter '{parameter}' for {command}: {reason}")]
    InvalidParameter {
        command: String,
        parameter: String,
        reason: String,
    },

    // ─────────────────────────────────────────────────────────────
    // Dispatch Errors
    // ─────────────────────────────────────────────────────────────

    /// Machine queue at capacity
    #[error("Task queue for machine {machine_id} is full (capacity {capacity})")]
    QueueFull { machine_id: String, capacity: usize },

    /// Task unknown or already terminal
    #[error("Task not found or no longer cancellable: {task_id}")]
    TaskNotFound { task_id: String },

    /// Machine not registered
    #[error("Unknown machine: {machine_id}")]
    UnknownMachine { machine_id: String },

    /// Machine id already registered
    #[error("Machine already registered: {machine_id}")]
    DuplicateMachine { machine_id: String },

    /// Task id already known to the machine
    #[error("Task {task_id} already submitted to machine {machine_id}")]
    DuplicateTask { machine_id: String, task_id: String },

    /// Operation not allowed in the machine's current status
    #[error("Machine {machine_id} is {status}: {message}")]
    InvalidState {
        machine_id: String,
        status: MachineStatus,
        message: String,
    },

    // ─────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────

    /// Actuator failed to perform or confirm a command
    #[error("Actuator failure on machine {machine_id}: {source}")]
    Actuator {
        machine_id: String,
        #[source]
        source: ActuatorError,
    },

    /// Non-monotonic task status change
    #[error("Task {task_id} cannot move from {from} to {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// One or more tasks in a job did not complete
    #[error("{failed} of {total} tasks did not complete")]
    TasksFailed { failed: usize, total: usize },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,

            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::Json(_) => ErrorCode::JobInvalid,
            Error::Job(_) => ErrorCode::JobInvalid,

            Error::UnsupportedCommand { .. } => ErrorCode::UnsupportedCommand,
            Error::InvalidParameter { .. } => ErrorCode::InvalidParameter,

            Error::QueueFull { .. } => ErrorCode::QueueFull,
            Error::TaskNotFound { .. } => ErrorCode::TaskNotFound,
            Error::UnknownMachine { .. } => ErrorCode::UnknownMachine,
            Error::DuplicateMachine { .. } => ErrorCode::DuplicateMachine,
            Error::DuplicateTask { .. } => ErrorCode::DuplicateTask,
            Error::InvalidState { .. } => ErrorCode::InvalidState,

            Error::Actuator { .. } => ErrorCode::ActuatorFailure,
            Error::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Error::TasksFailed { .. } => ErrorCode::TasksFailed,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the error is retryable
    ///
    /// The core never retries; only transient IO qualifies.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Io(_) | Error::IoWrite { .. })
    }

    /// Whether the error was detected before any hardware side effect
    pub fn is_pre_execution(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedCommand { .. }
                | Error::InvalidParameter { .. }
                | Error::QueueFull { .. }
                | Error::UnknownMachine { .. }
                | Error::DuplicateMachine { .. }
                | Error::DuplicateTask { .. }
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'cnc-controller config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'cnc-controller config validate' to see details."
            ),
            Error::ConfigValidation { .. } => Some(
                "Review the configuration file and fix the invalid values."
            ),
            Error::Job(_) | Error::Json(_) => Some(
                "A job file is JSON: {\"tasks\": [{\"machine\": \"<id>\", \"gcode\": [{\"command\": \"G01\", \"parameters\": {\"x\": 10}}]}]}"
            ),
            Error::UnsupportedCommand { .. } => Some(
                "Supported commands: G00, G01, G28, G90, G91, F, M06."
            ),
            Error::UnknownMachine { .. } => Some(
                "Declare the machine under [[machines]] in the configuration file."
            ),
            Error::QueueFull { .. } => Some(
                "Wait for queued tasks to finish or raise executor.queue_capacity."
            ),
            Error::InvalidState { .. } => Some(
                "Stop the machine and wait for the running task to reach a command boundary first."
            ),
            Error::Actuator { .. } => Some(
                "Inspect the machine, then reset it. The recorded position is the last confirmed one."
            ),
            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            self.code().as_str(),
            self
        );

        if let Some(hint) = self.suggestion() {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code().as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config validation error
    pub fn config_validation(message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(
        command: impl Into<String>,
        parameter: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidParameter {
            command: command.into(),
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Create an unknown machine error
    pub fn unknown_machine(machine_id: impl Into<String>) -> Self {
        Error::UnknownMachine {
            machine_id: machine_id.into(),
        }
    }

    /// Create a task not found error
    pub fn task_not_found(task_id: impl Into<String>) -> Self {
        Error::TaskNotFound {
            task_id: task_id.into(),
        }
    }
}
