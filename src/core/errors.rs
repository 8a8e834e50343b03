/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use super::types::{Pid, TaskId};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result of a single inspection capability query
pub type InspectResult<T> = Result<T, InspectError>;

/// Resource collector result
pub type CollectorResult<T> = Result<T, CollectorError>;

/// Process control result
pub type ControlResult<T> = Result<T, ControlError>;

/// Quota manager result
pub type QuotaResult<T> = Result<T, QuotaError>;

/// Task manager result
pub type TaskManagerResult<T> = Result<T, TaskError>;

/// Configuration result
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised by a process inspection backend
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum InspectError {
    #[error("Process {0} not found")]
    #[diagnostic(code(inspect::not_found))]
    NotFound(Pid),

    #[error("Cannot read {metric} for process {pid}: {reason}")]
    #[diagnostic(
        code(inspect::unavailable),
        help("The platform may not expose this metric, or permissions are insufficient.")
    )]
    Unavailable {
        pid: Pid,
        metric: String,
        reason: String,
    },
}

impl InspectError {
    pub fn unavailable(pid: Pid, metric: &str, reason: impl Into<String>) -> Self {
        InspectError::Unavailable {
            pid,
            metric: metric.to_string(),
            reason: reason.into(),
        }
    }
}

/// Resource collector errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum CollectorError {
    #[error("Process {0} not found")]
    #[diagnostic(
        code(collector::not_found),
        help("The process exited between scheduling and collection.")
    )]
    NotFound(Pid),

    #[error("Failed to collect {resource} for process {pid}: {reason}")]
    #[diagnostic(
        code(collector::collection_failed),
        help("Disable the sub-collector in the collector config if the platform cannot provide it.")
    )]
    CollectionFailed {
        pid: Pid,
        resource: String,
        reason: String,
    },

    #[error("System metrics unavailable: {0}")]
    #[diagnostic(code(collector::system_unavailable))]
    SystemUnavailable(String),

    #[error("All {attempted} collections in batch failed")]
    #[diagnostic(
        code(collector::batch_failed),
        help("Every requested process was missing or unreadable.")
    )]
    BatchFailed { attempted: usize },
}

/// Process control errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ControlError {
    #[error("Process {0} not found")]
    #[diagnostic(code(control::not_found))]
    NotFound(Pid),

    #[error("Failed to send {signal} to process {pid}: {reason}")]
    #[diagnostic(
        code(control::signal_failed),
        help("Check that the governor has permission to signal the target process.")
    )]
    SignalFailed {
        pid: Pid,
        signal: String,
        reason: String,
    },

    #[error("Operation not supported on this platform: {0}")]
    #[diagnostic(code(control::unsupported))]
    Unsupported(String),
}

/// Quota manager errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum QuotaError {
    #[error("Quota '{0}' not found")]
    #[diagnostic(code(quota::not_found), help("Quotas are defined in the quota config."))]
    QuotaNotFound(String),

    #[error("Process {pid} is already tracked by quota '{quota}'")]
    #[diagnostic(code(quota::already_tracked))]
    ProcessAlreadyTracked { quota: String, pid: Pid },

    #[error("Process {pid} is not tracked by quota '{quota}'")]
    #[diagnostic(code(quota::not_tracked))]
    ProcessNotTracked { quota: String, pid: Pid },

    #[error("Invalid quota configuration: {0}")]
    #[diagnostic(code(quota::invalid_config))]
    InvalidConfig(String),
}

/// Task manager errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum TaskError {
    #[error("Invalid task: {0}")]
    #[diagnostic(code(task::validation), help("Tasks need a name and a command."))]
    Validation(String),

    #[error("Task '{0}' already exists")]
    #[diagnostic(code(task::duplicate_id))]
    DuplicateId(TaskId),

    #[error("Task '{0}' not found")]
    #[diagnostic(code(task::not_found))]
    NotFound(TaskId),

    #[error("Cannot {operation} task '{id}' while it is {status}")]
    #[diagnostic(code(task::invalid_state))]
    InvalidState {
        id: TaskId,
        status: String,
        operation: String,
    },

    #[error("Task '{id}' is waiting on dependencies: {}", waiting_on.join(", "))]
    #[diagnostic(
        code(task::dependency),
        help("The task stays pending and is re-evaluated on the next scheduler tick.")
    )]
    Dependency { id: TaskId, waiting_on: Vec<TaskId> },

    #[error("Task limit reached: {limit}")]
    #[diagnostic(code(task::limit_reached), help("Remove finished tasks to make room."))]
    LimitReached { limit: usize },

    #[error("Concurrency limit reached: {limit} tasks already running")]
    #[diagnostic(code(task::concurrency_limit))]
    ConcurrencyLimit { limit: usize },

    #[error("Task manager is stopped")]
    #[diagnostic(code(task::stopped), help("Start the task manager again before launching tasks."))]
    Stopped,

    #[error("Failed to spawn task '{id}': {reason}")]
    #[diagnostic(
        code(task::spawn_failed),
        help("The task remains pending. Fix the command or environment and start it again.")
    )]
    SpawnFailed { id: TaskId, reason: String },

    #[error("Invalid task manager configuration: {0}")]
    #[diagnostic(code(task::invalid_config))]
    InvalidConfig(String),
}

/// Configuration loading errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {reason}")]
    #[diagnostic(code(config::io))]
    Io { path: String, reason: String },

    #[error("Cannot parse config file {path}: {reason}")]
    #[diagnostic(code(config::parse), help("The config file must be JSON."))]
    Parse { path: String, reason: String },

    #[error("Invalid configuration: {0}")]
    #[diagnostic(code(config::invalid))]
    Invalid(String),
}

impl From<QuotaError> for ConfigError {
    fn from(err: QuotaError) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}

impl From<TaskError> for ConfigError {
    fn from(err: TaskError) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}
