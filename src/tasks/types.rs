/*!
 * Task Types
 * Tasks, results, events, statistics, and manager configuration
 */

use crate::core::errors::{TaskError, TaskManagerResult};
use crate::core::limits::{
    DEFAULT_HISTORY_SIZE, DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_TASKS, DEFAULT_RETRY_ATTEMPTS,
    DEFAULT_STATS_INTERVAL, DEFAULT_TASK_CHECK_INTERVAL, DEFAULT_TASK_EVENT_QUEUE,
    DEFAULT_TASK_TIMEOUT, WATCHDOG_INTERVAL,
};
use crate::core::serde::{
    duration_millis, is_default, is_empty_vec, is_none, is_zero_u32, optional_duration_millis,
    optional_system_time_micros, serialize_duration_secs, system_time_micros,
};
use crate::core::types::{Pid, Priority, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Paused,
    Retry,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }

    /// Whether `self -> next` is a permitted transition
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Retry)
                | (Running, Cancelled)
                | (Running, Paused)
                | (Retry, Pending)
                | (Paused, Pending)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Paused => "paused",
            TaskStatus::Retry => "retry",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied task definition. Unset fields take manager defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskRequest {
    #[serde(skip_serializing_if = "is_none")]
    pub id: Option<TaskId>,
    pub name: String,
    pub command: String,
    #[serde(skip_serializing_if = "is_empty_vec")]
    pub args: Vec<String>,
    /// Added to the inherited environment
    #[serde(skip_serializing_if = "is_default")]
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "is_none")]
    pub working_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "is_none")]
    pub priority: Option<Priority>,
    #[serde(with = "optional_duration_millis", skip_serializing_if = "is_none")]
    pub timeout: Option<Duration>,
    #[serde(skip_serializing_if = "is_none")]
    pub max_retries: Option<u32>,
    #[serde(skip_serializing_if = "is_empty_vec")]
    pub dependencies: Vec<TaskId>,
}

impl TaskRequest {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn with_dependency(mut self, id: impl Into<TaskId>) -> Self {
        self.dependencies.push(id.into());
        self
    }
}

/// A task known to the manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "is_default")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub working_dir: Option<PathBuf>,
    /// Recorded for callers; the pending queue is FIFO
    pub priority: Priority,
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub dependencies: Vec<TaskId>,
    pub status: TaskStatus,

    #[serde(with = "system_time_micros")]
    pub created_at: SystemTime,
    #[serde(with = "optional_system_time_micros", skip_serializing_if = "is_none", default)]
    pub started_at: Option<SystemTime>,
    #[serde(with = "optional_system_time_micros", skip_serializing_if = "is_none", default)]
    pub completed_at: Option<SystemTime>,

    #[serde(default, skip_serializing_if = "is_none")]
    pub exit_code: Option<i32>,
    /// Stdout log of the latest execution
    #[serde(default, skip_serializing_if = "is_none")]
    pub log_path: Option<PathBuf>,
    /// Most recent spawn or execution error
    #[serde(default, skip_serializing_if = "is_none")]
    pub last_error: Option<String>,
    /// Native PID while running
    #[serde(default, skip_serializing_if = "is_none")]
    pub os_pid: Option<Pid>,
}

impl Task {
    /// Move to `next` if the transition is permitted
    pub(crate) fn transition(&mut self, next: TaskStatus, operation: &str) -> TaskManagerResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(TaskError::InvalidState {
                id: self.id.clone(),
                status: self.status.to_string(),
                operation: operation.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}

/// How one execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

/// Record of one finished execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub outcome: TaskOutcome,
    /// 1-based execution attempt
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "is_none")]
    pub exit_code: Option<i32>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    /// Tail of the stdout log
    pub output: String,
    #[serde(default, skip_serializing_if = "is_none")]
    pub error: Option<String>,
    #[serde(with = "system_time_micros")]
    pub timestamp: SystemTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventType {
    Created,
    Started,
    Completed,
    Failed,
    Cancelled,
    Retry,
    Timeout,
    Paused,
}

/// Timestamped task event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub event_type: TaskEventType,
    pub task_id: TaskId,
    #[serde(with = "system_time_micros")]
    pub timestamp: SystemTime,
    pub message: String,
}

impl TaskEvent {
    pub(crate) fn new(event_type: TaskEventType, task_id: &str, message: impl Into<String>) -> Self {
        Self {
            event_type,
            task_id: task_id.to_string(),
            timestamp: SystemTime::now(),
            message: message.into(),
        }
    }
}

/// Task totals by status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub queued: usize,
    pub results_recorded: usize,
    /// Mean start-to-finish time of completed tasks
    #[serde(serialize_with = "serialize_duration_secs", skip_deserializing)]
    pub average_duration: Duration,
    pub events_dropped: u64,
}

/// Task manager configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskManagerConfig {
    pub max_tasks: usize,
    pub max_concurrent: usize,
    #[serde(with = "duration_millis")]
    pub default_timeout: Duration,
    pub retry_attempts: u32,
    #[serde(with = "duration_millis")]
    pub check_interval: Duration,
    pub history_size: usize,
    /// Directory for per-task stdout/stderr logs
    pub log_dir: PathBuf,
    pub event_queue_size: usize,
    #[serde(with = "duration_millis")]
    pub watchdog_interval: Duration,
    #[serde(with = "duration_millis")]
    pub stats_interval: Duration,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            max_tasks: DEFAULT_MAX_TASKS,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            default_timeout: DEFAULT_TASK_TIMEOUT,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            check_interval: DEFAULT_TASK_CHECK_INTERVAL,
            history_size: DEFAULT_HISTORY_SIZE,
            log_dir: std::env::temp_dir().join("procgov-tasks"),
            event_queue_size: DEFAULT_TASK_EVENT_QUEUE,
            watchdog_interval: WATCHDOG_INTERVAL,
            stats_interval: DEFAULT_STATS_INTERVAL,
        }
    }
}

impl TaskManagerConfig {
    pub fn validate(&self) -> TaskManagerResult<()> {
        let positive = [
            ("max_tasks", self.max_tasks),
            ("max_concurrent", self.max_concurrent),
            ("history_size", self.history_size),
            ("event_queue_size", self.event_queue_size),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(TaskError::InvalidConfig(format!("{} must be positive", field)));
        }

        let intervals = [
            ("default_timeout", self.default_timeout),
            ("check_interval", self.check_interval),
            ("watchdog_interval", self.watchdog_interval),
            ("stats_interval", self.stats_interval),
        ];
        if let Some((field, _)) = intervals.iter().find(|(_, d)| d.is_zero()) {
            return Err(TaskError::InvalidConfig(format!("{} must be positive", field)));
        }
        Ok(())
    }
}
