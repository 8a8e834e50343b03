/*!
 * Quota Types
 * Definitions, runtime state, events, and statistics
 */

use crate::core::errors::{QuotaError, QuotaResult};
use crate::core::limits::{DEFAULT_QUOTA_CHECK_INTERVAL, DEFAULT_QUOTA_EVENT_QUEUE, RESTART_DELAY};
use crate::core::serde::{
    duration_millis, is_empty_vec, is_none, optional_duration_millis, optional_system_time_micros,
    system_time_micros,
};
use crate::core::types::Pid;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::time::{Duration, SystemTime};

/// Enforcement applied once per violating process per check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaAction {
    #[default]
    Warn,
    /// Cooperative stop signal
    Throttle,
    Stop,
    /// Terminate, wait, and leave the relaunch to the process owner
    Restart,
    Notify,
}

impl fmt::Display for QuotaAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QuotaAction::Warn => "warn",
            QuotaAction::Throttle => "throttle",
            QuotaAction::Stop => "stop",
            QuotaAction::Restart => "restart",
            QuotaAction::Notify => "notify",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        })
    }
}

/// Limited dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaResource {
    Cpu,
    Memory,
    Threads,
    Runtime,
}

impl fmt::Display for QuotaResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QuotaResource::Cpu => "cpu",
            QuotaResource::Memory => "memory",
            QuotaResource::Threads => "threads",
            QuotaResource::Runtime => "runtime",
        })
    }
}

/// Resource limits; unset limits are not checked
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaLimits {
    #[serde(skip_serializing_if = "is_none")]
    pub max_cpu_percent: Option<f64>,
    #[serde(skip_serializing_if = "is_none")]
    pub max_memory_mb: Option<f64>,
    #[serde(skip_serializing_if = "is_none")]
    pub max_threads: Option<u32>,
    /// Wall-clock lifetime of the process
    #[serde(with = "optional_duration_millis", skip_serializing_if = "is_none")]
    pub max_runtime: Option<Duration>,
}

impl QuotaLimits {
    pub fn is_empty(&self) -> bool {
        self.max_cpu_percent.is_none()
            && self.max_memory_mb.is_none()
            && self.max_threads.is_none()
            && self.max_runtime.is_none()
    }

    fn validate(&self, quota: &str) -> QuotaResult<()> {
        let positive = |value: Option<f64>, field: &str| match value {
            Some(v) if v.is_nan() || v <= 0.0 => Err(QuotaError::InvalidConfig(format!(
                "quota '{}': {} must be positive",
                quota, field
            ))),
            _ => Ok(()),
        };
        positive(self.max_cpu_percent, "max_cpu_percent")?;
        positive(self.max_memory_mb, "max_memory_mb")?;
        if self.max_threads == Some(0) {
            return Err(QuotaError::InvalidConfig(format!(
                "quota '{}': max_threads must be positive",
                quota
            )));
        }
        if self.max_runtime.is_some_and(|d| d.is_zero()) {
            return Err(QuotaError::InvalidConfig(format!(
                "quota '{}': max_runtime must be positive",
                quota
            )));
        }
        Ok(())
    }
}

/// Quota as written in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaDefinition {
    pub name: String,
    #[serde(default)]
    pub limits: QuotaLimits,
    /// Falls back to the manager default when unset
    #[serde(default, skip_serializing_if = "is_none")]
    pub action: Option<QuotaAction>,
    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub processes: Vec<Pid>,
}

impl QuotaDefinition {
    pub fn new(name: impl Into<String>, limits: QuotaLimits) -> Self {
        Self {
            name: name.into(),
            limits,
            action: None,
            processes: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: QuotaAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_processes(mut self, pids: impl IntoIterator<Item = Pid>) -> Self {
        self.processes.extend(pids);
        self
    }
}

/// Quota manager configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub quotas: Vec<QuotaDefinition>,
    #[serde(with = "duration_millis")]
    pub check_interval: Duration,
    pub default_action: QuotaAction,
    #[serde(with = "duration_millis")]
    pub restart_delay: Duration,
    pub event_queue_size: usize,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            quotas: Vec::new(),
            check_interval: DEFAULT_QUOTA_CHECK_INTERVAL,
            default_action: QuotaAction::Warn,
            restart_delay: RESTART_DELAY,
            event_queue_size: DEFAULT_QUOTA_EVENT_QUEUE,
        }
    }
}

impl QuotaConfig {
    pub fn validate(&self) -> QuotaResult<()> {
        if self.check_interval.is_zero() {
            return Err(QuotaError::InvalidConfig("check_interval must be positive".into()));
        }
        if self.event_queue_size == 0 {
            return Err(QuotaError::InvalidConfig("event_queue_size must be positive".into()));
        }

        let mut names = HashSet::new();
        for quota in &self.quotas {
            if quota.name.trim().is_empty() {
                return Err(QuotaError::InvalidConfig("quota name must not be empty".into()));
            }
            if !names.insert(quota.name.as_str()) {
                return Err(QuotaError::InvalidConfig(format!(
                    "duplicate quota name '{}'",
                    quota.name
                )));
            }
            quota.limits.validate(&quota.name)?;
        }
        Ok(())
    }
}

/// Runtime state of one quota
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quota {
    pub name: String,
    pub limits: QuotaLimits,
    pub action: Option<QuotaAction>,
    pub processes: BTreeSet<Pid>,
    pub active: bool,
    pub violations: u64,
    #[serde(
        with = "optional_system_time_micros",
        skip_serializing_if = "is_none",
        default
    )]
    pub last_check: Option<SystemTime>,
}

impl Quota {
    pub(crate) fn from_definition(definition: QuotaDefinition) -> Self {
        Self {
            name: definition.name,
            limits: definition.limits,
            action: definition.action,
            processes: definition.processes.into_iter().collect(),
            active: false,
            violations: 0,
            last_check: None,
        }
    }
}

/// A single limit exceeded by one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub resource: QuotaResource,
    pub used: f64,
    pub limit: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaEventType {
    Violation,
    ActionTaken,
    QuotaActivated,
    QuotaDeactivated,
    ProcessAdded,
    ProcessRemoved,
}

/// Timestamped quota event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaEvent {
    pub event_type: QuotaEventType,
    pub quota: String,
    #[serde(skip_serializing_if = "is_none", default)]
    pub pid: Option<Pid>,
    #[serde(skip_serializing_if = "is_none", default)]
    pub resource: Option<QuotaResource>,
    #[serde(skip_serializing_if = "is_none", default)]
    pub used: Option<f64>,
    #[serde(skip_serializing_if = "is_none", default)]
    pub limit: Option<f64>,
    #[serde(skip_serializing_if = "is_none", default)]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "is_none", default)]
    pub action: Option<QuotaAction>,
    #[serde(with = "system_time_micros")]
    pub timestamp: SystemTime,
    pub message: String,
}

impl QuotaEvent {
    pub(crate) fn lifecycle(
        event_type: QuotaEventType,
        quota: &str,
        pid: Option<Pid>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            quota: quota.to_string(),
            pid,
            resource: None,
            used: None,
            limit: None,
            severity: None,
            action: None,
            timestamp: SystemTime::now(),
            message: message.into(),
        }
    }

    pub(crate) fn violation(quota: &str, pid: Pid, violation: &Violation) -> Self {
        Self {
            event_type: QuotaEventType::Violation,
            quota: quota.to_string(),
            pid: Some(pid),
            resource: Some(violation.resource),
            used: Some(violation.used),
            limit: Some(violation.limit),
            severity: Some(violation.severity),
            action: None,
            timestamp: SystemTime::now(),
            message: format!(
                "{} usage {:.2} exceeds limit {:.2} ({})",
                violation.resource, violation.used, violation.limit, violation.severity
            ),
        }
    }

    pub(crate) fn action_taken(quota: &str, pid: Pid, action: QuotaAction, message: impl Into<String>) -> Self {
        Self {
            action: Some(action),
            ..Self::lifecycle(QuotaEventType::ActionTaken, quota, Some(pid), message)
        }
    }
}

/// Quota manager statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuotaStats {
    pub quotas: usize,
    pub active_quotas: usize,
    pub tracked_processes: usize,
    pub total_violations: u64,
    pub violations_by_quota: BTreeMap<String, u64>,
    pub actions_taken: BTreeMap<String, u64>,
    pub checks_run: u64,
    pub events_dropped: u64,
    #[serde(
        with = "optional_system_time_micros",
        skip_serializing_if = "is_none",
        default
    )]
    pub last_check: Option<SystemTime>,
}
