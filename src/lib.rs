/*!
 * procgov
 * Process governance: resource collection, quota enforcement, and task
 * scheduling for operating-system processes
 */

pub mod config;
pub mod core;
pub mod governor;
pub mod monitoring;
pub mod quota;
pub mod resources;
pub mod tasks;

pub use crate::config::GovernorConfig;
pub use crate::core::errors::*;
pub use crate::core::types::{Pid, Priority, TaskId};
pub use governor::Governor;
pub use monitoring::{init_tracing, EventQueue, OperationSpan, StreamStats, Subscriber};
pub use quota::{
    ProcessController, ProcessSignal, Quota, QuotaAction, QuotaConfig, QuotaDefinition, QuotaEvent,
    QuotaEventType, QuotaLimits, QuotaManager, QuotaStats, Severity, SignalController,
};
pub use resources::{
    CollectorConfig, ProcessInspector, ProcessSnapshot, ResourceCollector, SysinfoInspector,
    SystemSnapshot,
};
pub use tasks::{
    CommandSpawner, ProcessSpawner, SpawnRequest, Task, TaskEvent, TaskEventType, TaskManager,
    TaskManagerConfig, TaskOutcome, TaskRequest, TaskResult, TaskStats, TaskStatus,
};
