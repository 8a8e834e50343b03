/*!
 * Tasks
 * External command scheduling with retries, timeouts, and dependencies
 */

mod execution;
mod manager;
mod scheduler;
mod spawner;
pub mod traits;
pub mod types;

pub use manager::TaskManager;
pub use spawner::{validate_command, CommandSpawner};
pub use traits::{ProcessSpawner, SpawnRequest};
pub use types::{
    Task, TaskEvent, TaskEventType, TaskManagerConfig, TaskOutcome, TaskRequest, TaskResult,
    TaskStats, TaskStatus,
};
