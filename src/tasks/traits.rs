/*!
 * Task Traits
 * Process spawning capability used by the task manager
 */

use crate::core::errors::TaskManagerResult;
use crate::core::types::TaskId;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::process::Child;

/// Everything needed to launch one execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub task_id: TaskId,
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
}

/// Launches external processes
///
/// Must be called from within a tokio runtime. The returned child is
/// expected to be killed when dropped.
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, request: &SpawnRequest) -> TaskManagerResult<Child>;
}
