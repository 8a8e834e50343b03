/*!
 * Command Spawner
 * Launches task commands with tokio::process, logging to per-task files
 */

use super::traits::{ProcessSpawner, SpawnRequest};
use crate::core::errors::{TaskError, TaskManagerResult};
use crate::core::limits::FORBIDDEN_COMMAND_CHARS;
use std::fs::{self, File};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::info;

#[derive(Debug, Default, Clone, Copy)]
pub struct CommandSpawner;

impl CommandSpawner {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessSpawner for CommandSpawner {
    fn spawn(&self, request: &SpawnRequest) -> TaskManagerResult<Child> {
        validate_command(&request.command)
            .map_err(|reason| spawn_failed(request, reason))?;

        if let Some(dir) = request.stdout_path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| spawn_failed(request, format!("log dir {}: {}", dir.display(), e)))?;
        }
        let stdout = File::create(&request.stdout_path)
            .map_err(|e| spawn_failed(request, format!("{}: {}", request.stdout_path.display(), e)))?;
        let stderr = File::create(&request.stderr_path)
            .map_err(|e| spawn_failed(request, format!("{}: {}", request.stderr_path.display(), e)))?;

        let mut cmd = Command::new(&request.command);
        cmd.args(&request.args)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);

        if let Some(dir) = &request.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd
            .spawn()
            .map_err(|e| spawn_failed(request, format!("{}: {}", request.command, e)))?;

        info!(
            task_id = %request.task_id,
            command = %request.command,
            os_pid = child.id(),
            "Spawned task process"
        );
        Ok(child)
    }
}

/// Reject empty commands and shell metacharacters
pub fn validate_command(command: &str) -> Result<(), String> {
    if command.trim().is_empty() {
        return Err("empty command".to_string());
    }
    if let Some(c) = command.chars().find(|c| FORBIDDEN_COMMAND_CHARS.contains(c)) {
        return Err(format!("command contains forbidden character {:?}", c));
    }
    Ok(())
}

fn spawn_failed(request: &SpawnRequest, reason: impl Into<String>) -> TaskError {
    TaskError::SpawnFailed {
        id: request.task_id.clone(),
        reason: reason.into(),
    }
}
