/*!
 * Task Execution
 * Live binding of a running task to its OS process
 *
 * The stop reason is written once: whichever of exit, cancel, timeout, or
 * pause claims it first decides how the execution is classified.
 */

use crate::core::types::{Pid, TaskId};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const REASON_UNSET: u8 = 0;

/// Why an execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StopReason {
    Exited = 1,
    Cancelled = 2,
    TimedOut = 3,
    Paused = 4,
}

impl StopReason {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(StopReason::Exited),
            2 => Some(StopReason::Cancelled),
            3 => Some(StopReason::TimedOut),
            4 => Some(StopReason::Paused),
            _ => None,
        }
    }
}

/// Shared control half of an execution, held in the running set
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    token: CancellationToken,
    reason: Arc<AtomicU8>,
    started: Instant,
    timeout: Duration,
    os_pid: Option<Pid>,
}

impl ExecutionHandle {
    pub fn new(token: CancellationToken, timeout: Duration, os_pid: Option<Pid>) -> Self {
        Self {
            token,
            reason: Arc::new(AtomicU8::new(REASON_UNSET)),
            started: Instant::now(),
            timeout,
            os_pid,
        }
    }

    /// Claim the stop reason and, for anything but a natural exit, cancel.
    /// Returns false if another reason was claimed first.
    pub fn stop(&self, reason: StopReason) -> bool {
        let claimed = self
            .reason
            .compare_exchange(REASON_UNSET, reason as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if claimed && reason != StopReason::Exited {
            self.token.cancel();
        }
        claimed
    }

    pub fn reason(&self) -> Option<StopReason> {
        StopReason::from_u8(self.reason.load(Ordering::Acquire))
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn os_pid(&self) -> Option<Pid> {
        self.os_pid
    }

    pub fn deadline_passed(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) >= self.timeout
    }
}

/// Owned half of an execution, held by its monitor.
/// Dropping it kills the process if it is still alive.
pub struct TaskExecution {
    pub task_id: TaskId,
    pub attempt: u32,
    pub child: Child,
    pub handle: ExecutionHandle,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
}

impl Drop for TaskExecution {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            debug!(task_id = %self.task_id, "killing task process on release");
            let _ = self.child.start_kill();
        }
    }
}

/// Per-task log file paths under `log_dir`
pub fn log_paths(log_dir: &Path, task_id: &str) -> (PathBuf, PathBuf) {
    (
        log_dir.join(format!("{}.out.log", task_id)),
        log_dir.join(format!("{}.err.log", task_id)),
    )
}

/// Last `limit` bytes of a log file as text; empty if unreadable
pub async fn read_tail(path: &Path, limit: usize) -> String {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let start = bytes.len().saturating_sub(limit);
            String::from_utf8_lossy(&bytes[start..]).into_owned()
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "task log unreadable");
            String::new()
        }
    }
}
