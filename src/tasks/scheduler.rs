/*!
 * Task Scheduler Loops
 * Scheduling, timeout watchdog, stats aggregation, and per-execution monitors
 *
 * Each execution carries its own deadline and the watchdog enforces the same
 * deadline again on a fixed period.
 */

use super::execution::{read_tail, StopReason, TaskExecution};
use super::manager::{Finished, Inner};
use crate::core::limits::MAX_CAPTURED_OUTPUT;
use crate::monitoring::OperationSpan;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long to wait for a killed process to be reaped
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Start pending tasks every `check_interval`
pub(super) async fn run_scheduler_loop(inner: Arc<Inner>, token: CancellationToken) {
    let mut ticker = interval(inner.config.check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        period_ms = inner.config.check_interval.as_millis() as u64,
        "task scheduler loop started"
    );
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let started = inner.schedule_pending();
                if started > 0 {
                    debug!(started, "scheduler started tasks");
                }
            }
        }
    }
    info!("task scheduler loop stopped");
}

/// Force-stop overdue executions every `watchdog_interval`
pub(super) async fn run_watchdog_loop(inner: Arc<Inner>, token: CancellationToken) {
    let period = inner.config.watchdog_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let mut op = OperationSpan::new("task_watchdog");
                let expired = op.span().in_scope(|| inner.enforce_deadlines());
                op.record_items(expired);
            }
        }
    }
    debug!("task watchdog loop stopped");
}

/// Refresh the cached stats every `stats_interval`
pub(super) async fn run_stats_loop(inner: Arc<Inner>, token: CancellationToken) {
    let period = inner.config.stats_interval;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let stats = inner.refresh_stats();
                debug!(
                    total = stats.total,
                    pending = stats.pending,
                    running = stats.running,
                    completed = stats.completed,
                    failed = stats.failed,
                    cancelled = stats.cancelled,
                    average_duration_ms = stats.average_duration.as_millis() as u64,
                    "task stats"
                );
            }
        }
    }
    debug!("task stats loop stopped");
}

/// Releases the running slot if the monitor ends without committing
struct SlotGuard {
    inner: Arc<Inner>,
    task_id: String,
    armed: bool,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!(task_id = %self.task_id, "execution monitor ended abnormally, releasing slot");
            self.inner.table.write().running.remove(&self.task_id);
        }
    }
}

/// Wait for the execution to exit, be cancelled, or overrun its deadline,
/// then commit the outcome
pub(super) async fn monitor_execution(inner: Arc<Inner>, mut execution: TaskExecution) {
    let mut guard = SlotGuard {
        inner: Arc::clone(&inner),
        task_id: execution.task_id.clone(),
        armed: true,
    };
    let handle = execution.handle.clone();
    let token = handle.token().clone();

    let exited = tokio::select! {
        status = execution.child.wait() => Some(status),
        _ = token.cancelled() => {
            // A parent cancellation claims nothing on its own
            handle.stop(StopReason::Cancelled);
            None
        }
        _ = tokio::time::sleep(handle.timeout()) => {
            handle.stop(StopReason::TimedOut);
            None
        }
    };

    let status = match exited {
        Some(status) => {
            handle.stop(StopReason::Exited);
            status
        }
        None => {
            if let Err(e) = execution.child.start_kill() {
                debug!(task_id = %execution.task_id, error = %e, "kill failed, process may have exited");
            }
            match tokio::time::timeout(KILL_REAP_TIMEOUT, execution.child.wait()).await {
                Ok(status) => status,
                Err(_) => Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "process not reaped after kill",
                )),
            }
        }
    };

    let reason = handle.reason().unwrap_or(StopReason::Cancelled);
    let finished = Finished {
        reason,
        status,
        duration: handle.started().elapsed(),
        output: read_tail(&execution.stdout_path, MAX_CAPTURED_OUTPUT).await,
        stderr: read_tail(&execution.stderr_path, MAX_CAPTURED_OUTPUT).await,
    };

    inner.finish(&execution, finished);
    guard.armed = false;
}
