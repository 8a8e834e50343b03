/*!
 * Task Manager
 * Task table, pending queue, and execution bookkeeping
 *
 * All task state lives behind one write lock. Spawning happens outside the
 * lock: a slot is reserved first (the task goes into `starting`), the process
 * is spawned, and the result is committed under the lock again.
 */

use super::execution::{log_paths, read_tail, ExecutionHandle, StopReason, TaskExecution};
use super::scheduler::{monitor_execution, run_scheduler_loop, run_stats_loop, run_watchdog_loop};
use super::spawner::validate_command;
use super::traits::{ProcessSpawner, SpawnRequest};
use super::types::{
    Task, TaskEvent, TaskEventType, TaskManagerConfig, TaskOutcome, TaskRequest, TaskResult,
    TaskStats, TaskStatus,
};
use crate::core::errors::{TaskError, TaskManagerResult};
use crate::core::limits::DEFAULT_TASK_PRIORITY;
use crate::core::shutdown::ShutdownGroup;
use crate::core::types::TaskId;
use crate::monitoring::{EventQueue, Subscriber};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Default)]
pub(super) struct TaskTable {
    pub(super) tasks: HashMap<TaskId, Task>,
    pub(super) pending: VecDeque<TaskId>,
    pub(super) running: HashMap<TaskId, ExecutionHandle>,
    /// Slots reserved for spawns in flight
    starting: HashSet<TaskId>,
}

impl TaskTable {
    fn slots_in_use(&self) -> usize {
        self.running.len() + self.starting.len()
    }

    fn unmet_dependencies(&self, task: &Task) -> Vec<TaskId> {
        task.dependencies
            .iter()
            .filter(|dep| {
                self.tasks
                    .get(*dep)
                    .map_or(true, |t| t.status != TaskStatus::Completed)
            })
            .cloned()
            .collect()
    }
}

/// A reserved slot waiting for its spawn
pub(super) struct Launch {
    request: SpawnRequest,
    attempt: u32,
    timeout: Duration,
}

/// Final state observed by an execution monitor
pub(super) struct Finished {
    pub(super) reason: StopReason,
    pub(super) status: std::io::Result<ExitStatus>,
    pub(super) duration: Duration,
    pub(super) output: String,
    pub(super) stderr: String,
}

pub(super) struct Inner {
    pub(super) config: TaskManagerConfig,
    spawner: Arc<dyn ProcessSpawner>,
    pub(super) table: RwLock<TaskTable>,
    history: Mutex<VecDeque<TaskResult>>,
    events: EventQueue<TaskEvent>,
    cached_stats: RwLock<TaskStats>,
    pub(super) background: ShutdownGroup,
}

/// Bounded-concurrency task scheduler. Cheap to clone.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

impl TaskManager {
    pub fn new(config: TaskManagerConfig, spawner: Arc<dyn ProcessSpawner>) -> TaskManagerResult<Self> {
        config.validate()?;

        info!(
            max_tasks = config.max_tasks,
            max_concurrent = config.max_concurrent,
            check_interval_ms = config.check_interval.as_millis() as u64,
            log_dir = %config.log_dir.display(),
            "Task manager initialized"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                events: EventQueue::new("task_events", config.event_queue_size),
                history: Mutex::new(VecDeque::with_capacity(config.history_size.min(1024))),
                config,
                spawner,
                table: RwLock::new(TaskTable::default()),
                cached_stats: RwLock::new(TaskStats::default()),
                background: ShutdownGroup::new("tasks"),
            }),
        })
    }

    pub fn config(&self) -> &TaskManagerConfig {
        &self.inner.config
    }

    /// Validate and register a task at the tail of the pending queue
    pub fn create_task(&self, request: TaskRequest) -> TaskManagerResult<TaskId> {
        if request.name.trim().is_empty() {
            return Err(TaskError::Validation("task name is required".into()));
        }
        if request.command.trim().is_empty() {
            return Err(TaskError::Validation("task command is required".into()));
        }
        validate_command(&request.command).map_err(TaskError::Validation)?;

        let id = request.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        if id.trim().is_empty() {
            return Err(TaskError::Validation("task id must not be empty".into()));
        }

        let config = &self.inner.config;
        {
            let mut guard = self.inner.table.write();
            let table = &mut *guard;

            if table.tasks.contains_key(&id) {
                return Err(TaskError::DuplicateId(id));
            }
            if table.tasks.len() >= config.max_tasks {
                return Err(TaskError::LimitReached {
                    limit: config.max_tasks,
                });
            }
            for dep in &request.dependencies {
                if dep == &id {
                    return Err(TaskError::Validation(format!("task '{}' depends on itself", id)));
                }
                if !table.tasks.contains_key(dep) {
                    return Err(TaskError::Validation(format!("unknown dependency '{}'", dep)));
                }
            }

            let task = Task {
                id: id.clone(),
                name: request.name,
                command: request.command,
                args: request.args,
                env: request.env,
                working_dir: request.working_dir,
                priority: request.priority.unwrap_or(DEFAULT_TASK_PRIORITY),
                timeout: request.timeout.unwrap_or(config.default_timeout),
                max_retries: request.max_retries.unwrap_or(config.retry_attempts),
                retry_count: 0,
                dependencies: request.dependencies,
                status: TaskStatus::Pending,
                created_at: SystemTime::now(),
                started_at: None,
                completed_at: None,
                exit_code: None,
                log_path: None,
                last_error: None,
                os_pid: None,
            };

            info!(task_id = %id, name = %task.name, command = %task.command, "task created");
            table.tasks.insert(id.clone(), task);
            table.pending.push_back(id.clone());
        }

        self.inner.emit(TaskEvent::new(TaskEventType::Created, &id, "task created"));
        Ok(id)
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.inner.table.read().tasks.get(id).cloned()
    }

    /// All tasks, oldest first
    pub fn tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.inner.table.read().tasks.values().cloned().collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// IDs waiting in the pending queue, in scheduling order
    pub fn pending_queue(&self) -> Vec<TaskId> {
        self.inner.table.read().pending.iter().cloned().collect()
    }

    pub fn running_count(&self) -> usize {
        self.inner.table.read().running.len()
    }

    /// Start a pending task now instead of waiting for the scheduler.
    /// Must be called within a tokio runtime.
    pub fn start_task(&self, id: &str) -> TaskManagerResult<()> {
        let launch = {
            let mut guard = self.inner.table.write();
            let table = &mut *guard;
            let task = table
                .tasks
                .get(id)
                .ok_or_else(|| TaskError::NotFound(id.to_string()))?;

            if task.status != TaskStatus::Pending || table.starting.contains(id) {
                return Err(TaskError::InvalidState {
                    id: id.to_string(),
                    status: task.status.to_string(),
                    operation: "start".into(),
                });
            }
            let waiting_on = table.unmet_dependencies(task);
            if !waiting_on.is_empty() {
                return Err(TaskError::Dependency {
                    id: id.to_string(),
                    waiting_on,
                });
            }
            if table.slots_in_use() >= self.inner.config.max_concurrent {
                return Err(TaskError::ConcurrencyLimit {
                    limit: self.inner.config.max_concurrent,
                });
            }
            self.inner.reserve(table, id)
        };

        match launch {
            Some(launch) => self.inner.launch(launch),
            None => Err(TaskError::NotFound(id.to_string())),
        }
    }

    /// Cancel a pending or running task. Cancelled tasks are never retried.
    pub fn cancel_task(&self, id: &str) -> TaskManagerResult<()> {
        let mut guard = self.inner.table.write();
        let table = &mut *guard;
        let task = table
            .tasks
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;

        match task.status {
            TaskStatus::Pending => {
                task.transition(TaskStatus::Cancelled, "cancel")?;
                task.completed_at = Some(SystemTime::now());
                table.pending.retain(|queued| queued != id);
                drop(guard);

                info!(task_id = %id, "pending task cancelled");
                self.inner
                    .emit(TaskEvent::new(TaskEventType::Cancelled, id, "cancelled before start"));
                Ok(())
            }
            TaskStatus::Running => {
                let stopping = table
                    .running
                    .get(id)
                    .is_some_and(|handle| handle.stop(StopReason::Cancelled));
                if stopping {
                    info!(task_id = %id, "cancelling running task");
                    Ok(())
                } else {
                    Err(TaskError::InvalidState {
                        id: id.to_string(),
                        status: "stopping".into(),
                        operation: "cancel".into(),
                    })
                }
            }
            status => Err(TaskError::InvalidState {
                id: id.to_string(),
                status: status.to_string(),
                operation: "cancel".into(),
            }),
        }
    }

    /// Stop a running task and put it back in the queue without using a retry
    pub fn pause_task(&self, id: &str) -> TaskManagerResult<()> {
        let table = self.inner.table.read();
        let task = table
            .tasks
            .get(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;

        let pausing = task.status == TaskStatus::Running
            && table
                .running
                .get(id)
                .is_some_and(|handle| handle.stop(StopReason::Paused));
        if !pausing {
            return Err(TaskError::InvalidState {
                id: id.to_string(),
                status: task.status.to_string(),
                operation: "pause".into(),
            });
        }
        info!(task_id = %id, "pausing task");
        Ok(())
    }

    /// Forget a task that is not running
    pub fn remove_task(&self, id: &str) -> TaskManagerResult<Task> {
        let mut guard = self.inner.table.write();
        let table = &mut *guard;
        let status = table
            .tasks
            .get(id)
            .map(|t| t.status)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;

        if status == TaskStatus::Running || table.starting.contains(id) {
            return Err(TaskError::InvalidState {
                id: id.to_string(),
                status: status.to_string(),
                operation: "remove".into(),
            });
        }
        table.pending.retain(|queued| queued != id);
        let task = table
            .tasks
            .remove(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        info!(task_id = %id, "task removed");
        Ok(task)
    }

    /// Remove every completed, failed, or cancelled task; returns how many
    pub fn remove_finished(&self) -> usize {
        let mut table = self.inner.table.write();
        let before = table.tasks.len();
        table.tasks.retain(|_, task| !task.status.is_terminal());
        let removed = before - table.tasks.len();
        if removed > 0 {
            info!(removed, "finished tasks removed");
        }
        removed
    }

    /// Execution results, oldest first
    pub fn history(&self) -> Vec<TaskResult> {
        self.inner.history.lock().iter().cloned().collect()
    }

    /// Full stdout log of the task's latest execution
    pub async fn task_output(&self, id: &str) -> TaskManagerResult<String> {
        let log_path = self
            .task(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?
            .log_path;
        Ok(match log_path {
            Some(path) => read_tail(&path, usize::MAX).await,
            None => String::new(),
        })
    }

    pub fn stats(&self) -> TaskStats {
        self.inner.compute_stats()
    }

    /// Stats as of the last stats-loop tick
    pub fn cached_stats(&self) -> TaskStats {
        self.inner.cached_stats.read().clone()
    }

    pub fn subscribe(&self) -> Subscriber<TaskEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.inner.background.is_running()
    }

    /// Start the scheduler, watchdog, and stats loops under a child of `parent`
    pub fn start(&self, parent: &CancellationToken) {
        let Some(token) = self.inner.background.begin(parent) else {
            warn!("task manager already running");
            return;
        };

        let background = &self.inner.background;
        background.spawn(
            "task_scheduler",
            run_scheduler_loop(Arc::clone(&self.inner), token.clone()),
        );
        background.spawn(
            "task_watchdog",
            run_watchdog_loop(Arc::clone(&self.inner), token.clone()),
        );
        background.spawn("task_stats", run_stats_loop(Arc::clone(&self.inner), token));
        info!("Task manager started");
    }

    /// Cancel running executions, stop the loops, and wait up to `grace`.
    /// Spawned processes are killed but may not have exited when this returns.
    pub async fn stop(&self, grace: Duration) -> bool {
        // Executions launched under the group token are cancelled with it; the
        // sweep reaches those started manually before the first `start`.
        self.inner.background.cancel();
        let cancelled = {
            let table = self.inner.table.read();
            table
                .running
                .values()
                .filter(|handle| handle.stop(StopReason::Cancelled))
                .count()
        };
        if cancelled > 0 {
            info!(cancelled, "cancelling running tasks for shutdown");
        }

        let clean = self.inner.background.shutdown(grace).await;
        info!(clean, "Task manager stopped");
        clean
    }
}

impl Inner {
    pub(super) fn emit(&self, event: TaskEvent) {
        self.events.publish(event);
    }

    /// Move a pending task into `starting` and build its spawn request
    fn reserve(&self, table: &mut TaskTable, id: &str) -> Option<Launch> {
        let task = table.tasks.get(id)?;
        let (stdout_path, stderr_path) = log_paths(&self.config.log_dir, id);
        let launch = Launch {
            request: SpawnRequest {
                task_id: task.id.clone(),
                command: task.command.clone(),
                args: task.args.clone(),
                env: task.env.clone(),
                working_dir: task.working_dir.clone(),
                stdout_path,
                stderr_path,
            },
            attempt: task.retry_count + 1,
            timeout: task.timeout,
        };
        table.pending.retain(|queued| queued != id);
        table.starting.insert(id.to_string());
        Some(launch)
    }

    /// Start every runnable pending task that fits, in queue order.
    /// Tasks with unmet dependencies stay queued.
    pub(super) fn schedule_pending(self: &Arc<Self>) -> usize {
        let launches: Vec<Launch> = {
            let mut guard = self.table.write();
            let table = &mut *guard;
            let mut launches = Vec::new();
            let mut index = 0;

            while table.slots_in_use() < self.config.max_concurrent && index < table.pending.len() {
                let id = table.pending[index].clone();
                let runnable = match table.tasks.get(&id) {
                    Some(task) if task.status == TaskStatus::Pending => {
                        table.unmet_dependencies(task).is_empty()
                    }
                    _ => {
                        table.pending.remove(index);
                        continue;
                    }
                };
                if !runnable {
                    index += 1;
                    continue;
                }
                if let Some(launch) = self.reserve(table, &id) {
                    launches.push(launch);
                }
            }
            launches
        };

        let mut started = 0;
        for launch in launches {
            if self.launch(launch).is_ok() {
                started += 1;
            }
        }
        started
    }

    /// Spawn a reserved task and hand it to a monitor
    pub(super) fn launch(self: &Arc<Self>, launch: Launch) -> TaskManagerResult<()> {
        let Launch {
            request,
            attempt,
            timeout,
        } = launch;
        let id = request.task_id.clone();

        let token = match self.background.token() {
            Some(run) if run.is_cancelled() => {
                let mut table = self.table.write();
                table.starting.remove(&id);
                if !table.pending.contains(&id) {
                    table.pending.push_front(id.clone());
                }
                debug!(task_id = %id, "task manager stopped, launch refused");
                return Err(TaskError::Stopped);
            }
            Some(run) => run.child_token(),
            None => CancellationToken::new(),
        };
        let spawned = self.spawner.spawn(&request);

        let mut guard = self.table.write();
        let table = &mut *guard;
        table.starting.remove(&id);

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                if let Some(task) = table.tasks.get_mut(&id) {
                    task.last_error = Some(e.to_string());
                }
                error!(task_id = %id, error = %e, "task spawn failed, task left pending");
                return Err(e);
            }
        };

        let Some(task) = table.tasks.get_mut(&id).filter(|t| t.status == TaskStatus::Pending) else {
            drop(guard);
            warn!(task_id = %id, "task changed while spawning, killing new process");
            let _ = child.start_kill();
            return Err(TaskError::InvalidState {
                id,
                status: "changed".into(),
                operation: "start".into(),
            });
        };

        task.transition(TaskStatus::Running, "start")?;
        let os_pid = child.id();
        task.started_at = Some(SystemTime::now());
        task.completed_at = None;
        task.exit_code = None;
        task.os_pid = os_pid;
        task.log_path = Some(request.stdout_path.clone());

        let handle = ExecutionHandle::new(token, timeout, os_pid);
        table.running.insert(id.clone(), handle.clone());
        drop(guard);

        info!(task_id = %id, attempt, os_pid, "task started");
        self.emit(TaskEvent::new(
            TaskEventType::Started,
            &id,
            format!("attempt {} started", attempt),
        ));

        let execution = TaskExecution {
            task_id: id,
            attempt,
            child,
            handle,
            stdout_path: request.stdout_path,
            stderr_path: request.stderr_path,
        };
        self.background
            .spawn("task_monitor", monitor_execution(Arc::clone(self), execution));
        Ok(())
    }

    /// Commit the outcome of an execution: release the slot, move the task
    /// on, and record a result unless the task was paused.
    pub(super) fn finish(&self, execution: &TaskExecution, finished: Finished) {
        let id = &execution.task_id;
        let exit_code = finished.status.as_ref().ok().and_then(|s| s.code());
        let success = finished.status.as_ref().is_ok_and(|s| s.success());
        let now = SystemTime::now();

        let mut guard = self.table.write();
        let table = &mut *guard;
        table.running.remove(id);

        let Some(task) = table.tasks.get_mut(id) else {
            warn!(task_id = %id, "finished execution for unknown task");
            return;
        };
        task.os_pid = None;
        task.exit_code = exit_code;

        let failure_text = || {
            let stderr = finished.stderr.trim();
            if !stderr.is_empty() {
                stderr.to_string()
            } else {
                match &finished.status {
                    Ok(status) => format!("process exited with {}", status),
                    Err(e) => format!("wait failed: {}", e),
                }
            }
        };

        let (event_type, message, outcome, error) = match finished.reason {
            StopReason::Paused => {
                advance(task, TaskStatus::Paused);
                advance(task, TaskStatus::Pending);
                table.pending.push_back(id.clone());
                (TaskEventType::Paused, "paused and re-queued".to_string(), None, None)
            }
            StopReason::Cancelled => {
                advance(task, TaskStatus::Cancelled);
                task.completed_at = Some(now);
                (
                    TaskEventType::Cancelled,
                    "cancelled while running".to_string(),
                    Some(TaskOutcome::Cancelled),
                    Some("cancelled".to_string()),
                )
            }
            StopReason::TimedOut => {
                let text = format!("timed out after {:?}", execution.handle.timeout());
                advance(task, TaskStatus::Failed);
                task.completed_at = Some(now);
                task.last_error = Some(text.clone());
                (TaskEventType::Timeout, text.clone(), Some(TaskOutcome::TimedOut), Some(text))
            }
            StopReason::Exited if success => {
                advance(task, TaskStatus::Completed);
                task.completed_at = Some(now);
                (
                    TaskEventType::Completed,
                    "completed successfully".to_string(),
                    Some(TaskOutcome::Completed),
                    None,
                )
            }
            StopReason::Exited => {
                let text = failure_text();
                task.last_error = Some(text.clone());
                if task.retry_count < task.max_retries {
                    task.retry_count += 1;
                    advance(task, TaskStatus::Retry);
                    advance(task, TaskStatus::Pending);
                    table.pending.push_back(id.clone());
                    (
                        TaskEventType::Retry,
                        format!("retry {} of {}", task.retry_count, task.max_retries),
                        Some(TaskOutcome::Failed),
                        Some(text),
                    )
                } else {
                    advance(task, TaskStatus::Failed);
                    task.completed_at = Some(now);
                    (
                        TaskEventType::Failed,
                        format!("failed after {} attempts", execution.attempt),
                        Some(TaskOutcome::Failed),
                        Some(text),
                    )
                }
            }
        };
        drop(guard);

        info!(
            task_id = %id,
            attempt = execution.attempt,
            exit_code,
            event = ?event_type,
            duration_ms = finished.duration.as_millis() as u64,
            "task execution ended"
        );

        if let Some(outcome) = outcome {
            self.record_result(TaskResult {
                task_id: id.clone(),
                outcome,
                attempt: execution.attempt,
                exit_code,
                duration: finished.duration,
                output: finished.output,
                error,
                timestamp: now,
            });
        }
        self.emit(TaskEvent::new(event_type, id, message));
    }

    fn record_result(&self, result: TaskResult) {
        let mut history = self.history.lock();
        history.push_back(result);
        while history.len() > self.config.history_size {
            history.pop_front();
        }
    }

    /// Fire the watchdog: stop running tasks whose deadline has passed
    pub(super) fn enforce_deadlines(&self) -> usize {
        let now = Instant::now();
        let table = self.table.read();
        let mut expired = 0;
        for (id, handle) in &table.running {
            if handle.deadline_passed(now) && handle.stop(StopReason::TimedOut) {
                warn!(
                    task_id = %id,
                    os_pid = handle.os_pid(),
                    timeout_ms = handle.timeout().as_millis() as u64,
                    "watchdog cancelled overdue task"
                );
                expired += 1;
            }
        }
        expired
    }

    pub(super) fn compute_stats(&self) -> TaskStats {
        let table = self.table.read();
        let mut stats = TaskStats {
            total: table.tasks.len(),
            queued: table.pending.len(),
            ..Default::default()
        };

        let mut completed_time = Duration::ZERO;
        for task in table.tasks.values() {
            match task.status {
                TaskStatus::Pending | TaskStatus::Retry | TaskStatus::Paused => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => {
                    stats.completed += 1;
                    if let (Some(start), Some(end)) = (task.started_at, task.completed_at) {
                        completed_time += end.duration_since(start).unwrap_or_default();
                    }
                }
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        drop(table);

        if stats.completed > 0 {
            stats.average_duration = completed_time / stats.completed as u32;
        }
        stats.results_recorded = self.history.lock().len();
        stats.events_dropped = self.events.dropped();
        stats
    }

    pub(super) fn refresh_stats(&self) -> TaskStats {
        let stats = self.compute_stats();
        *self.cached_stats.write() = stats.clone();
        stats
    }
}

/// Apply a transition the monitor knows to be valid
fn advance(task: &mut Task, next: TaskStatus) {
    if let Err(e) = task.transition(next, "finish") {
        warn!(task_id = %task.id, error = %e, "unexpected task transition");
        task.status = next;
    }
}
