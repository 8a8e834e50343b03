/*!
 * Task Execution Tests
 * Exit handling, retries, timeouts, cancellation, and pausing
 */

use crate::support::eventually;
use pretty_assertions::assert_eq;
use nix::sys::signal::kill;
use nix::unistd::Pid as NixPid;
use procgov::{
    CommandSpawner, TaskEventType, TaskManager, TaskManagerConfig, TaskOutcome, TaskRequest,
    TaskStatus,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(10);

fn manager(logs: &TempDir) -> TaskManager {
    let config = TaskManagerConfig {
        check_interval: Duration::from_millis(20),
        watchdog_interval: Duration::from_millis(100),
        log_dir: logs.path().to_path_buf(),
        ..Default::default()
    };
    TaskManager::new(config, Arc::new(CommandSpawner::new())).unwrap()
}

fn status(tasks: &TaskManager, id: &str) -> Option<TaskStatus> {
    tasks.task(id).map(|t| t.status)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_successful_command_captures_output() {
    let logs = TempDir::new().unwrap();
    let tasks = manager(&logs);
    tasks.start(&CancellationToken::new());

    let id = tasks
        .create_task(TaskRequest::new("greet", "echo").with_args(["hello", "governor"]))
        .unwrap();

    assert!(eventually(WAIT, || status(&tasks, &id) == Some(TaskStatus::Completed)).await);

    let task = tasks.task(&id).unwrap();
    assert_eq!(task.exit_code, Some(0));
    assert!(task.completed_at.is_some());
    assert!(task.os_pid.is_none());

    let history = tasks.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, TaskOutcome::Completed);
    assert_eq!(history[0].attempt, 1);
    assert!(history[0].output.contains("hello governor"));
    assert!(history[0].error.is_none());

    let output = tasks.task_output(&id).await.unwrap();
    assert_eq!(output.trim(), "hello governor");

    let stats = tasks.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.results_recorded, 1);

    assert!(tasks.stop(Duration::from_secs(2)).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_command_is_retried_then_failed() {
    let logs = TempDir::new().unwrap();
    let tasks = manager(&logs);
    let mut events = tasks.subscribe();
    tasks.start(&CancellationToken::new());

    let id = tasks
        .create_task(
            TaskRequest::new("flaky", "sh")
                .with_args(["-c", "exit 1"])
                .with_max_retries(2),
        )
        .unwrap();

    assert!(eventually(WAIT, || status(&tasks, &id) == Some(TaskStatus::Failed)).await);

    let task = tasks.task(&id).unwrap();
    assert_eq!(task.retry_count, 2);
    assert_eq!(task.exit_code, Some(1));
    assert!(task.last_error.is_some());

    let history = tasks.history();
    let attempts: Vec<u32> = history.iter().map(|r| r.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    assert!(history.iter().all(|r| r.outcome == TaskOutcome::Failed));
    assert!(history.iter().all(|r| r.exit_code == Some(1)));
    assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    let drained = events.drain();
    let count = |kind: TaskEventType| drained.iter().filter(|e| e.event_type == kind).count();
    assert_eq!(count(TaskEventType::Started), 3);
    assert_eq!(count(TaskEventType::Retry), 2);
    assert_eq!(count(TaskEventType::Failed), 1);

    assert!(tasks.stop(Duration::from_secs(2)).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timeout_fails_without_retry() {
    let logs = TempDir::new().unwrap();
    let tasks = manager(&logs);
    let mut events = tasks.subscribe();
    tasks.start(&CancellationToken::new());

    let started = Instant::now();
    let id = tasks
        .create_task(
            TaskRequest::new("slow", "sleep")
                .with_args(["5"])
                .with_timeout(Duration::from_secs(1))
                .with_max_retries(3),
        )
        .unwrap();

    assert!(eventually(WAIT, || status(&tasks, &id) == Some(TaskStatus::Failed)).await);
    assert!(started.elapsed() < Duration::from_secs(4));

    let task = tasks.task(&id).unwrap();
    assert_eq!(task.retry_count, 0);
    assert!(task.last_error.unwrap().contains("timed out"));
    assert_eq!(tasks.running_count(), 0);

    let history = tasks.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, TaskOutcome::TimedOut);

    let timeouts = events.filter(|e| e.event_type == TaskEventType::Timeout);
    assert_eq!(timeouts.len(), 1);

    assert!(tasks.stop(Duration::from_secs(2)).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_running_task() {
    let logs = TempDir::new().unwrap();
    let tasks = manager(&logs);

    let id = tasks
        .create_task(TaskRequest::new("long", "sleep").with_args(["5"]))
        .unwrap();
    tasks.start_task(&id).unwrap();
    assert_eq!(status(&tasks, &id), Some(TaskStatus::Running));
    assert!(tasks.task(&id).unwrap().os_pid.is_some());

    tasks.cancel_task(&id).unwrap();
    assert!(eventually(WAIT, || status(&tasks, &id) == Some(TaskStatus::Cancelled)).await);

    assert_eq!(tasks.running_count(), 0);
    assert!(tasks.pending_queue().is_empty());

    let history = tasks.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, TaskOutcome::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pause_requeues_without_using_a_retry() {
    let logs = TempDir::new().unwrap();
    let tasks = manager(&logs);

    let id = tasks
        .create_task(TaskRequest::new("long", "sleep").with_args(["5"]))
        .unwrap();
    tasks.start_task(&id).unwrap();

    tasks.pause_task(&id).unwrap();
    assert!(eventually(WAIT, || status(&tasks, &id) == Some(TaskStatus::Pending)).await);

    let task = tasks.task(&id).unwrap();
    assert_eq!(task.retry_count, 0);
    assert_eq!(tasks.pending_queue(), vec![id.clone()]);
    assert_eq!(tasks.running_count(), 0);
    assert!(tasks.history().is_empty());

    // Paused tasks can be started again
    tasks.start_task(&id).unwrap();
    assert_eq!(status(&tasks, &id), Some(TaskStatus::Running));
    tasks.cancel_task(&id).unwrap();
    assert!(eventually(WAIT, || status(&tasks, &id) == Some(TaskStatus::Cancelled)).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_cancels_running_tasks() {
    let logs = TempDir::new().unwrap();
    let tasks = manager(&logs);
    tasks.start(&CancellationToken::new());
    assert!(tasks.is_running());

    let id = tasks
        .create_task(TaskRequest::new("long", "sleep").with_args(["30"]))
        .unwrap();
    assert!(eventually(WAIT, || status(&tasks, &id) == Some(TaskStatus::Running)).await);

    assert!(tasks.stop(Duration::from_secs(5)).await);
    assert!(!tasks.is_running());
    assert_eq!(status(&tasks, &id), Some(TaskStatus::Cancelled));
    assert_eq!(tasks.running_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_parent_cancellation_kills_running_process() {
    let logs = TempDir::new().unwrap();
    let tasks = manager(&logs);
    let root = CancellationToken::new();
    tasks.start(&root);

    let id = tasks
        .create_task(TaskRequest::new("long", "sleep").with_args(["30"]))
        .unwrap();
    assert!(eventually(WAIT, || status(&tasks, &id) == Some(TaskStatus::Running)).await);
    let os_pid = tasks.task(&id).unwrap().os_pid.unwrap();

    root.cancel();
    assert!(eventually(WAIT, || status(&tasks, &id) == Some(TaskStatus::Cancelled)).await);
    assert!(!tasks.is_running());
    assert_eq!(tasks.running_count(), 0);

    let alive = kill(NixPid::from_raw(os_pid as i32), None).is_ok();
    assert!(!alive, "process {} still alive", os_pid);

    let last = tasks.history().pop().unwrap();
    assert_eq!(last.outcome, TaskOutcome::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_binary_stays_pending() {
    let logs = TempDir::new().unwrap();
    let tasks = manager(&logs);

    let id = tasks
        .create_task(TaskRequest::new("ghost", "/nonexistent/procgov-binary"))
        .unwrap();

    assert!(tasks.start_task(&id).is_err());
    let task = tasks.task(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.last_error.is_some());
    assert!(tasks.pending_queue().is_empty());
    assert_eq!(tasks.running_count(), 0);
}
