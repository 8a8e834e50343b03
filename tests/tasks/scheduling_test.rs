/*!
 * Task Scheduling Tests
 * Dependency deferral, concurrency bound, and queue order
 */

use crate::support::eventually;
use pretty_assertions::assert_eq;
use procgov::{
    CommandSpawner, TaskError, TaskManager, TaskManagerConfig, TaskRequest, TaskStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(10);

fn manager(logs: &TempDir, max_concurrent: usize) -> TaskManager {
    let config = TaskManagerConfig {
        max_concurrent,
        check_interval: Duration::from_millis(20),
        log_dir: logs.path().to_path_buf(),
        ..Default::default()
    };
    TaskManager::new(config, Arc::new(CommandSpawner::new())).unwrap()
}

fn status(tasks: &TaskManager, id: &str) -> Option<TaskStatus> {
    tasks.task(id).map(|t| t.status)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dependent_waits_for_completion() {
    let logs = TempDir::new().unwrap();
    let tasks = manager(&logs, 4);

    tasks
        .create_task(TaskRequest::new("a", "sleep").with_id("a").with_args(["0.3"]))
        .unwrap();
    tasks
        .create_task(TaskRequest::new("b", "true").with_id("b").with_dependency("a"))
        .unwrap();
    tasks.start(&CancellationToken::new());

    assert!(eventually(WAIT, || status(&tasks, "a") == Some(TaskStatus::Running)).await);
    assert_eq!(status(&tasks, "b"), Some(TaskStatus::Pending));
    assert_eq!(tasks.pending_queue(), vec!["b".to_string()]);

    assert!(eventually(WAIT, || status(&tasks, "b") == Some(TaskStatus::Completed)).await);

    let a = tasks.task("a").unwrap();
    let b = tasks.task("b").unwrap();
    assert!(b.started_at.unwrap() >= a.completed_at.unwrap());

    tasks.stop(Duration::from_secs(2)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_dependency_leaves_dependent_pending() {
    let logs = TempDir::new().unwrap();
    let tasks = manager(&logs, 4);

    tasks
        .create_task(TaskRequest::new("a", "false").with_id("a").with_max_retries(0))
        .unwrap();
    tasks
        .create_task(TaskRequest::new("b", "true").with_id("b").with_dependency("a"))
        .unwrap();
    tasks.start(&CancellationToken::new());

    assert!(eventually(WAIT, || status(&tasks, "a") == Some(TaskStatus::Failed)).await);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(status(&tasks, "b"), Some(TaskStatus::Pending));
    assert_eq!(tasks.pending_queue(), vec!["b".to_string()]);
    assert!(matches!(
        tasks.start_task("b"),
        Err(TaskError::Dependency { waiting_on, .. }) if waiting_on == vec!["a".to_string()]
    ));

    tasks.stop(Duration::from_secs(2)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_running_never_exceeds_max_concurrent() {
    let logs = TempDir::new().unwrap();
    let tasks = manager(&logs, 2);

    let ids: Vec<String> = (0..5)
        .map(|i| {
            tasks
                .create_task(TaskRequest::new(format!("job-{}", i), "sleep").with_args(["0.2"]))
                .unwrap()
        })
        .collect();
    tasks.start(&CancellationToken::new());

    let mut peak = 0;
    let all_done = eventually(WAIT, || {
        let running = tasks.running_count();
        let by_status = tasks
            .tasks()
            .iter()
            .filter(|t| t.status == TaskStatus::Running)
            .count();
        assert!(running <= 2, "running {} exceeds limit", running);
        assert!(by_status <= 2, "{} tasks marked running", by_status);
        peak = peak.max(running);
        ids.iter().all(|id| status(&tasks, id) == Some(TaskStatus::Completed))
    })
    .await;

    assert!(all_done);
    assert_eq!(peak, 2);
    assert_eq!(tasks.history().len(), 5);

    tasks.stop(Duration::from_secs(2)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_manual_start_respects_concurrency_limit() {
    let logs = TempDir::new().unwrap();
    let tasks = manager(&logs, 1);

    let first = tasks
        .create_task(TaskRequest::new("one", "sleep").with_args(["5"]))
        .unwrap();
    let second = tasks
        .create_task(TaskRequest::new("two", "sleep").with_args(["5"]))
        .unwrap();

    tasks.start_task(&first).unwrap();
    assert_eq!(
        tasks.start_task(&second),
        Err(TaskError::ConcurrencyLimit { limit: 1 })
    );
    assert!(matches!(
        tasks.start_task(&first),
        Err(TaskError::InvalidState { .. })
    ));
    assert!(matches!(
        tasks.remove_task(&first),
        Err(TaskError::InvalidState { .. })
    ));

    tasks.cancel_task(&first).unwrap();
    assert!(eventually(WAIT, || tasks.running_count() == 0).await);
    tasks.start_task(&second).unwrap();
    tasks.cancel_task(&second).unwrap();
    assert!(eventually(WAIT, || status(&tasks, &second) == Some(TaskStatus::Cancelled)).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stats_loop_refreshes_cached_stats() {
    let logs = TempDir::new().unwrap();
    let config = TaskManagerConfig {
        check_interval: Duration::from_millis(20),
        stats_interval: Duration::from_millis(30),
        log_dir: logs.path().to_path_buf(),
        ..Default::default()
    };
    let tasks = TaskManager::new(config, Arc::new(CommandSpawner::new())).unwrap();

    let id = tasks.create_task(TaskRequest::new("quick", "true")).unwrap();
    tasks.start(&CancellationToken::new());

    assert!(eventually(WAIT, || tasks.cached_stats().completed == 1).await);
    assert_eq!(status(&tasks, &id), Some(TaskStatus::Completed));
    assert_eq!(tasks.cached_stats().total, 1);

    tasks.stop(Duration::from_secs(2)).await;
}
