/*!
 * Quota Enforcement Tests
 * Violation detection, severity, and one action per violating process
 */

use crate::support::{FakeInspector, FakeProcess, RecordingController};
use pretty_assertions::assert_eq;
use procgov::{
    CollectorConfig, ProcessSignal, QuotaAction, QuotaConfig, QuotaDefinition, QuotaEventType,
    QuotaLimits, QuotaManager, ResourceCollector, Severity,
};
use procgov::quota::QuotaResource;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Harness {
    inspector: Arc<FakeInspector>,
    controller: Arc<RecordingController>,
    manager: Arc<QuotaManager>,
}

fn harness(processes: &[(u32, FakeProcess)], quotas: Vec<QuotaDefinition>) -> Harness {
    let inspector = Arc::new(FakeInspector::with(processes));
    let collector = Arc::new(ResourceCollector::new(
        CollectorConfig {
            max_cache_size: 0,
            ..Default::default()
        },
        inspector.clone(),
    ));
    let controller = Arc::new(RecordingController::default());
    let config = QuotaConfig {
        quotas,
        check_interval: Duration::from_secs(3600),
        restart_delay: Duration::from_millis(5),
        ..Default::default()
    };
    let manager = Arc::new(QuotaManager::new(config, collector, controller.clone()).unwrap());
    manager.start(&CancellationToken::new());
    Harness {
        inspector,
        controller,
        manager,
    }
}

fn limits(cpu: Option<f64>, memory_mb: Option<f64>) -> QuotaLimits {
    QuotaLimits {
        max_cpu_percent: cpu,
        max_memory_mb: memory_mb,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_cpu_at_one_and_a_half_times_limit_is_critical() {
    let h = harness(
        &[(100, FakeProcess::with_cpu(75.0))],
        vec![QuotaDefinition::new("web", limits(Some(50.0), None)).with_processes([100])],
    );
    let mut events = h.manager.subscribe();

    h.manager.check_now().await;

    let violations = events.filter(|e| e.event_type == QuotaEventType::Violation);
    assert_eq!(violations.len(), 1);
    let violation = &violations[0];
    assert_eq!(violation.pid, Some(100));
    assert_eq!(violation.resource, Some(QuotaResource::Cpu));
    assert_eq!(violation.severity, Some(Severity::Critical));
    assert_eq!(violation.used, Some(75.0));
    assert_eq!(violation.limit, Some(50.0));

    let stats = h.manager.stats();
    assert_eq!(stats.actions_taken.get("warn"), Some(&1));
    assert_eq!(stats.total_violations, 1);
    assert!(h.controller.sent().is_empty());

    h.manager.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_usage_equal_to_limit_is_not_a_violation() {
    let h = harness(
        &[(1, FakeProcess::with_cpu(50.0))],
        vec![QuotaDefinition::new("web", limits(Some(50.0), None)).with_processes([1])],
    );

    h.manager.check_now().await;

    assert_eq!(h.manager.quota("web").unwrap().violations, 0);
    assert!(h.manager.stats().actions_taken.is_empty());
    assert!(h.manager.quota("web").unwrap().last_check.is_some());
    h.manager.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_multiple_violations_take_one_action() {
    // 64 MB resident against a 32 MB limit
    let h = harness(
        &[(5, FakeProcess::with_cpu(90.0))],
        vec![QuotaDefinition::new("batch", limits(Some(60.0), Some(32.0)))
            .with_action(QuotaAction::Stop)
            .with_processes([5])],
    );
    let mut events = h.manager.subscribe();

    h.manager.check_now().await;

    let drained = events.drain();
    let violations = drained
        .iter()
        .filter(|e| e.event_type == QuotaEventType::Violation)
        .count();
    let actions: Vec<_> = drained
        .iter()
        .filter(|e| e.event_type == QuotaEventType::ActionTaken)
        .collect();

    assert_eq!(violations, 2);
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action, Some(QuotaAction::Stop));
    assert_eq!(h.controller.sent(), vec![(5, ProcessSignal::Terminate)]);
    assert_eq!(h.manager.quota("batch").unwrap().violations, 2);
    h.manager.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_runtime_and_thread_limits() {
    let old = FakeProcess::with_cpu(1.0).age(Duration::from_secs(120));
    let h = harness(
        &[(8, old)],
        vec![QuotaDefinition::new(
            "long",
            QuotaLimits {
                max_threads: Some(2),
                max_runtime: Some(Duration::from_secs(60)),
                ..Default::default()
            },
        )
        .with_action(QuotaAction::Notify)
        .with_processes([8])],
    );
    let mut events = h.manager.subscribe();

    h.manager.check_now().await;

    let mut found: Vec<(QuotaResource, Severity)> = events
        .filter(|e| e.event_type == QuotaEventType::Violation)
        .into_iter()
        .filter_map(|e| Some((e.resource?, e.severity?)))
        .collect();
    found.sort_by_key(|(resource, _)| resource.to_string());

    assert_eq!(
        found,
        vec![
            (QuotaResource::Runtime, Severity::High),
            (QuotaResource::Threads, Severity::Medium),
        ]
    );
    assert_eq!(h.manager.stats().actions_taken.get("notify"), Some(&1));
    h.manager.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_restart_terminates_then_waits() {
    let h = harness(
        &[(9, FakeProcess::with_cpu(99.0))],
        vec![QuotaDefinition::new("svc", limits(Some(10.0), None))
            .with_action(QuotaAction::Restart)
            .with_processes([9])],
    );

    h.manager.check_now().await;

    assert_eq!(h.controller.sent(), vec![(9, ProcessSignal::Terminate)]);
    assert_eq!(h.manager.stats().actions_taken.get("restart"), Some(&1));
    h.manager.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_check_loop_runs_on_interval() {
    let inspector = Arc::new(FakeInspector::with(&[(1, FakeProcess::with_cpu(80.0))]));
    let collector = Arc::new(ResourceCollector::new(CollectorConfig::default(), inspector));
    let controller = Arc::new(RecordingController::default());
    let config = QuotaConfig {
        quotas: vec![QuotaDefinition::new("web", limits(Some(50.0), None)).with_processes([1])],
        check_interval: Duration::from_millis(20),
        ..Default::default()
    };
    let manager = Arc::new(QuotaManager::new(config, collector, controller).unwrap());

    let root = CancellationToken::new();
    manager.start(&root);
    assert!(manager.is_running());
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(manager.stats().checks_run >= 2);
    assert!(manager.stop(Duration::from_secs(1)).await);
    assert!(!manager.is_running());

    let checks = manager.stats().checks_run;
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(manager.stats().checks_run, checks);
}
