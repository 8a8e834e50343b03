/*!
 * Quota Tracking Tests
 * Process membership, vanished processes, and activation
 */

use crate::support::{FakeInspector, FakeProcess, RecordingController};
use pretty_assertions::assert_eq;
use procgov::{
    CollectorConfig, QuotaConfig, QuotaDefinition, QuotaLimits, QuotaManager,
    ResourceCollector,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn manager(inspector: Arc<FakeInspector>, quotas: Vec<QuotaDefinition>) -> Arc<QuotaManager> {
    let collector = Arc::new(ResourceCollector::new(
        CollectorConfig {
            max_cache_size: 0,
            ..Default::default()
        },
        inspector,
    ));
    let config = QuotaConfig {
        quotas,
        check_interval: Duration::from_secs(3600),
        ..Default::default()
    };
    Arc::new(
        QuotaManager::new(config, collector, Arc::new(RecordingController::default())).unwrap(),
    )
}

fn cpu_quota(name: &str, limit: f64) -> QuotaDefinition {
    QuotaDefinition::new(
        name,
        QuotaLimits {
            max_cpu_percent: Some(limit),
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn test_vanished_process_is_dropped_silently() {
    let inspector = Arc::new(FakeInspector::with(&[
        (1, FakeProcess::with_cpu(10.0)),
        (2, FakeProcess::with_cpu(10.0)),
    ]));
    let manager = manager(inspector.clone(), vec![cpu_quota("web", 50.0).with_processes([1, 2])]);
    manager.start(&CancellationToken::new());
    let mut events = manager.subscribe();

    inspector.kill(2);
    manager.check_now().await;

    let quota = manager.quota("web").unwrap();
    assert_eq!(quota.processes.iter().copied().collect::<Vec<_>>(), vec![1]);
    assert_eq!(quota.violations, 0);

    assert!(events.drain().is_empty());

    manager.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_process_in_several_quotas_is_checked_by_each() {
    let inspector = Arc::new(FakeInspector::with(&[(4, FakeProcess::with_cpu(70.0))]));
    let manager = manager(
        inspector,
        vec![
            cpu_quota("strict", 20.0).with_processes([4]),
            cpu_quota("loose", 90.0).with_processes([4]),
        ],
    );
    manager.start(&CancellationToken::new());

    manager.check_now().await;

    assert_eq!(manager.quota("strict").unwrap().violations, 1);
    assert_eq!(manager.quota("loose").unwrap().violations, 0);

    let stats = manager.stats();
    assert_eq!(stats.quotas, 2);
    assert_eq!(stats.active_quotas, 2);
    assert_eq!(stats.violations_by_quota.get("strict"), Some(&1));
    manager.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_added_process_is_checked_next_cycle() {
    let inspector = Arc::new(FakeInspector::with(&[(6, FakeProcess::with_cpu(70.0))]));
    let manager = manager(inspector, vec![cpu_quota("web", 50.0)]);
    manager.start(&CancellationToken::new());

    manager.check_now().await;
    assert_eq!(manager.quota("web").unwrap().violations, 0);

    manager.add_process_to_quota("web", 6).unwrap();
    manager.check_now().await;
    assert_eq!(manager.quota("web").unwrap().violations, 1);

    manager.remove_process_from_quota("web", 6).unwrap();
    manager.check_now().await;
    assert_eq!(manager.quota("web").unwrap().violations, 1);
    assert_eq!(manager.stats().checks_run, 3);

    manager.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_stopped_manager_deactivates_quotas() {
    let inspector = Arc::new(FakeInspector::with(&[(1, FakeProcess::with_cpu(99.0))]));
    let manager = manager(inspector, vec![cpu_quota("web", 50.0).with_processes([1])]);

    manager.start(&CancellationToken::new());
    assert!(manager.quotas().iter().all(|q| q.active));

    manager.stop(Duration::from_secs(1)).await;
    assert!(manager.quotas().iter().all(|q| !q.active));

    manager.check_now().await;
    assert_eq!(manager.quota("web").unwrap().violations, 0);
}

#[test]
fn test_invalid_quota_config_is_rejected() {
    let inspector = Arc::new(FakeInspector::default());
    let collector = Arc::new(ResourceCollector::new(CollectorConfig::default(), inspector));
    let config = QuotaConfig {
        quotas: vec![cpu_quota("web", -5.0)],
        ..Default::default()
    };

    assert!(QuotaManager::new(config, collector, Arc::new(RecordingController::default())).is_err());
}
