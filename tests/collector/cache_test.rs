/*!
 * Snapshot Cache Tests
 * TTL reuse, capacity eviction, and invalidation through the collector
 */

use crate::support::{FakeInspector, FakeProcess};
use pretty_assertions::assert_eq;
use procgov::{CollectorConfig, CollectorError, ResourceCollector};
use std::sync::Arc;
use std::time::Duration;

fn collector(inspector: &Arc<FakeInspector>, config: CollectorConfig) -> ResourceCollector {
    ResourceCollector::new(config, inspector.clone())
}

#[test]
fn test_snapshot_reused_within_ttl() {
    let inspector = Arc::new(FakeInspector::with(&[(10, FakeProcess::with_cpu(30.0))]));
    let collector = collector(&inspector, CollectorConfig::default());

    let first = collector.collect_process(10).unwrap();
    inspector.set_cpu(10, 90.0);
    let second = collector.collect_process(10).unwrap();

    assert_eq!(first, second);
    assert_eq!(inspector.refreshes(), 1);

    let stats = collector.collection_stats();
    assert_eq!(stats.total_collections, 2);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_misses, 1);
}

#[test]
fn test_expired_snapshot_is_refreshed() {
    let inspector = Arc::new(FakeInspector::with(&[(10, FakeProcess::with_cpu(30.0))]));
    let collector = collector(
        &inspector,
        CollectorConfig {
            cache_ttl: Duration::from_millis(20),
            ..Default::default()
        },
    );

    collector.collect_process(10).unwrap();
    inspector.set_cpu(10, 45.0);
    std::thread::sleep(Duration::from_millis(40));

    let fresh = collector.collect_process(10).unwrap();
    assert_eq!(fresh.cpu_percent, 45.0);
    assert_eq!(inspector.refreshes(), 2);
}

#[test]
fn test_single_entry_cache_evicts_previous_pid() {
    let inspector = Arc::new(FakeInspector::with(&[
        (1, FakeProcess::with_cpu(5.0)),
        (2, FakeProcess::with_cpu(6.0)),
    ]));
    let collector = collector(
        &inspector,
        CollectorConfig {
            max_cache_size: 1,
            ..Default::default()
        },
    );

    collector.collect_process(1).unwrap();
    collector.collect_process(2).unwrap();

    let stats = collector.cache_stats();
    assert_eq!(stats.size, 1);
    assert_eq!(stats.evictions, 1);

    // pid 1 was evicted, so this is a fresh read
    collector.collect_process(1).unwrap();
    assert_eq!(inspector.refreshes(), 3);
}

#[test]
fn test_zero_capacity_disables_cache() {
    let inspector = Arc::new(FakeInspector::with(&[(1, FakeProcess::with_cpu(5.0))]));
    let collector = collector(
        &inspector,
        CollectorConfig {
            max_cache_size: 0,
            ..Default::default()
        },
    );

    collector.collect_process(1).unwrap();
    collector.collect_process(1).unwrap();

    assert_eq!(inspector.refreshes(), 2);
    assert_eq!(collector.cache_stats().size, 0);
}

#[test]
fn test_invalidation_forces_fresh_read() {
    let inspector = Arc::new(FakeInspector::with(&[
        (1, FakeProcess::with_cpu(5.0)),
        (2, FakeProcess::with_cpu(6.0)),
    ]));
    let collector = collector(&inspector, CollectorConfig::default());

    collector.collect_batch(&[1, 2]).unwrap();
    assert!(collector.invalidate_cache(1));
    assert!(!collector.invalidate_cache(1));

    collector.collect_process(1).unwrap();
    assert_eq!(inspector.refreshes(), 3);

    assert_eq!(collector.invalidate_all(), 2);
    assert_eq!(collector.cache_stats().size, 0);
}

#[test]
fn test_vanished_process_is_not_found() {
    let inspector = Arc::new(FakeInspector::with(&[(7, FakeProcess::with_cpu(1.0))]));
    let collector = collector(
        &inspector,
        CollectorConfig {
            max_cache_size: 0,
            ..Default::default()
        },
    );

    collector.collect_process(7).unwrap();
    inspector.kill(7);

    assert_eq!(collector.collect_process(7), Err(CollectorError::NotFound(7)));
    assert_eq!(collector.collection_stats().failed_collections, 1);
}

#[test]
fn test_batch_is_best_effort() {
    let inspector = Arc::new(FakeInspector::with(&[(1, FakeProcess::with_cpu(5.0))]));
    let collector = collector(&inspector, CollectorConfig::default());

    let snapshots = collector.collect_batch(&[1, 99]).unwrap();
    assert_eq!(snapshots.len(), 1);
    assert!(snapshots.contains_key(&1));

    assert_eq!(
        collector.collect_batch(&[98, 99]),
        Err(CollectorError::BatchFailed { attempted: 2 })
    );
    assert!(collector.collect_batch(&[]).unwrap().is_empty());
}

#[test]
fn test_collect_all_and_system() {
    let inspector = Arc::new(FakeInspector::with(&[
        (1, FakeProcess::with_cpu(5.0)),
        (2, FakeProcess::with_cpu(6.0)),
        (3, FakeProcess::with_cpu(7.0)),
    ]));
    let collector = collector(&inspector, CollectorConfig::default());

    assert_eq!(collector.collect_all().unwrap().len(), 3);

    let system = collector.collect_system().unwrap();
    assert_eq!(system.cpu_count, 8);
    assert_eq!(system.process_count, 3);
    assert_eq!(system.memory_percent, 25.0);
}
