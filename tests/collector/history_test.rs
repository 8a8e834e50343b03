/*!
 * History and Statistics Tests
 * Per-process history recorded by fresh reads and windowed statistics
 */

use crate::support::{FakeInspector, FakeProcess};
use pretty_assertions::assert_eq;
use procgov::resources::{percentile, trend, Trend};
use procgov::{CollectorConfig, ResourceCollector};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn uncached(inspector: &Arc<FakeInspector>) -> ResourceCollector {
    ResourceCollector::new(
        CollectorConfig {
            max_cache_size: 0,
            ..Default::default()
        },
        inspector.clone(),
    )
}

#[test]
fn test_fresh_reads_build_history() {
    let inspector = Arc::new(FakeInspector::with(&[(3, FakeProcess::with_cpu(10.0))]));
    let collector = uncached(&inspector);

    for cpu in [10.0, 10.0, 30.0, 30.0] {
        inspector.set_cpu(3, cpu);
        collector.collect_process(3).unwrap();
    }

    let history = collector.history(3);
    assert_eq!(history.len(), 4);
    assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(collector.tracked_history_pids(), vec![3]);

    let stats = collector.resource_stats(3, Duration::from_secs(60)).unwrap();
    assert_eq!(stats.samples, 4);
    assert_eq!(stats.cpu_percent.average, 20.0);
    assert_eq!(stats.cpu_percent.min, 10.0);
    assert_eq!(stats.cpu_percent.max, 30.0);
    assert_eq!(stats.cpu_percent.std_dev, 10.0);
    assert_eq!(stats.cpu_percent.p95, 30.0);
    assert_eq!(stats.cpu_percent.trend, Trend::Increasing);
    assert_eq!(stats.threads.trend, Trend::Stable);
}

#[test]
fn test_cache_hits_do_not_add_history() {
    let inspector = Arc::new(FakeInspector::with(&[(3, FakeProcess::with_cpu(10.0))]));
    let collector = ResourceCollector::new(CollectorConfig::default(), inspector.clone());

    collector.collect_process(3).unwrap();
    collector.collect_process(3).unwrap();

    assert_eq!(collector.history(3).len(), 1);
}

#[test]
fn test_disabled_history_and_clear() {
    let inspector = Arc::new(FakeInspector::with(&[(3, FakeProcess::with_cpu(10.0))]));
    let disabled = ResourceCollector::new(
        CollectorConfig {
            enable_history: false,
            ..Default::default()
        },
        inspector.clone(),
    );
    disabled.collect_process(3).unwrap();
    assert!(disabled.history(3).is_empty());
    assert!(disabled.resource_stats(3, Duration::from_secs(60)).is_none());

    let collector = uncached(&inspector);
    collector.collect_process(3).unwrap();
    assert!(collector.clear_history(3));
    assert!(!collector.clear_history(3));
    assert!(collector.resource_stats(3, Duration::from_secs(60)).is_none());
}

#[test]
fn test_small_samples_percentile_is_max() {
    let values: Vec<f64> = (1..=10).map(f64::from).collect();
    assert_eq!(percentile(&values, 0.95), 10.0);

    let values: Vec<f64> = (1..=40).map(f64::from).collect();
    assert_eq!(percentile(&values, 0.95), 39.0);
}

#[test]
fn test_trend_thresholds() {
    assert_eq!(trend(&[10.0]), Trend::Stable);
    assert_eq!(trend(&[10.0, 10.5]), Trend::Stable);
    assert_eq!(trend(&[10.0, 12.0]), Trend::Increasing);
    assert_eq!(trend(&[10.0, 8.0]), Trend::Decreasing);
}

proptest! {
    #[test]
    fn prop_percentile_is_a_sample_within_bounds(
        values in prop::collection::vec(0.0f64..1000.0, 1..200),
        p in 0.0f64..1.0,
    ) {
        let result = percentile(&values, p);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        prop_assert!(values.contains(&result));
        prop_assert!(result >= min && result <= max);
    }
}
