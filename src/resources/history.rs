/*!
 * Snapshot History
 * Per-process ordered snapshot sequences pruned to a retention window,
 * and the aggregate statistics computed over them
 */

use super::types::{MetricStats, ProcessSnapshot, ResourceStats, Trend};
use crate::core::limits::{STATS_PERCENTILE, TREND_DECREASE_FACTOR, TREND_INCREASE_FACTOR};
use crate::core::types::Pid;
use ahash::RandomState;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, SystemTime};

/// Sharded per-PID history
pub struct HistoryStore {
    records: DashMap<Pid, VecDeque<ProcessSnapshot>, RandomState>,
    retention: Duration,
}

impl HistoryStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            records: DashMap::with_hasher(RandomState::new()),
            retention,
        }
    }

    /// Append a snapshot and drop entries older than the retention window
    pub fn record(&self, snapshot: ProcessSnapshot, now: SystemTime) {
        let cutoff = now.checked_sub(self.retention);
        let mut entry = self.records.entry(snapshot.pid).or_default();
        entry.push_back(snapshot);
        if let Some(cutoff) = cutoff {
            while entry.front().is_some_and(|s| s.timestamp < cutoff) {
                entry.pop_front();
            }
        }
    }

    /// Snapshots for `pid`, oldest first
    pub fn get(&self, pid: Pid) -> Vec<ProcessSnapshot> {
        self.records
            .get(&pid)
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self, pid: Pid) -> bool {
        self.records.remove(&pid).is_some()
    }

    pub fn pids(&self) -> Vec<Pid> {
        self.records.iter().map(|entry| *entry.key()).collect()
    }

    /// Aggregate statistics over the snapshots taken within `window` of `now`
    pub fn stats(&self, pid: Pid, window: Duration, now: SystemTime) -> Option<ResourceStats> {
        let records = self.records.get(&pid)?;
        let cutoff = now.checked_sub(window);
        let samples: Vec<&ProcessSnapshot> = records
            .iter()
            .filter(|s| cutoff.map_or(true, |c| s.timestamp >= c))
            .collect();

        let series = |f: fn(&ProcessSnapshot) -> f64| -> Vec<f64> { samples.iter().map(|s| f(s)).collect() };

        Some(ResourceStats {
            pid,
            samples: samples.len(),
            window,
            cpu_percent: metric_stats(&series(|s| s.cpu_percent))?,
            memory_mb: metric_stats(&series(|s| s.memory_mb))?,
            threads: metric_stats(&series(|s| s.threads as f64))?,
            disk_read_mb: metric_stats(&series(|s| s.disk_read_mb))?,
            disk_write_mb: metric_stats(&series(|s| s.disk_write_mb))?,
        })
    }
}

/// Statistics over a chronologically ordered series; None when empty
pub fn metric_stats(values: &[f64]) -> Option<MetricStats> {
    if values.is_empty() {
        return None;
    }

    let n = values.len() as f64;
    let average = values.iter().sum::<f64>() / n;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let variance = values.iter().map(|v| (v - average).powi(2)).sum::<f64>() / n;

    Some(MetricStats {
        average,
        min,
        max,
        std_dev: variance.sqrt(),
        p95: percentile(values, STATS_PERCENTILE),
        trend: trend(values),
    })
}

/// Index-based percentile: `sorted[floor(n * p)]`, clamped to the last element.
/// For fewer than 20 samples at p = 0.95 this is the maximum.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let index = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
    sorted[index]
}

/// Compare the mean of the second half against the first half
pub fn trend(values: &[f64]) -> Trend {
    if values.len() < 2 {
        return Trend::Stable;
    }
    let half = values.len() / 2;
    let mean = |slice: &[f64]| slice.iter().sum::<f64>() / slice.len() as f64;
    let first = mean(&values[..half]);
    let second = mean(&values[half..]);

    if second > first * TREND_INCREASE_FACTOR {
        Trend::Increasing
    } else if second < first * TREND_DECREASE_FACTOR {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}
