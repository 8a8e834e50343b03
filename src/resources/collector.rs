/*!
 * Resource Collector
 * Per-process and system-wide collection with TTL caching and bounded history
 *
 * The collector runs no background work of its own; every collection happens
 * on the caller's thread.
 */

use super::cache::SnapshotCache;
use super::history::HistoryStore;
use super::traits::ProcessInspector;
use super::types::{
    performance_score, CacheStats, CollectionStats, CollectorConfig, HealthLabel, IoCounters,
    MemoryInfo, NetCounters, ProcessSnapshot, ResourceStats, SystemSnapshot,
};
use crate::core::errors::{CollectorError, CollectorResult, InspectError};
use crate::core::types::{bytes_to_kb, bytes_to_mb, Pid};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

#[derive(Default)]
struct CollectorCounters {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    fresh_reads: AtomicU64,
    fresh_latency_micros: AtomicU64,
}

/// Caching resource collector over a `ProcessInspector`
pub struct ResourceCollector {
    config: CollectorConfig,
    inspector: Arc<dyn ProcessInspector>,
    cache: RwLock<SnapshotCache>,
    history: Option<HistoryStore>,
    counters: CollectorCounters,
    last_collection: Mutex<Option<SystemTime>>,
}

impl ResourceCollector {
    pub fn new(config: CollectorConfig, inspector: Arc<dyn ProcessInspector>) -> Self {
        let history = config
            .enable_history
            .then(|| HistoryStore::new(config.history_retention));

        info!(
            cache_ttl_ms = config.cache_ttl.as_millis() as u64,
            max_cache_size = config.max_cache_size,
            history = config.enable_history,
            cpu = config.collect_cpu,
            memory = config.collect_memory,
            disk = config.collect_disk,
            network = config.collect_network,
            threads = config.collect_threads,
            "Resource collector initialized"
        );

        Self {
            cache: RwLock::new(SnapshotCache::new(config.cache_ttl, config.max_cache_size)),
            history,
            config,
            inspector,
            counters: CollectorCounters::default(),
            last_collection: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Collect one process, serving from cache while the entry is live
    pub fn collect_process(&self, pid: Pid) -> CollectorResult<ProcessSnapshot> {
        self.counters.total.fetch_add(1, Ordering::Relaxed);

        if let Some(snapshot) = self.cache.read().get(pid, Instant::now()) {
            self.counters.successful.fetch_add(1, Ordering::Relaxed);
            return Ok(snapshot);
        }

        let started = Instant::now();
        let result = self.read_process(pid);
        self.counters.fresh_reads.fetch_add(1, Ordering::Relaxed);
        self.counters
            .fresh_latency_micros
            .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);

        match result {
            Ok(snapshot) => {
                self.counters.successful.fetch_add(1, Ordering::Relaxed);
                *self.last_collection.lock() = Some(snapshot.timestamp);

                if let Some(evicted) = self.cache.write().insert(pid, snapshot.clone(), Instant::now()) {
                    debug!(pid, evicted, "snapshot cache full, evicted nearest expiration");
                }
                if let Some(history) = &self.history {
                    history.record(snapshot.clone(), snapshot.timestamp);
                }
                Ok(snapshot)
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Collect system-wide figures (never cached)
    pub fn collect_system(&self) -> CollectorResult<SystemSnapshot> {
        let sample = self
            .inspector
            .system()
            .map_err(|e| CollectorError::SystemUnavailable(e.to_string()))?;
        Ok(SystemSnapshot::from_sample(sample, SystemTime::now()))
    }

    /// Best-effort collection of several processes.
    /// Fails only when every requested collection failed.
    pub fn collect_batch(&self, pids: &[Pid]) -> CollectorResult<HashMap<Pid, ProcessSnapshot>> {
        let mut snapshots = HashMap::with_capacity(pids.len());
        let mut failures = 0usize;

        for &pid in pids {
            match self.collect_process(pid) {
                Ok(snapshot) => {
                    snapshots.insert(pid, snapshot);
                }
                Err(e) => {
                    failures += 1;
                    debug!(pid, error = %e, "batch collection skipped process");
                }
            }
        }

        if !pids.is_empty() && snapshots.is_empty() {
            warn!(attempted = pids.len(), "every collection in batch failed");
            return Err(CollectorError::BatchFailed {
                attempted: pids.len(),
            });
        }
        if failures > 0 {
            debug!(failures, collected = snapshots.len(), "batch collection finished with failures");
        }
        Ok(snapshots)
    }

    /// Collect every live process
    pub fn collect_all(&self) -> CollectorResult<HashMap<Pid, ProcessSnapshot>> {
        let pids = self
            .inspector
            .pids()
            .map_err(|e| CollectorError::SystemUnavailable(e.to_string()))?;
        self.collect_batch(&pids)
    }

    /// Drop the cached snapshot for `pid`; returns whether one existed
    pub fn invalidate_cache(&self, pid: Pid) -> bool {
        self.cache.write().remove(pid)
    }

    /// Drop every cached snapshot; returns how many were dropped
    pub fn invalidate_all(&self) -> usize {
        let cleared = self.cache.write().clear();
        debug!(cleared, "snapshot cache cleared");
        cleared
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.read().stats(Instant::now())
    }

    pub fn collection_stats(&self) -> CollectionStats {
        let cache = self.cache_stats();
        let fresh_reads = self.counters.fresh_reads.load(Ordering::Relaxed);
        let latency_total = self.counters.fresh_latency_micros.load(Ordering::Relaxed);

        CollectionStats {
            total_collections: self.counters.total.load(Ordering::Relaxed),
            successful_collections: self.counters.successful.load(Ordering::Relaxed),
            failed_collections: self.counters.failed.load(Ordering::Relaxed),
            cache_hits: cache.hits,
            cache_misses: cache.misses,
            cache_evictions: cache.evictions,
            average_latency: if fresh_reads > 0 {
                Duration::from_micros(latency_total / fresh_reads)
            } else {
                Duration::ZERO
            },
            last_collection: *self.last_collection.lock(),
        }
    }

    /// Retained snapshots for `pid`, oldest first (empty when history is disabled)
    pub fn history(&self, pid: Pid) -> Vec<ProcessSnapshot> {
        self.history.as_ref().map(|h| h.get(pid)).unwrap_or_default()
    }

    /// Aggregate statistics for `pid` over the last `window`
    pub fn resource_stats(&self, pid: Pid, window: Duration) -> Option<ResourceStats> {
        self.history
            .as_ref()
            .and_then(|h| h.stats(pid, window, SystemTime::now()))
    }

    pub fn clear_history(&self, pid: Pid) -> bool {
        self.history.as_ref().is_some_and(|h| h.clear(pid))
    }

    /// PIDs with retained history
    pub fn tracked_history_pids(&self) -> Vec<Pid> {
        self.history.as_ref().map(|h| h.pids()).unwrap_or_default()
    }

    /// Fresh read of every enabled dimension; any enabled failure fails the whole read
    fn read_process(&self, pid: Pid) -> CollectorResult<ProcessSnapshot> {
        let inspector = &self.inspector;
        let fail = |resource: &'static str| move |e: InspectError| Self::map_error(pid, resource, e);

        inspector.refresh(pid).map_err(fail("process"))?;
        let started_at = inspector.create_time(pid).map_err(fail("process"))?;

        let cpu_percent = if self.config.collect_cpu {
            inspector.cpu_percent(pid).map_err(fail("cpu"))?
        } else {
            0.0
        };

        let memory = if self.config.collect_memory {
            inspector.memory(pid).map_err(fail("memory"))?
        } else {
            MemoryInfo::default()
        };

        let io = if self.config.collect_disk {
            inspector.io_counters(pid).map_err(fail("disk"))?
        } else {
            IoCounters::default()
        };

        let (net, connections) = if self.config.collect_network {
            (
                inspector.network_io(pid).map_err(fail("network"))?,
                inspector.connection_count(pid).map_err(fail("network"))?,
            )
        } else {
            (NetCounters::default(), 0)
        };

        let threads = if self.config.collect_threads {
            inspector.num_threads(pid).map_err(fail("threads"))?
        } else {
            0
        };

        let score = performance_score(cpu_percent, memory.percent);

        Ok(ProcessSnapshot {
            pid,
            timestamp: SystemTime::now(),
            started_at,
            cpu_percent,
            memory_mb: bytes_to_mb(memory.rss_bytes),
            memory_percent: memory.percent,
            rss_bytes: memory.rss_bytes,
            vms_bytes: memory.vms_bytes,
            disk_read_mb: bytes_to_mb(io.read_bytes),
            disk_write_mb: bytes_to_mb(io.write_bytes),
            disk_read_count: io.read_count,
            disk_write_count: io.write_count,
            net_sent_kb: bytes_to_kb(net.bytes_sent),
            net_recv_kb: bytes_to_kb(net.bytes_recv),
            connections,
            threads,
            performance_score: score,
            health: HealthLabel::from_score(score),
        })
    }

    fn map_error(pid: Pid, resource: &str, err: InspectError) -> CollectorError {
        match err {
            InspectError::NotFound(_) => CollectorError::NotFound(pid),
            InspectError::Unavailable { reason, .. } => CollectorError::CollectionFailed {
                pid,
                resource: resource.to_string(),
                reason,
            },
        }
    }
}
