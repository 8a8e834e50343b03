/*!
 * Resource Types
 * Snapshots, collector configuration, and statistics
 */

use crate::core::limits::{
    DEFAULT_CACHE_TTL, DEFAULT_COLLECTION_INTERVAL, DEFAULT_HISTORY_RETENTION,
    DEFAULT_MAX_CACHE_SIZE,
};
use crate::core::serde::{
    duration_millis, is_none, is_zero_u32, optional_system_time_micros, serialize_duration_secs,
    system_time_micros,
};
use crate::core::types::{bytes_to_mb, Pid};
use crate::core::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime};

/// Coarse health classification derived from the performance score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLabel {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl HealthLabel {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 80.0 => HealthLabel::Excellent,
            s if s >= 60.0 => HealthLabel::Good,
            s if s >= 40.0 => HealthLabel::Fair,
            s if s >= 20.0 => HealthLabel::Poor,
            _ => HealthLabel::Critical,
        }
    }
}

impl fmt::Display for HealthLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealthLabel::Excellent => "excellent",
            HealthLabel::Good => "good",
            HealthLabel::Fair => "fair",
            HealthLabel::Poor => "poor",
            HealthLabel::Critical => "critical",
        };
        f.write_str(label)
    }
}

/// 0-100 score, higher is healthier. Placeholder weighting for reporting only.
pub fn performance_score(cpu_percent: f64, memory_percent: f64) -> f64 {
    let cpu = cpu_percent.clamp(0.0, 100.0);
    let memory = memory_percent.clamp(0.0, 100.0);
    (100.0 - (0.5 * cpu + 0.5 * memory)).clamp(0.0, 100.0)
}

/// Memory figures reported by the inspection backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub rss_bytes: u64,
    pub vms_bytes: u64,
    pub percent: f64,
}

/// Cumulative disk I/O counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoCounters {
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_count: u64,
    pub write_count: u64,
}

/// Cumulative network counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

/// 1/5/15 minute load averages
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// Raw system-wide figures reported by the inspection backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSample {
    pub cpu_percent: f64,
    pub cpu_count: usize,
    pub memory_total_bytes: u64,
    pub memory_used_bytes: u64,
    pub io: IoCounters,
    pub net: NetCounters,
    pub process_count: usize,
    pub thread_count: u64,
    pub load_average: LoadAverage,
    pub uptime_secs: u64,
}

/// Point-in-time resource usage of one process. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub pid: Pid,
    #[serde(with = "system_time_micros")]
    pub timestamp: SystemTime,
    #[serde(with = "system_time_micros")]
    pub started_at: SystemTime,

    pub cpu_percent: f64,

    pub memory_mb: f64,
    pub memory_percent: f64,
    pub rss_bytes: u64,
    pub vms_bytes: u64,

    pub disk_read_mb: f64,
    pub disk_write_mb: f64,
    pub disk_read_count: u64,
    pub disk_write_count: u64,

    pub net_sent_kb: f64,
    pub net_recv_kb: f64,
    #[serde(skip_serializing_if = "is_zero_u32", default)]
    pub connections: u32,

    pub threads: u32,

    pub performance_score: f64,
    pub health: HealthLabel,
}

impl ProcessSnapshot {
    /// Wall-clock time the process has been alive at `now`
    pub fn runtime_at(&self, now: SystemTime) -> Duration {
        now.duration_since(self.started_at).unwrap_or_default()
    }
}

/// Point-in-time resource usage of the whole system. Never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    #[serde(with = "system_time_micros")]
    pub timestamp: SystemTime,

    pub cpu_percent: f64,
    pub cpu_count: usize,

    pub memory_total_mb: f64,
    pub memory_used_mb: f64,
    pub memory_percent: f64,

    pub disk_read_mb: f64,
    pub disk_write_mb: f64,
    pub disk_read_count: u64,
    pub disk_write_count: u64,

    pub net_sent_kb: f64,
    pub net_recv_kb: f64,

    pub process_count: usize,
    pub thread_count: u64,
    pub load_average: LoadAverage,
    #[serde(serialize_with = "serialize_duration_secs", skip_deserializing)]
    pub uptime: Duration,

    pub performance_score: f64,
    pub health: HealthLabel,
}

impl SystemSnapshot {
    pub(crate) fn from_sample(sample: SystemSample, timestamp: SystemTime) -> Self {
        let memory_percent = if sample.memory_total_bytes > 0 {
            sample.memory_used_bytes as f64 / sample.memory_total_bytes as f64 * 100.0
        } else {
            0.0
        };
        let score = performance_score(sample.cpu_percent, memory_percent);

        Self {
            timestamp,
            cpu_percent: sample.cpu_percent,
            cpu_count: sample.cpu_count,
            memory_total_mb: bytes_to_mb(sample.memory_total_bytes),
            memory_used_mb: bytes_to_mb(sample.memory_used_bytes),
            memory_percent,
            disk_read_mb: bytes_to_mb(sample.io.read_bytes),
            disk_write_mb: bytes_to_mb(sample.io.write_bytes),
            disk_read_count: sample.io.read_count,
            disk_write_count: sample.io.write_count,
            net_sent_kb: sample.net.bytes_sent as f64 / 1024.0,
            net_recv_kb: sample.net.bytes_recv as f64 / 1024.0,
            process_count: sample.process_count,
            thread_count: sample.thread_count,
            load_average: sample.load_average,
            uptime: Duration::from_secs(sample.uptime_secs),
            performance_score: score,
            health: HealthLabel::from_score(score),
        }
    }
}

/// Resource collector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub collect_cpu: bool,
    pub collect_memory: bool,
    pub collect_disk: bool,
    pub collect_network: bool,
    pub collect_threads: bool,

    /// Period used by callers that sample on a timer
    #[serde(with = "duration_millis")]
    pub collection_interval: Duration,

    #[serde(with = "duration_millis")]
    pub cache_ttl: Duration,
    /// Zero disables caching
    pub max_cache_size: usize,

    pub enable_history: bool,
    #[serde(with = "duration_millis")]
    pub history_retention: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            collect_cpu: true,
            collect_memory: true,
            collect_disk: true,
            collect_network: true,
            collect_threads: true,
            collection_interval: DEFAULT_COLLECTION_INTERVAL,
            cache_ttl: DEFAULT_CACHE_TTL,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            enable_history: true,
            history_retention: DEFAULT_HISTORY_RETENTION,
        }
    }
}

impl CollectorConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.collection_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "collector.collection_interval must be positive".into(),
            ));
        }
        if self.enable_history && self.history_retention.is_zero() {
            return Err(ConfigError::Invalid(
                "collector.history_retention must be positive when history is enabled".into(),
            ));
        }
        Ok(())
    }
}

/// Snapshot cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub evictions: u64,
    #[serde(skip_serializing_if = "is_none", skip_deserializing)]
    pub oldest_entry_age: Option<Duration>,
    #[serde(skip_serializing_if = "is_none", skip_deserializing)]
    pub newest_entry_age: Option<Duration>,
}

/// Collector-wide statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub total_collections: u64,
    pub successful_collections: u64,
    pub failed_collections: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_evictions: u64,
    #[serde(serialize_with = "serialize_duration_secs", skip_deserializing)]
    pub average_latency: Duration,
    #[serde(
        with = "optional_system_time_micros",
        skip_serializing_if = "is_none",
        default
    )]
    pub last_collection: Option<SystemTime>,
}

/// Direction of a metric over a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

/// Aggregate statistics of one metric over a window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    /// Index-based 95th percentile; equals `max` when fewer than 20 samples
    pub p95: f64,
    pub trend: Trend,
}

/// Per-process aggregate statistics over a history window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceStats {
    pub pid: Pid,
    pub samples: usize,
    #[serde(serialize_with = "serialize_duration_secs", skip_deserializing)]
    pub window: Duration,
    pub cpu_percent: MetricStats,
    pub memory_mb: MetricStats,
    pub threads: MetricStats,
    pub disk_read_mb: MetricStats,
    pub disk_write_mb: MetricStats,
}
