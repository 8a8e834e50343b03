/*!
 * Resources
 * Process inspection, snapshot caching, history, and statistics
 */

mod cache;
mod collector;
mod history;
mod inspector;
pub mod traits;
pub mod types;

pub use cache::SnapshotCache;
pub use collector::ResourceCollector;
pub use history::{metric_stats, percentile, trend, HistoryStore};
pub use inspector::SysinfoInspector;
pub use traits::ProcessInspector;
pub use types::{
    performance_score, CacheStats, CollectionStats, CollectorConfig, HealthLabel, IoCounters,
    LoadAverage, MemoryInfo, MetricStats, NetCounters, ProcessSnapshot, ResourceStats,
    SystemSample, SystemSnapshot, Trend,
};
