/*!
 * System Limits and Constants
 *
 * Centralized location for defaults, thresholds, and fixed intervals.
 * Organized by subsystem. Configurable values here are only the defaults;
 * the matching config structs override them.
 */

use std::time::Duration;

// =============================================================================
// RESOURCE COLLECTOR
// =============================================================================

/// How often callers are expected to sample (informational for the collector)
pub const DEFAULT_COLLECTION_INTERVAL: Duration = Duration::from_secs(5);

/// Snapshot cache time-to-live
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(2);

/// Maximum cached snapshots
pub const DEFAULT_MAX_CACHE_SIZE: usize = 1000;

/// Per-process history retention window
pub const DEFAULT_HISTORY_RETENTION: Duration = Duration::from_secs(3600);

/// Percentile reported by resource statistics
pub const STATS_PERCENTILE: f64 = 0.95;

/// Second-half mean must exceed first-half mean by this factor to count as increasing
pub const TREND_INCREASE_FACTOR: f64 = 1.1;

/// Second-half mean must fall under first-half mean by this factor to count as decreasing
pub const TREND_DECREASE_FACTOR: f64 = 0.9;

// =============================================================================
// QUOTA MANAGER
// =============================================================================

/// Quota check loop period
pub const DEFAULT_QUOTA_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Capacity of the quota event queue (events beyond this are dropped)
pub const DEFAULT_QUOTA_EVENT_QUEUE: usize = 1000;

/// Pause between terminating and handing a process back for relaunch
pub const RESTART_DELAY: Duration = Duration::from_secs(2);

/// CPU ratio at or above which a violation is critical
pub const CPU_CRITICAL_RATIO: f64 = 1.5;

/// CPU ratio at or above which a violation is high
pub const CPU_HIGH_RATIO: f64 = 1.2;

/// Memory ratio at or above which a violation is critical
pub const MEMORY_CRITICAL_RATIO: f64 = 1.2;

/// Memory ratio at or above which a violation is high (shadowed by the critical band)
pub const MEMORY_HIGH_RATIO: f64 = 1.2;

// =============================================================================
// TASK MANAGER
// =============================================================================

/// Maximum tasks known to the manager (any status)
pub const DEFAULT_MAX_TASKS: usize = 1000;

/// Maximum simultaneously running tasks
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Task timeout when the task does not set one
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(3600);

/// Retry budget when the task does not set one
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Scheduler loop period
pub const DEFAULT_TASK_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Bounded task result history
pub const DEFAULT_HISTORY_SIZE: usize = 1000;

/// Capacity of the task event queue (events beyond this are dropped)
pub const DEFAULT_TASK_EVENT_QUEUE: usize = 1000;

/// Default task priority
pub const DEFAULT_TASK_PRIORITY: u8 = 5;

/// Timeout watchdog period (fixed; independent of each execution's own deadline)
pub const WATCHDOG_INTERVAL: Duration = Duration::from_secs(5);

/// Stats aggregation loop period
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(30);

/// Tail of the stdout log kept in a task result
pub const MAX_CAPTURED_OUTPUT: usize = 64 * 1024;

/// Characters a task command may not contain
pub const FORBIDDEN_COMMAND_CHARS: [char; 10] = [';', '|', '&', '\n', '\r', '\0', '`', '$', '(', ')'];

// =============================================================================
// SHUTDOWN
// =============================================================================

/// Default grace period for stopping background loops and monitors
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
