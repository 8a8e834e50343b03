/*!
 * Resource Traits
 * Process inspection capability consumed by the collector
 */

use super::types::{IoCounters, MemoryInfo, NetCounters, SystemSample};
use crate::core::errors::InspectResult;
use crate::core::types::Pid;
use std::time::SystemTime;

/// Read-only access to operating-system process information
///
/// Per-metric queries return `InspectError::NotFound` when the process is gone
/// and `InspectError::Unavailable` when that single metric cannot be read.
pub trait ProcessInspector: Send + Sync {
    /// Enumerate live process IDs
    fn pids(&self) -> InspectResult<Vec<Pid>>;

    /// Refresh backend state for `pid` before a round of queries.
    /// Returns `NotFound` if the process no longer exists.
    fn refresh(&self, pid: Pid) -> InspectResult<()>;

    /// Check whether a process exists
    fn is_running(&self, pid: Pid) -> bool;

    /// CPU usage percent (may exceed 100 on multi-core systems)
    fn cpu_percent(&self, pid: Pid) -> InspectResult<f64>;

    /// Resident/virtual size and percent of total memory
    fn memory(&self, pid: Pid) -> InspectResult<MemoryInfo>;

    /// Cumulative disk I/O counters
    fn io_counters(&self, pid: Pid) -> InspectResult<IoCounters>;

    /// Cumulative network counters visible to the process
    fn network_io(&self, pid: Pid) -> InspectResult<NetCounters>;

    /// Number of threads
    fn num_threads(&self, pid: Pid) -> InspectResult<u32>;

    /// Number of open sockets
    fn connection_count(&self, pid: Pid) -> InspectResult<u32>;

    /// Process creation time
    fn create_time(&self, pid: Pid) -> InspectResult<SystemTime>;

    /// System-wide figures
    fn system(&self) -> InspectResult<SystemSample>;
}
