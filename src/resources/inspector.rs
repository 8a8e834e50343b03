/*!
 * Sysinfo Inspector
 * Process inspection backed by the sysinfo crate, with /proc reads on Linux
 * for the figures sysinfo does not expose (thread count, I/O operation
 * counts, sockets, network counters).
 */

use super::traits::ProcessInspector;
use super::types::{IoCounters, LoadAverage, MemoryInfo, NetCounters, SystemSample};
use crate::core::errors::{InspectError, InspectResult};
use crate::core::types::Pid;
use parking_lot::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use sysinfo::{Networks, Pid as SysPid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{debug, info};

/// Inspector over a shared `sysinfo::System`
pub struct SysinfoInspector {
    system: Mutex<System>,
}

impl SysinfoInspector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        system.refresh_cpu_usage();
        system.refresh_processes(ProcessesToUpdate::All, true);
        info!(
            processes = system.processes().len(),
            total_memory = system.total_memory(),
            "Sysinfo inspector initialized"
        );
        Self {
            system: Mutex::new(system),
        }
    }

    /// Run `f` against the refreshed process entry, mapping absence to NotFound
    fn with_process<T>(&self, pid: Pid, f: impl FnOnce(&sysinfo::Process, &System) -> T) -> InspectResult<T> {
        let system = self.system.lock();
        system
            .process(SysPid::from_u32(pid))
            .map(|process| f(process, &system))
            .ok_or(InspectError::NotFound(pid))
    }
}

impl Default for SysinfoInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessInspector for SysinfoInspector {
    fn pids(&self) -> InspectResult<Vec<Pid>> {
        let mut system = self.system.lock();
        system.refresh_processes(ProcessesToUpdate::All, true);
        Ok(system.processes().keys().map(|pid| pid.as_u32()).collect())
    }

    fn refresh(&self, pid: Pid) -> InspectResult<()> {
        let sys_pid = SysPid::from_u32(pid);
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            ProcessRefreshKind::everything(),
        );
        if system.process(sys_pid).is_none() {
            debug!(pid, "process vanished before refresh");
            return Err(InspectError::NotFound(pid));
        }
        Ok(())
    }

    fn is_running(&self, pid: Pid) -> bool {
        self.refresh(pid).is_ok()
    }

    fn cpu_percent(&self, pid: Pid) -> InspectResult<f64> {
        self.with_process(pid, |process, _| process.cpu_usage() as f64)
    }

    fn memory(&self, pid: Pid) -> InspectResult<MemoryInfo> {
        self.with_process(pid, |process, system| {
            let total = system.total_memory();
            let rss = process.memory();
            MemoryInfo {
                rss_bytes: rss,
                vms_bytes: process.virtual_memory(),
                percent: if total > 0 {
                    rss as f64 / total as f64 * 100.0
                } else {
                    0.0
                },
            }
        })
    }

    fn io_counters(&self, pid: Pid) -> InspectResult<IoCounters> {
        let usage = self.with_process(pid, |process, _| process.disk_usage())?;
        let (read_count, write_count) = procfs::io_operations(pid).unwrap_or((0, 0));
        Ok(IoCounters {
            read_bytes: usage.total_read_bytes,
            write_bytes: usage.total_written_bytes,
            read_count,
            write_count,
        })
    }

    fn network_io(&self, pid: Pid) -> InspectResult<NetCounters> {
        procfs::net_counters(pid)
    }

    fn num_threads(&self, pid: Pid) -> InspectResult<u32> {
        let tasks = self.with_process(pid, |process, _| process.tasks().map(|t| t.len() as u32))?;
        match tasks {
            Some(count) if count > 0 => Ok(count),
            _ => procfs::thread_count(pid),
        }
    }

    fn connection_count(&self, pid: Pid) -> InspectResult<u32> {
        procfs::socket_count(pid)
    }

    fn create_time(&self, pid: Pid) -> InspectResult<SystemTime> {
        self.with_process(pid, |process, _| {
            UNIX_EPOCH + Duration::from_secs(process.start_time())
        })
    }

    fn system(&self) -> InspectResult<SystemSample> {
        let mut system = self.system.lock();
        system.refresh_memory();
        system.refresh_cpu_usage();
        system.refresh_processes(ProcessesToUpdate::All, true);

        let mut io = IoCounters::default();
        let mut thread_count = 0u64;
        for process in system.processes().values() {
            let usage = process.disk_usage();
            io.read_bytes += usage.total_read_bytes;
            io.write_bytes += usage.total_written_bytes;
            thread_count += process.tasks().map(|t| t.len() as u64).unwrap_or(1);
        }

        let mut net = NetCounters::default();
        let networks = Networks::new_with_refreshed_list();
        for (_name, data) in &networks {
            net.bytes_recv += data.total_received();
            net.bytes_sent += data.total_transmitted();
        }

        let load = System::load_average();

        Ok(SystemSample {
            cpu_percent: system.global_cpu_usage() as f64,
            cpu_count: system.cpus().len(),
            memory_total_bytes: system.total_memory(),
            memory_used_bytes: system.used_memory(),
            io,
            net,
            process_count: system.processes().len(),
            thread_count,
            load_average: LoadAverage {
                one: load.one,
                five: load.five,
                fifteen: load.fifteen,
            },
            uptime_secs: System::uptime(),
        })
    }
}

#[cfg(target_os = "linux")]
mod procfs {
    use super::{InspectError, InspectResult, NetCounters, Pid};
    use std::fs;
    use std::path::PathBuf;

    fn proc_path(pid: Pid, entry: &str) -> PathBuf {
        PathBuf::from(format!("/proc/{}/{}", pid, entry))
    }

    fn read(pid: Pid, entry: &str, metric: &str) -> InspectResult<String> {
        fs::read_to_string(proc_path(pid, entry)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                InspectError::NotFound(pid)
            } else {
                InspectError::unavailable(pid, metric, e.to_string())
            }
        })
    }

    fn field(content: &str, key: &str) -> Option<u64> {
        content
            .lines()
            .find_map(|line| line.strip_prefix(key))
            .and_then(|rest| rest.trim().parse().ok())
    }

    pub fn io_operations(pid: Pid) -> Option<(u64, u64)> {
        let content = read(pid, "io", "io").ok()?;
        Some((field(&content, "syscr:")?, field(&content, "syscw:")?))
    }

    pub fn thread_count(pid: Pid) -> InspectResult<u32> {
        let content = read(pid, "status", "threads")?;
        field(&content, "Threads:")
            .map(|n| n as u32)
            .ok_or_else(|| InspectError::unavailable(pid, "threads", "no Threads line in status"))
    }

    pub fn socket_count(pid: Pid) -> InspectResult<u32> {
        let entries = fs::read_dir(proc_path(pid, "fd")).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                InspectError::NotFound(pid)
            } else {
                InspectError::unavailable(pid, "connections", e.to_string())
            }
        })?;

        let count = entries
            .filter_map(Result::ok)
            .filter_map(|entry| fs::read_link(entry.path()).ok())
            .filter(|target| target.to_string_lossy().starts_with("socket:"))
            .count();
        Ok(count as u32)
    }

    /// Interface totals from the process's network namespace
    pub fn net_counters(pid: Pid) -> InspectResult<NetCounters> {
        let content = read(pid, "net/dev", "network")?;
        Ok(parse_net_dev(&content))
    }

    pub(super) fn parse_net_dev(content: &str) -> NetCounters {
        let mut counters = NetCounters::default();
        for line in content.lines().skip(2) {
            let Some((_iface, stats)) = line.split_once(':') else {
                continue;
            };
            let fields: Vec<u64> = stats
                .split_whitespace()
                .filter_map(|f| f.parse().ok())
                .collect();
            if fields.len() >= 9 {
                counters.bytes_recv += fields[0];
                counters.bytes_sent += fields[8];
            }
        }
        counters
    }
}

#[cfg(not(target_os = "linux"))]
mod procfs {
    use super::{InspectError, InspectResult, NetCounters, Pid};

    pub fn io_operations(_pid: Pid) -> Option<(u64, u64)> {
        None
    }

    pub fn thread_count(pid: Pid) -> InspectResult<u32> {
        Err(InspectError::unavailable(pid, "threads", "not supported on this platform"))
    }

    pub fn socket_count(pid: Pid) -> InspectResult<u32> {
        Err(InspectError::unavailable(pid, "connections", "not supported on this platform"))
    }

    pub fn net_counters(pid: Pid) -> InspectResult<NetCounters> {
        Err(InspectError::unavailable(pid, "network", "not supported on this platform"))
    }
}
