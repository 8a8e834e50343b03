/*!
 * Quota Evaluation
 * Pure limit checks of one snapshot against one set of limits
 */

use super::types::{QuotaLimits, QuotaResource, Severity, Violation};
use crate::core::limits::{CPU_CRITICAL_RATIO, CPU_HIGH_RATIO, MEMORY_CRITICAL_RATIO, MEMORY_HIGH_RATIO};
use crate::resources::ProcessSnapshot;
use std::time::SystemTime;

/// Every limit `snapshot` exceeds at `now`, in cpu, memory, threads, runtime order
pub fn evaluate(limits: &QuotaLimits, snapshot: &ProcessSnapshot, now: SystemTime) -> Vec<Violation> {
    let mut violations = Vec::new();

    if let Some(limit) = limits.max_cpu_percent {
        let used = snapshot.cpu_percent;
        if used > limit {
            violations.push(Violation {
                resource: QuotaResource::Cpu,
                used,
                limit,
                severity: cpu_severity(used / limit),
            });
        }
    }

    if let Some(limit) = limits.max_memory_mb {
        let used = snapshot.memory_mb;
        if used > limit {
            violations.push(Violation {
                resource: QuotaResource::Memory,
                used,
                limit,
                severity: memory_severity(used / limit),
            });
        }
    }

    if let Some(limit) = limits.max_threads {
        if snapshot.threads > limit {
            violations.push(Violation {
                resource: QuotaResource::Threads,
                used: snapshot.threads as f64,
                limit: limit as f64,
                severity: Severity::Medium,
            });
        }
    }

    if let Some(limit) = limits.max_runtime {
        let elapsed = snapshot.runtime_at(now);
        if elapsed > limit {
            violations.push(Violation {
                resource: QuotaResource::Runtime,
                used: elapsed.as_secs_f64(),
                limit: limit.as_secs_f64(),
                severity: Severity::High,
            });
        }
    }

    violations
}

pub fn cpu_severity(ratio: f64) -> Severity {
    if ratio >= CPU_CRITICAL_RATIO {
        Severity::Critical
    } else if ratio >= CPU_HIGH_RATIO {
        Severity::High
    } else {
        Severity::Medium
    }
}

/// Both memory bands start at the same ratio, so memory is never `High`
pub fn memory_severity(ratio: f64) -> Severity {
    if ratio >= MEMORY_CRITICAL_RATIO {
        Severity::Critical
    } else if ratio >= MEMORY_HIGH_RATIO {
        Severity::High
    } else {
        Severity::Medium
    }
}
