/*!
 * Core Types
 * Common types used across the governor
 */

/// Operating-system process ID
pub type Pid = u32;

/// Task priority (0-255, higher is more important)
pub type Priority = u8;

/// Task identifier
pub type TaskId = String;

/// Bytes to mebibytes
#[inline]
pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// Bytes to kibibytes
#[inline]
pub fn bytes_to_kb(bytes: u64) -> f64 {
    bytes as f64 / 1024.0
}
