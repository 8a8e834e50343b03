/*!
 * Quota Traits
 * Process control capability used for enforcement
 */

use crate::core::errors::ControlResult;
use crate::core::types::Pid;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Signals the governor sends to processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessSignal {
    /// Graceful termination request (SIGTERM)
    Terminate,
    /// Cooperative stop that the process may handle (SIGTSTP)
    Throttle,
}

impl fmt::Display for ProcessSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProcessSignal::Terminate => "SIGTERM",
            ProcessSignal::Throttle => "SIGTSTP",
        })
    }
}

/// Write access to operating-system processes
pub trait ProcessController: Send + Sync {
    /// Deliver `signal` to `pid`
    fn signal(&self, pid: Pid, signal: ProcessSignal) -> ControlResult<()>;

    /// Request graceful termination
    fn terminate(&self, pid: Pid) -> ControlResult<()> {
        self.signal(pid, ProcessSignal::Terminate)
    }
}
