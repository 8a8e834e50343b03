/*!
 * Signal Controller
 * Process control through POSIX signals
 */

use super::traits::{ProcessController, ProcessSignal};
use crate::core::errors::{ControlError, ControlResult};
use crate::core::types::Pid;
use tracing::debug;

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{kill, Signal as UnixSignal};
#[cfg(unix)]
use nix::unistd::Pid as NixPid;

/// Controller backed by `kill(2)`
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalController;

impl SignalController {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
impl ProcessController for SignalController {
    fn signal(&self, pid: Pid, signal: ProcessSignal) -> ControlResult<()> {
        // kill(2) treats 0 as the caller's process group
        let raw = i32::try_from(pid)
            .ok()
            .filter(|raw| *raw > 0)
            .ok_or(ControlError::NotFound(pid))?;
        let unix_signal = match signal {
            ProcessSignal::Terminate => UnixSignal::SIGTERM,
            ProcessSignal::Throttle => UnixSignal::SIGTSTP,
        };

        match kill(NixPid::from_raw(raw), unix_signal) {
            Ok(()) => {
                debug!(pid, %signal, "signal delivered");
                Ok(())
            }
            Err(Errno::ESRCH) => Err(ControlError::NotFound(pid)),
            Err(e) => Err(ControlError::SignalFailed {
                pid,
                signal: signal.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(not(unix))]
impl ProcessController for SignalController {
    fn signal(&self, pid: Pid, signal: ProcessSignal) -> ControlResult<()> {
        debug!(pid, %signal, "signals not supported on this platform");
        Err(ControlError::Unsupported(format!("send {}", signal)))
    }
}
