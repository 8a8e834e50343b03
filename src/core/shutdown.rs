/*!
 * Shutdown Group
 * Cancellation and tracking for one component's background tasks
 *
 * Each manager owns a group. `begin` binds the group to a child of the
 * caller's token, tracked tasks observe that token, and `shutdown` cancels it
 * and waits for every tracked task up to a grace period.
 */

use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

pub struct ShutdownGroup {
    name: &'static str,
    token: Mutex<Option<CancellationToken>>,
    tracker: TaskTracker,
}

impl ShutdownGroup {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            token: Mutex::new(None),
            tracker: TaskTracker::new(),
        }
    }

    /// Bind to a child of `parent`. Returns None when already running.
    pub fn begin(&self, parent: &CancellationToken) -> Option<CancellationToken> {
        let mut slot = self.token.lock();
        if slot.as_ref().is_some_and(|t| !t.is_cancelled()) {
            return None;
        }
        let token = parent.child_token();
        *slot = Some(token.clone());
        Some(token)
    }

    /// Token of the latest run. Stays cancelled after `shutdown` until the
    /// next `begin`; None before the first `begin`.
    pub fn token(&self) -> Option<CancellationToken> {
        self.token.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.token.lock().as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Cancel the group token without waiting
    pub fn cancel(&self) {
        if let Some(token) = self.token.lock().as_ref() {
            token.cancel();
        }
    }

    /// Spawn a tracked task; `shutdown` waits for it
    pub fn spawn<F>(&self, task: &'static str, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        debug!(group = self.name, task, "spawning tracked task");
        self.tracker.spawn(future)
    }

    /// Cancel the group token and wait for tracked tasks.
    /// Returns true if every task finished within `grace`.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.cancel();
        self.tracker.close();

        let active = self.tracker.len();
        let clean = tokio::select! {
            _ = self.tracker.wait() => true,
            _ = tokio::time::sleep(grace) => false,
        };
        self.tracker.reopen();

        if clean {
            info!(group = self.name, "background tasks stopped");
        } else {
            warn!(
                group = self.name,
                grace_ms = grace.as_millis() as u64,
                waited_on = active,
                still_active = self.tracker.len(),
                "grace period elapsed with tasks still running"
            );
        }
        clean
    }
}
