/*!
 * Governor
 * Wires the collector, quota manager, and task manager to one root
 * cancellation token
 */

use crate::config::GovernorConfig;
use crate::core::errors::ConfigResult;
use crate::quota::{ProcessController, QuotaManager, SignalController};
use crate::resources::{ProcessInspector, ResourceCollector, SysinfoInspector};
use crate::tasks::{CommandSpawner, ProcessSpawner, TaskManager};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct Governor {
    collector: Arc<ResourceCollector>,
    quotas: Arc<QuotaManager>,
    tasks: TaskManager,
    root: CancellationToken,
    shutdown_grace: Duration,
}

impl Governor {
    /// Build with the OS-backed inspector, controller, and spawner
    pub fn new(config: GovernorConfig) -> ConfigResult<Self> {
        Self::with_capabilities(
            config,
            Arc::new(SysinfoInspector::new()),
            Arc::new(SignalController::new()),
            Arc::new(CommandSpawner::new()),
        )
    }

    pub fn with_capabilities(
        config: GovernorConfig,
        inspector: Arc<dyn ProcessInspector>,
        controller: Arc<dyn ProcessController>,
        spawner: Arc<dyn ProcessSpawner>,
    ) -> ConfigResult<Self> {
        config.validate()?;

        let collector = Arc::new(ResourceCollector::new(config.collector, inspector));
        let quotas = Arc::new(QuotaManager::new(
            config.quota,
            Arc::clone(&collector),
            controller,
        )?);
        let tasks = TaskManager::new(config.tasks, spawner)?;

        Ok(Self {
            collector,
            quotas,
            tasks,
            root: CancellationToken::new(),
            shutdown_grace: config.shutdown_grace,
        })
    }

    pub fn collector(&self) -> &Arc<ResourceCollector> {
        &self.collector
    }

    pub fn quotas(&self) -> &Arc<QuotaManager> {
        &self.quotas
    }

    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    /// Token cancelled by `shutdown`; parent of every background loop
    pub fn token(&self) -> CancellationToken {
        self.root.clone()
    }

    pub fn start(&self) {
        self.quotas.start(&self.root);
        self.tasks.start(&self.root);
        info!("Governor started");
    }

    /// Cancel everything and wait for both managers up to the grace period.
    /// Returns true if every background task finished in time.
    pub async fn shutdown(&self) -> bool {
        info!(grace_ms = self.shutdown_grace.as_millis() as u64, "Governor shutting down");
        let (tasks_clean, quotas_clean) = tokio::join!(
            self.tasks.stop(self.shutdown_grace),
            self.quotas.stop(self.shutdown_grace),
        );
        self.root.cancel();
        tasks_clean && quotas_clean
    }
}
