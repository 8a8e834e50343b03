/*!
 * procgov daemon
 * Runs the governor until interrupted
 */

use miette::IntoDiagnostic;
use procgov::{init_tracing, Governor, GovernorConfig};
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> miette::Result<()> {
    init_tracing();
    info!(version = env!("CARGO_PKG_VERSION"), "procgov starting");

    let config = GovernorConfig::load()?;
    info!(
        quotas = config.quota.quotas.len(),
        max_concurrent = config.tasks.max_concurrent,
        log_dir = %config.tasks.log_dir.display(),
        "configuration ready"
    );

    let governor = Governor::new(config.clone())?;
    governor.start();

    let mut ticker = interval(config.collector.collection_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    error!(error = %e, "failed to listen for interrupt, shutting down");
                }
                break;
            }
            _ = ticker.tick() => {
                let collector = Arc::clone(governor.collector());
                let snapshot = tokio::task::spawn_blocking(move || collector.collect_system())
                    .await
                    .into_diagnostic()?;
                match snapshot {
                    Ok(system) => info!(
                        cpu_percent = system.cpu_percent,
                        memory_percent = system.memory_percent,
                        processes = system.process_count,
                        performance_score = system.performance_score,
                        health = ?system.health,
                        running_tasks = governor.tasks().running_count(),
                        "system snapshot"
                    ),
                    Err(e) => warn!(error = %e, "system snapshot failed"),
                }
            }
        }
    }

    info!("interrupt received");
    if governor.shutdown().await {
        info!("procgov stopped");
    } else {
        warn!("procgov stopped with background tasks still running");
    }
    Ok(())
}
