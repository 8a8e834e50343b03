/*!
 * Quota Manager
 * Periodic quota checks and enforcement
 *
 * State is snapshotted under the read lock at the start of a cycle and no
 * lock is held across collection, signalling, or the restart delay.
 */

use super::evaluate::evaluate;
use super::traits::{ProcessController, ProcessSignal};
use super::types::{
    Quota, QuotaAction, QuotaConfig, QuotaEvent, QuotaEventType, QuotaLimits, QuotaStats, Violation,
};
use crate::core::errors::{CollectorError, ControlError, QuotaError, QuotaResult};
use crate::core::shutdown::ShutdownGroup;
use crate::core::types::Pid;
use crate::monitoring::{EventQueue, OperationSpan, Subscriber};
use crate::resources::ResourceCollector;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// Work for one quota in one cycle
struct CheckTarget {
    name: String,
    limits: QuotaLimits,
    action: QuotaAction,
    pids: Vec<Pid>,
}

pub struct QuotaManager {
    quotas: RwLock<BTreeMap<String, Quota>>,
    collector: Arc<ResourceCollector>,
    controller: Arc<dyn ProcessController>,
    events: EventQueue<QuotaEvent>,

    check_interval: Duration,
    default_action: QuotaAction,
    restart_delay: Duration,

    actions_taken: Mutex<BTreeMap<String, u64>>,
    checks_run: AtomicU64,
    last_check: Mutex<Option<SystemTime>>,

    background: ShutdownGroup,
}

impl QuotaManager {
    pub fn new(
        config: QuotaConfig,
        collector: Arc<ResourceCollector>,
        controller: Arc<dyn ProcessController>,
    ) -> QuotaResult<Self> {
        config.validate()?;

        let quotas: BTreeMap<String, Quota> = config
            .quotas
            .into_iter()
            .map(|definition| (definition.name.clone(), Quota::from_definition(definition)))
            .collect();

        info!(
            quotas = quotas.len(),
            check_interval_ms = config.check_interval.as_millis() as u64,
            default_action = %config.default_action,
            "Quota manager initialized"
        );

        Ok(Self {
            quotas: RwLock::new(quotas),
            collector,
            controller,
            events: EventQueue::new("quota_events", config.event_queue_size),
            check_interval: config.check_interval,
            default_action: config.default_action,
            restart_delay: config.restart_delay,
            actions_taken: Mutex::new(BTreeMap::new()),
            checks_run: AtomicU64::new(0),
            last_check: Mutex::new(None),
            background: ShutdownGroup::new("quota"),
        })
    }

    pub fn add_process_to_quota(&self, name: &str, pid: Pid) -> QuotaResult<()> {
        {
            let mut quotas = self.quotas.write();
            let quota = quotas
                .get_mut(name)
                .ok_or_else(|| QuotaError::QuotaNotFound(name.to_string()))?;
            if !quota.processes.insert(pid) {
                return Err(QuotaError::ProcessAlreadyTracked {
                    quota: name.to_string(),
                    pid,
                });
            }
        }

        info!(quota = name, pid, "process added to quota");
        self.emit(QuotaEvent::lifecycle(
            QuotaEventType::ProcessAdded,
            name,
            Some(pid),
            format!("process {} added to quota", pid),
        ));
        Ok(())
    }

    pub fn remove_process_from_quota(&self, name: &str, pid: Pid) -> QuotaResult<()> {
        {
            let mut quotas = self.quotas.write();
            let quota = quotas
                .get_mut(name)
                .ok_or_else(|| QuotaError::QuotaNotFound(name.to_string()))?;
            if !quota.processes.remove(&pid) {
                return Err(QuotaError::ProcessNotTracked {
                    quota: name.to_string(),
                    pid,
                });
            }
        }

        info!(quota = name, pid, "process removed from quota");
        self.emit(QuotaEvent::lifecycle(
            QuotaEventType::ProcessRemoved,
            name,
            Some(pid),
            format!("process {} removed from quota", pid),
        ));
        Ok(())
    }

    pub fn quota(&self, name: &str) -> Option<Quota> {
        self.quotas.read().get(name).cloned()
    }

    /// All quotas ordered by name
    pub fn quotas(&self) -> Vec<Quota> {
        self.quotas.read().values().cloned().collect()
    }

    pub fn stats(&self) -> QuotaStats {
        let quotas = self.quotas.read();
        QuotaStats {
            quotas: quotas.len(),
            active_quotas: quotas.values().filter(|q| q.active).count(),
            tracked_processes: quotas.values().map(|q| q.processes.len()).sum(),
            total_violations: quotas.values().map(|q| q.violations).sum(),
            violations_by_quota: quotas
                .values()
                .map(|q| (q.name.clone(), q.violations))
                .collect(),
            actions_taken: self.actions_taken.lock().clone(),
            checks_run: self.checks_run.load(Ordering::Relaxed),
            events_dropped: self.events.dropped(),
            last_check: *self.last_check.lock(),
        }
    }

    /// Consumer of the quota event queue
    pub fn subscribe(&self) -> Subscriber<QuotaEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.background.is_running()
    }

    /// Activate every quota and start the check loop under a child of `parent`.
    /// The first check runs one interval after start.
    pub fn start(self: &Arc<Self>, parent: &CancellationToken) {
        let Some(token) = self.background.begin(parent) else {
            warn!("quota manager already running");
            return;
        };

        let activated: Vec<String> = {
            let mut quotas = self.quotas.write();
            quotas
                .values_mut()
                .filter(|q| !q.active)
                .map(|q| {
                    q.active = true;
                    q.name.clone()
                })
                .collect()
        };
        for name in &activated {
            self.emit(QuotaEvent::lifecycle(
                QuotaEventType::QuotaActivated,
                name,
                None,
                "quota activated",
            ));
        }

        let manager = Arc::clone(self);
        self.background
            .spawn("quota_check_loop", run_check_loop(manager, token));
        info!(activated = activated.len(), "Quota manager started");
    }

    /// Deactivate every quota and stop the check loop.
    /// Returns false if the loop outlived `grace`.
    pub async fn stop(&self, grace: Duration) -> bool {
        let deactivated: Vec<String> = {
            let mut quotas = self.quotas.write();
            quotas
                .values_mut()
                .filter(|q| q.active)
                .map(|q| {
                    q.active = false;
                    q.name.clone()
                })
                .collect()
        };
        for name in &deactivated {
            self.emit(QuotaEvent::lifecycle(
                QuotaEventType::QuotaDeactivated,
                name,
                None,
                "quota deactivated",
            ));
        }

        let clean = self.background.shutdown(grace).await;
        info!(deactivated = deactivated.len(), clean, "Quota manager stopped");
        clean
    }

    /// Run one check cycle over every active quota
    pub async fn check_now(&self) {
        let mut op = OperationSpan::new("quota_check");
        let span = op.span().clone();
        let checked = self.check_cycle().instrument(span).await;
        op.record_items(checked);
    }

    async fn check_cycle(&self) -> usize {
        let targets: Vec<CheckTarget> = self
            .quotas
            .read()
            .values()
            .filter(|q| q.active)
            .map(|q| CheckTarget {
                name: q.name.clone(),
                limits: q.limits.clone(),
                action: q.action.unwrap_or(self.default_action),
                pids: q.processes.iter().copied().collect(),
            })
            .collect();

        let mut checked = 0usize;
        for target in &targets {
            let mut gone = BTreeSet::new();

            for &pid in &target.pids {
                checked += 1;
                let snapshot = match self.collector.collect_process(pid) {
                    Ok(snapshot) => snapshot,
                    Err(CollectorError::NotFound(_)) => {
                        gone.insert(pid);
                        continue;
                    }
                    Err(e) => {
                        warn!(quota = %target.name, pid, error = %e, "collection failed, skipping process this cycle");
                        continue;
                    }
                };

                let violations = evaluate(&target.limits, &snapshot, SystemTime::now());
                if violations.is_empty() {
                    continue;
                }

                if let Some(quota) = self.quotas.write().get_mut(&target.name) {
                    quota.violations += violations.len() as u64;
                }
                for violation in &violations {
                    warn!(
                        quota = %target.name,
                        pid,
                        resource = %violation.resource,
                        used = violation.used,
                        limit = violation.limit,
                        severity = %violation.severity,
                        "quota violation"
                    );
                    self.emit(QuotaEvent::violation(&target.name, pid, violation));
                }

                self.enforce(&target.name, pid, target.action, &violations).await;
            }

            let now = SystemTime::now();
            if let Some(quota) = self.quotas.write().get_mut(&target.name) {
                quota.processes.retain(|pid| !gone.contains(pid));
                quota.last_check = Some(now);
            }
            for pid in gone {
                debug!(quota = %target.name, pid, "process exited, no longer tracked");
            }
        }

        self.checks_run.fetch_add(1, Ordering::Relaxed);
        *self.last_check.lock() = Some(SystemTime::now());
        checked
    }

    /// Apply exactly one action for all of a process's violations in this cycle
    async fn enforce(&self, quota: &str, pid: Pid, action: QuotaAction, violations: &[Violation]) {
        let resources: Vec<String> = violations.iter().map(|v| v.resource.to_string()).collect();
        let resources = resources.join(",");

        let message = match action {
            QuotaAction::Warn => {
                warn!(quota, pid, resources = %resources, "quota exceeded");
                "warning logged".to_string()
            }
            QuotaAction::Notify => {
                info!(quota, pid, resources = %resources, notice = true, "quota notification");
                "notification logged".to_string()
            }
            QuotaAction::Throttle => match self.controller.signal(pid, ProcessSignal::Throttle) {
                Ok(()) => {
                    info!(quota, pid, "process throttled");
                    "throttle signal sent".to_string()
                }
                Err(ControlError::Unsupported(op)) => {
                    debug!(quota, pid, op = %op, "throttling unsupported, skipping");
                    "throttling unsupported on this platform".to_string()
                }
                Err(e) => {
                    warn!(quota, pid, error = %e, "throttle failed");
                    format!("throttle failed: {}", e)
                }
            },
            QuotaAction::Stop => match self.controller.terminate(pid) {
                Ok(()) => {
                    info!(quota, pid, "process terminated");
                    "process terminated".to_string()
                }
                Err(e) => {
                    warn!(quota, pid, error = %e, "terminate failed");
                    format!("terminate failed: {}", e)
                }
            },
            QuotaAction::Restart => match self.controller.terminate(pid) {
                Ok(()) => {
                    tokio::time::sleep(self.restart_delay).await;
                    info!(quota, pid, "process terminated for restart, relaunch left to its owner");
                    "process terminated for restart".to_string()
                }
                Err(e) => {
                    warn!(quota, pid, error = %e, "restart failed");
                    format!("restart failed: {}", e)
                }
            },
        };

        *self.actions_taken.lock().entry(action.to_string()).or_insert(0) += 1;
        self.emit(QuotaEvent::action_taken(quota, pid, action, message));
    }

    fn emit(&self, event: QuotaEvent) {
        self.events.publish(event);
    }
}

async fn run_check_loop(manager: Arc<QuotaManager>, token: CancellationToken) {
    let period = manager.check_interval;
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(period_ms = period.as_millis() as u64, "quota check loop started");
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => manager.check_now().await,
        }
    }
    info!("quota check loop stopped");
}
