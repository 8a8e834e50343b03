/*!
 * Quota
 * Resource quotas, violation classification, and enforcement
 */

mod control;
mod evaluate;
mod manager;
pub mod traits;
pub mod types;

pub use control::SignalController;
pub use evaluate::{cpu_severity, evaluate, memory_severity};
pub use manager::QuotaManager;
pub use traits::{ProcessController, ProcessSignal};
pub use types::{
    Quota, QuotaAction, QuotaConfig, QuotaDefinition, QuotaEvent, QuotaEventType, QuotaLimits,
    QuotaResource, QuotaStats, Severity, Violation,
};
