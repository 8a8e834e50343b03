/*!
 * Monitoring
 * Structured tracing and lossy event queues
 */

pub mod streaming;
mod tracer;

pub use streaming::{EventQueue, StreamStats, Subscriber};
pub use tracer::{init_tracing, OperationSpan};
