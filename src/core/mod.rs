/*!
 * Core
 * Shared types, errors, limits, serde helpers, and shutdown plumbing
 */

pub mod errors;
pub mod limits;
pub mod serde;
pub mod shutdown;
pub mod types;

pub use errors::*;
pub use shutdown::ShutdownGroup;
pub use types::*;
