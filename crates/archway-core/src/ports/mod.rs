//! Port definitions (trait seams between the core and the outer crates).

pub mod dispatch;
pub mod fault;

pub use dispatch::BatchDispatcher;
pub use fault::{FaultReporter, LogFaultReporter};
