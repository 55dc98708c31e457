//! Archway Sync - remote sync orchestration
//!
//! Executes the multi-step remote protocol for each batch the watch tree
//! settles:
//!
//! ```text
//! RESOLVE_PATHS -> CONNECT -> ENSURE_TARGET_DIR -> PRE_HANDOFF
//!               -> TRANSFER -> POST_HANDOFF -> RECORD
//! ```
//!
//! Remote shell steps run over an `ssh2` session with key-based
//! authentication; the bulk transfer is delegated to `rsync` over ssh with
//! an explicit file list. Any step's failure aborts the remaining steps for
//! that batch; there is no retry and no rollback of completed steps.

pub mod dispatch;
pub mod orchestrator;
pub mod remote;
pub mod rsync;
pub mod session;

pub use dispatch::OrchestratorDispatcher;
pub use orchestrator::SyncOrchestrator;
pub use session::{RemoteSession, RemoteShell};
