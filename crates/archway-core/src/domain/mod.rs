//! Domain types for the archiver core.

pub mod batch;
pub mod errors;
pub mod stats_template;
pub mod template;

pub use batch::{SyncBatch, TransferResult};
pub use errors::{ConfigError, ResolveError, SyncError, WatchError};
pub use stats_template::StatsFileTemplate;
pub use template::{resolve_sync_paths, PathTemplate, Segment};
