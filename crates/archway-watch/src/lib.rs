//! Archway Watch - dynamic directory-watch tree and event aggregation
//!
//! Keeps OS-level directory watches synchronized with an evolving directory
//! hierarchy and coalesces rapid file-close events into per-directory
//! batches:
//!
//! ```text
//! inotify
//!    │
//!    ▼
//! WatchProvider ──→ mpsc::channel ──→ WatchTree/Node ──→ AggregationScheduler
//!                                                              │
//!                                                        BatchDispatcher
//! ```
//!
//! The OS watch facility is abstracted behind the [`WatchProvider`] trait so
//! the tree logic can be driven by a fake provider in tests.

pub mod provider;
pub mod scheduler;
pub mod tree;

pub use provider::{FsEvent, NotifyProvider, WatchHandle, WatchProvider};
pub use scheduler::{AggregationScheduler, AggregationTimer};
pub use tree::WatchTree;
