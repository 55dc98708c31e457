//! Batch dispatch port (driven/secondary port)
//!
//! The watch tree hands every settled [`SyncBatch`] to a `BatchDispatcher`.
//! The production implementation schedules the remote sync protocol on a
//! blocking task; tests substitute a recorder to observe exactly which
//! batches the tree produced.

use crate::domain::SyncBatch;

/// Accepts batches for asynchronous processing.
///
/// `dispatch` must return promptly: it is called from the event-dispatch
/// task and from aggregation timers, and must only *schedule* work, never
/// run the remote protocol inline.
pub trait BatchDispatcher: Send + Sync {
    /// Takes ownership of one batch. Ordering is only defined per directory
    /// (a node has at most one pending batch at a time); batches from
    /// different directories may be processed concurrently.
    fn dispatch(&self, batch: SyncBatch);
}
