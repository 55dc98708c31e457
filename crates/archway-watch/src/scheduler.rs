//! Aggregation scheduler - per-directory debounce timers
//!
//! Every watched directory coalesces its file-close events into one batch
//! per aggregation window. The scheduler owns the timer mechanics: it spawns
//! one cancellable task per armed window, and on expiry atomically drains
//! the node's pending list and hands the batch to the configured
//! [`BatchDispatcher`]. A zero delay skips the timer entirely and dispatches
//! on the triggering event.
//!
//! The pending list is the only state shared between the event-dispatch
//! path and a timer task; both sides go through the same per-node mutex.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use archway_core::domain::SyncBatch;
use archway_core::ports::BatchDispatcher;

/// Per-node pending file names, shared between the dispatch path and the
/// node's timer task.
pub(crate) type PendingList = Arc<Mutex<Vec<String>>>;

/// Atomically snapshots and clears a pending list.
pub(crate) fn drain_pending(pending: &PendingList) -> Vec<String> {
    let mut guard = pending.lock().unwrap_or_else(|e| e.into_inner());
    std::mem::take(&mut *guard)
}

/// Spawns and tracks aggregation timers for the whole tree.
pub struct AggregationScheduler {
    delay: Duration,
    dispatcher: Arc<dyn BatchDispatcher>,
}

/// One armed aggregation window.
///
/// The node keeps at most one of these; while it is alive all further file
/// events for the node are absorbed into the same pending list.
pub struct AggregationTimer {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl AggregationTimer {
    /// True until the timer fired (or was cancelled) and its task finished.
    pub fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancels the window before it fires. A timer that already fired and is
    /// mid-dispatch completes; cancellation never aborts in-flight
    /// orchestration.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl AggregationScheduler {
    pub fn new(delay: Duration, dispatcher: Arc<dyn BatchDispatcher>) -> Self {
        Self { delay, dispatcher }
    }

    /// True when the configured delay is zero and events dispatch inline.
    pub fn immediate(&self) -> bool {
        self.delay.is_zero()
    }

    /// Arms one aggregation window for `dir`.
    ///
    /// After the delay the pending list is drained under its mutex; a
    /// non-empty snapshot becomes a [`SyncBatch`] and goes to the
    /// dispatcher. An empty snapshot is a no-op, so an empty batch can never
    /// be dispatched.
    pub fn schedule(&self, dir: PathBuf, pending: PendingList) -> AggregationTimer {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let dispatcher = Arc::clone(&self.dispatcher);
        let delay = self.delay;

        let task = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(dir = %dir.display(), "aggregation window cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    match SyncBatch::new(dir.clone(), drain_pending(&pending)) {
                        Some(batch) => dispatcher.dispatch(batch),
                        None => debug!(
                            dir = %dir.display(),
                            "aggregation window expired with nothing pending"
                        ),
                    }
                }
            }
        });

        AggregationTimer { cancel, task }
    }

    /// Zero-delay path: drains and dispatches synchronously on the
    /// triggering event.
    pub fn dispatch_now(&self, dir: &Path, pending: &PendingList) {
        if let Some(batch) = SyncBatch::new(dir.to_path_buf(), drain_pending(pending)) {
            self.dispatcher.dispatch(batch);
        }
    }
}
