//! Production batch dispatcher
//!
//! Bridges the watch tree's [`BatchDispatcher`] port to the orchestrator:
//! every batch is moved onto a blocking task so the ssh session and the
//! rsync child process never run on the event-dispatch thread. Batches from
//! different directories run fully concurrently.

use std::sync::Arc;

use tracing::error;

use archway_core::domain::SyncBatch;
use archway_core::ports::BatchDispatcher;

use crate::orchestrator::SyncOrchestrator;

/// Dispatcher wired into the watch tree by the daemon.
pub struct OrchestratorDispatcher {
    orchestrator: Arc<SyncOrchestrator>,
}

impl OrchestratorDispatcher {
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

impl BatchDispatcher for OrchestratorDispatcher {
    fn dispatch(&self, batch: SyncBatch) {
        let orchestrator = Arc::clone(&self.orchestrator);
        let dir = batch.dir.clone();
        tokio::spawn(async move {
            let outcome =
                tokio::task::spawn_blocking(move || orchestrator.process(batch)).await;
            if let Err(err) = outcome {
                error!(dir = %dir.display(), error = %err, "sync task failed to run");
            }
        });
    }
}
