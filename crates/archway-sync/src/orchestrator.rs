//! Sync orchestrator - the per-batch protocol state machine
//!
//! `RESOLVE_PATHS -> CONNECT -> ENSURE_TARGET_DIR -> PRE_HANDOFF ->
//! TRANSFER -> POST_HANDOFF -> RECORD`. A failing step aborts the remaining
//! steps for that batch; the batch is handled at most once, and a later
//! event covering the same files retries implicitly. Completed remote side
//! effects are never rolled back.

use std::sync::Arc;

use chrono::Local;
use tracing::{error, info, warn};

use archway_core::config::Config;
use archway_core::domain::{
    resolve_sync_paths, PathTemplate, SyncBatch, SyncError, TransferResult,
};
use archway_core::ports::FaultReporter;
use archway_stats::StatisticsRecorder;

use crate::remote::{ensure_target_dir, handoff_command};
use crate::rsync::{parse_stats, run_rsync, TransferTotals};
use crate::session::{RemoteSession, RemoteShell};

/// Executes the remote protocol for settled batches.
///
/// Everything here is blocking (`ssh2`, the rsync child process) and must
/// run on a blocking task, never on the event-dispatch thread. Batches from
/// different directories may be processed concurrently; batches from one
/// directory are naturally serialized by the one-timer-per-node rule.
pub struct SyncOrchestrator {
    config: Arc<Config>,
    source_template: PathTemplate,
    target_template: PathTemplate,
    recorder: Arc<StatisticsRecorder>,
    faults: Arc<dyn FaultReporter>,
}

impl SyncOrchestrator {
    pub fn new(
        config: Arc<Config>,
        recorder: Arc<StatisticsRecorder>,
        faults: Arc<dyn FaultReporter>,
    ) -> Self {
        let source_template = config.source_template();
        let target_template = config.target_template();
        Self {
            config,
            source_template,
            target_template,
            recorder,
            faults,
        }
    }

    /// Consumes one batch: runs the protocol and records the result.
    ///
    /// Failures are logged and forwarded to the fault reporter; they never
    /// propagate, so one broken batch cannot take the daemon down.
    pub fn process(&self, batch: SyncBatch) {
        match self.run_protocol(&batch) {
            Ok(result) => {
                info!(
                    source = %result.source,
                    target = %result.target,
                    files_transferred = result.files_transferred,
                    "batch transferred"
                );
                if let Err(err) = self.recorder.record(&result) {
                    warn!(error = %err, "could not record transfer statistics");
                }
            }
            Err(err) => {
                error!(dir = %batch.dir.display(), error = %err, "batch aborted");
                self.faults.report("sync", &err);
            }
        }
    }

    fn run_protocol(&self, batch: &SyncBatch) -> Result<TransferResult, SyncError> {
        let triggered = batch.dir.to_string_lossy();

        // RESOLVE_PATHS
        let (source, target) = resolve_sync_paths(
            &self.source_template,
            &self.target_template,
            &triggered,
        )?;
        info!(%source, %target, files = batch.files.len(), "processing batch");

        // CONNECT
        let mut session = RemoteSession::connect(&self.config.target)?;

        // ENSURE_TARGET_DIR
        ensure_target_dir(&mut session, &target, &self.config.target)?;

        // PRE_HANDOFF: hand the target to the transfer login account so the
        // transfer can write regardless of the final ownership
        let login = self.config.target.user.as_str();
        session.exec_checked(&handoff_command(&target, login, login, &self.config.target))?;

        // TRANSFER
        let summary = run_rsync(
            &source,
            &target,
            &batch.files,
            &self.config.target,
            &self.config.rsync,
        )?;
        let totals = match parse_stats(&summary) {
            Ok(totals) => totals,
            Err(err) => {
                warn!(error = %err, "could not read the transfer statistics");
                TransferTotals::default()
            }
        };

        // POST_HANDOFF: revert to the configured archive ownership
        session.exec_checked(&handoff_command(
            &target,
            &self.config.target.owner,
            &self.config.target.group,
            &self.config.target,
        ))?;

        Ok(TransferResult {
            files_total: totals.files_total,
            files_transferred: totals.files_transferred,
            bytes_total: totals.bytes_total,
            bytes_transferred: totals.bytes_transferred,
            source,
            target,
            timestamp: Local::now(),
        })
    }
}
