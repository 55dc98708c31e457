//! Batch and result types flowing between the watch tree, the orchestrator
//! and the statistics recorder.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// The set of file names aggregated from one directory within one debounce
/// window, transferred together.
///
/// A batch is never empty: [`SyncBatch::new`] refuses an empty file list, so
/// the scheduler cannot dispatch one. Each batch is consumed exactly once by
/// the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncBatch {
    /// The directory the close-write events were observed in
    pub dir: PathBuf,
    /// Relative file names within `dir`, in arrival order
    pub files: Vec<String>,
}

impl SyncBatch {
    /// Creates a batch, or `None` when `files` is empty.
    pub fn new(dir: PathBuf, files: Vec<String>) -> Option<Self> {
        if files.is_empty() {
            None
        } else {
            Some(Self { dir, files })
        }
    }
}

/// Outcome of one completed (or partially completed) batch transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    /// Total number of files the transfer tool considered
    pub files_total: u64,
    /// Number of files actually copied
    pub files_transferred: u64,
    /// Total size of all considered files in bytes
    pub bytes_total: u64,
    /// Bytes actually copied
    pub bytes_transferred: u64,
    /// Resolved source directory (trailing slash)
    pub source: String,
    /// Resolved target directory (trailing slash)
    pub target: String,
    /// When the batch finished
    pub timestamp: DateTime<Local>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_rejects_empty_file_list() {
        assert!(SyncBatch::new(PathBuf::from("/data/raw"), vec![]).is_none());
    }

    #[test]
    fn test_batch_preserves_file_order() {
        let batch = SyncBatch::new(
            PathBuf::from("/data/raw"),
            vec!["b.tif".to_string(), "a.tif".to_string()],
        )
        .unwrap();
        assert_eq!(batch.files, vec!["b.tif", "a.tif"]);
    }
}
