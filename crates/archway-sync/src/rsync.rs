//! Transfer invocation and statistics parsing
//!
//! Runs `rsync` in archive mode over ssh, restricted to exactly the batch's
//! file names (fed newline-joined through stdin via `--files-from=-`), and
//! parses the `--stats` summary. A summary that cannot be parsed does not
//! fail the batch; the caller records zeroed totals instead.

use std::io::Write;
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::debug;

use archway_core::config::{RsyncConfig, TargetConfig};
use archway_core::domain::SyncError;

/// Counters extracted from the transfer summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferTotals {
    pub files_total: u64,
    pub files_transferred: u64,
    pub bytes_total: u64,
    pub bytes_transferred: u64,
}

/// The `--stats` summary was missing or unreadable. Non-fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("transfer summary is missing '{0}'")]
pub struct StatsParseError(pub &'static str);

/// The short-option bundle: archive mode plus optional compression and
/// checksum-based difference detection.
fn rsync_options(rsync: &RsyncConfig) -> String {
    let mut options = String::from("-a");
    if rsync.compress {
        options.push('z');
    }
    if rsync.checksum {
        options.push('c');
    }
    options
}

/// Full argument list for one batch transfer.
fn rsync_args(
    source: &str,
    target_dir: &str,
    target: &TargetConfig,
    rsync: &RsyncConfig,
) -> Vec<String> {
    let mut args = vec![rsync_options(rsync), "--files-from=-".to_string()];
    for pattern in &rsync.exclude {
        args.push(format!("--exclude={pattern}"));
    }
    args.push("--stats".to_string());
    args.push("-e".to_string());
    args.push("ssh".to_string());
    args.push(source.to_string());
    args.push(format!("{}@{}:{}", target.user, target.host, target_dir));
    args
}

/// TRANSFER: invokes rsync with the batch's file list on stdin and returns
/// its stdout. Anything on stderr fails the batch.
pub(crate) fn run_rsync(
    source: &str,
    target_dir: &str,
    files: &[String],
    target: &TargetConfig,
    rsync: &RsyncConfig,
) -> Result<String, SyncError> {
    let args = rsync_args(source, target_dir, target, rsync);
    debug!(?args, files = files.len(), "invoking rsync");

    let mut child = Command::new("rsync")
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| SyncError::Transfer(format!("could not start rsync: {e}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(files.join("\n").as_bytes())
            .map_err(|e| SyncError::Transfer(format!("could not write file list: {e}")))?;
        // dropping stdin closes the pipe and lets rsync proceed
    }

    let output = child
        .wait_with_output()
        .map_err(|e| SyncError::Transfer(e.to_string()))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        return Err(SyncError::Transfer(stderr.trim().to_string()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Extracts the four counters from the `--stats` summary.
///
/// The total file count is adjusted down by one for the implicit top-level
/// directory entry rsync always reports.
pub(crate) fn parse_stats(output: &str) -> Result<TransferTotals, StatsParseError> {
    let mut files_total = None;
    let mut files_transferred = None;
    let mut bytes_total = None;
    let mut bytes_transferred = None;

    for line in output.lines() {
        if line.starts_with("Number of files transferred:") {
            files_transferred = nth_count(line, 4);
        } else if line.starts_with("Number of files:") {
            files_total = nth_count(line, 3).map(|n| n.saturating_sub(1));
        } else if line.starts_with("Total transferred file size:") {
            bytes_transferred = nth_count(line, 4);
        } else if line.starts_with("Total file size:") {
            bytes_total = nth_count(line, 3);
        }
    }

    Ok(TransferTotals {
        files_total: files_total.ok_or(StatsParseError("Number of files"))?,
        files_transferred: files_transferred
            .ok_or(StatsParseError("Number of files transferred"))?,
        bytes_total: bytes_total.ok_or(StatsParseError("Total file size"))?,
        bytes_transferred: bytes_transferred
            .ok_or(StatsParseError("Total transferred file size"))?,
    })
}

/// Parses the n-th whitespace token of a summary line, tolerating rsync's
/// thousands separators.
fn nth_count(line: &str, n: usize) -> Option<u64> {
    line.split_whitespace().nth(n)?.replace(',', "").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUMMARY: &str = "\
Number of files: 11
Number of files transferred: 4
Total file size: 88000 bytes
Total transferred file size: 9000 bytes
Literal data: 9000 bytes
Matched data: 0 bytes
";

    #[test]
    fn test_parse_summary_counters() {
        let totals = parse_stats(SUMMARY).unwrap();
        assert_eq!(
            totals,
            TransferTotals {
                // the implicit top-level directory entry is not counted
                files_total: 10,
                files_transferred: 4,
                bytes_total: 88000,
                bytes_transferred: 9000,
            }
        );
    }

    #[test]
    fn test_parse_tolerates_thousands_separators() {
        let summary = "\
Number of files: 1,417
Number of files transferred: 1,000
Total file size: 2,500,000 bytes
Total transferred file size: 1,200,000 bytes
";
        let totals = parse_stats(summary).unwrap();
        assert_eq!(totals.files_total, 1416);
        assert_eq!(totals.bytes_total, 2_500_000);
    }

    #[test]
    fn test_parse_missing_line_is_an_error() {
        let err = parse_stats("Number of files: 11\n").unwrap_err();
        assert_eq!(err, StatsParseError("Number of files transferred"));
    }

    #[test]
    fn test_parse_garbage_is_an_error() {
        assert!(parse_stats("rsync: some unrelated output\n").is_err());
    }

    fn target() -> TargetConfig {
        TargetConfig {
            host: "archive.example.org".to_string(),
            port: 22,
            user: "saxsarch".to_string(),
            folder: "/archive/${cycle}/${year}".to_string(),
            owner: "archive".to_string(),
            group: "beamline".to_string(),
            permission: "0750".to_string(),
            sudo: true,
        }
    }

    #[test]
    fn test_rsync_args_shape() {
        let rsync = RsyncConfig {
            compress: true,
            checksum: false,
            exclude: vec!["*.tmp".to_string(), "*.lock".to_string()],
        };
        let args = rsync_args(
            "/data/2024/EPN001/raw/",
            "/archive/EPN001/2024/",
            &target(),
            &rsync,
        );
        assert_eq!(
            args,
            vec![
                "-az",
                "--files-from=-",
                "--exclude=*.tmp",
                "--exclude=*.lock",
                "--stats",
                "-e",
                "ssh",
                "/data/2024/EPN001/raw/",
                "saxsarch@archive.example.org:/archive/EPN001/2024/",
            ]
        );
    }

    #[test]
    fn test_rsync_options_bundle() {
        let mut rsync = RsyncConfig::default();
        assert_eq!(rsync_options(&rsync), "-a");
        rsync.compress = true;
        rsync.checksum = true;
        assert_eq!(rsync_options(&rsync), "-azc");
    }
}
