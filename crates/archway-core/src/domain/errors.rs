//! Domain error types
//!
//! One enum per failure scope. `ConfigError` is the only error that is fatal
//! to the process; everything else is scoped to a single watch node or a
//! single sync batch and never stops the watch loop.

use std::path::PathBuf;

use thiserror::Error;

/// Errors found while validating the configuration at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read or parsed
    #[error("cannot read configuration file '{path}': {message}")]
    Unreadable {
        /// Path that was attempted
        path: PathBuf,
        /// Underlying parse or I/O message
        message: String,
    },

    /// The configured watch root does not exist or is not a directory
    #[error("the watch folder '{0}' does not exist")]
    WatchRootMissing(PathBuf),

    /// A target-template placeholder has no counterpart in the source template
    #[error("placeholder '${{{0}}}' in the target folder is not declared in the source folder")]
    UnknownTargetPlaceholder(String),

    /// The filename exclusion pattern is not a valid regular expression
    #[error("invalid exclusion pattern '{pattern}': {message}")]
    InvalidExcludePattern {
        /// The pattern as configured
        pattern: String,
        /// Regex compiler message
        message: String,
    },

    /// The statistics filename template mixes date placeholders ambiguously
    #[error(
        "the statistics filename must contain either no date placeholders or a \
         non-ambiguous combination of '${{day}}', '${{month}}' and '${{year}}'"
    )]
    AmbiguousStatsTemplate,
}

/// Errors from the OS watch facility. Degrades one node, never the tree.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WatchError {
    /// Adding a watch failed (missing path, permissions, watch limit)
    #[error("could not add watch for '{path}': {message}")]
    AddFailed {
        /// Directory the watch was requested for
        path: PathBuf,
        /// Message from the watch backend
        message: String,
    },

    /// Removing a watch failed
    #[error("could not remove watch for '{path}': {message}")]
    RemoveFailed {
        /// Directory the watch belonged to
        path: PathBuf,
        /// Message from the watch backend
        message: String,
    },
}

/// Errors from matching a triggered path against the path templates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The triggered path is inconsistent with the source template: a literal
    /// segment differs, or the path has fewer segments than the template.
    #[error("triggered path does not match the source folder template: {0}")]
    PathMismatch(String),

    /// A placeholder referenced by a template has no captured value
    #[error("no value captured for placeholder '${{{0}}}'")]
    MissingPlaceholder(String),
}

/// Errors from the remote sync protocol. Each aborts exactly one batch.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Path resolution failed before any remote work
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The remote host is unreachable or authentication failed
    #[error("cannot connect to '{host}': {message}")]
    Connection {
        /// `host:port` of the archive server
        host: String,
        /// Underlying transport or authentication message
        message: String,
    },

    /// A remote shell step wrote to standard error
    #[error("remote command `{command}` failed: {stderr}")]
    RemoteCommand {
        /// The command that was executed
        command: String,
        /// What the remote side wrote to stderr
        stderr: String,
    },

    /// The transfer tool reported an error
    #[error("transfer failed: {0}")]
    Transfer(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::UnknownTargetPlaceholder("cycle".to_string());
        assert_eq!(
            err.to_string(),
            "placeholder '${cycle}' in the target folder is not declared in the source folder"
        );
    }

    #[test]
    fn test_resolve_error_display() {
        let err = ResolveError::MissingPlaceholder("year".to_string());
        assert_eq!(err.to_string(), "no value captured for placeholder '${year}'");
    }

    #[test]
    fn test_sync_error_wraps_resolve_error() {
        let err: SyncError = ResolveError::PathMismatch("/data/x".to_string()).into();
        assert!(matches!(err, SyncError::Resolve(_)));
    }

    #[test]
    fn test_remote_command_error_display() {
        let err = SyncError::RemoteCommand {
            command: "mkdir /archive/x".to_string(),
            stderr: "permission denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "remote command `mkdir /archive/x` failed: permission denied"
        );
    }
}
