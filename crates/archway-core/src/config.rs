//! Configuration module for Archway.
//!
//! Typed structs that map to the YAML configuration file, with loading and
//! startup validation. The configuration is constructed once at startup and
//! passed by reference (or `Arc`) into each component; there is no global
//! configuration state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::template::validate_templates;
use crate::domain::{ConfigError, PathTemplate, StatsFileTemplate};

/// Top-level configuration for the archiver daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub target: TargetConfig,
    #[serde(default)]
    pub rsync: RsyncConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    pub statistics: StatisticsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The watched side: where the instrument writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Root directory the watch tree is built from.
    pub watch: PathBuf,
    /// Source folder template, e.g. `/data/${year}/${cycle}/raw`.
    pub folder: String,
}

/// The archive side: where batches are shipped to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Archive host name or address.
    pub host: String,
    /// SSH port on the archive host.
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// Login account used for remote commands and the transfer itself.
    pub user: String,
    /// Target folder template, e.g. `/archive/${cycle}/${year}`.
    pub folder: String,
    /// Final owner of archived directories.
    pub owner: String,
    /// Final group of archived directories.
    pub group: String,
    /// Permission bits applied to archived directories, e.g. `"0750"`.
    pub permission: String,
    /// Whether remote commands need a `sudo` prefix.
    #[serde(default)]
    pub sudo: bool,
}

/// Flags passed through to the transfer tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RsyncConfig {
    /// Compress data in transit (`-z`).
    #[serde(default)]
    pub compress: bool,
    /// Use checksum-based difference detection (`-c`).
    #[serde(default)]
    pub checksum: bool,
    /// Patterns passed as `--exclude=` flags.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Event aggregation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Filename exclusion regex; empty disables exclusion.
    #[serde(default)]
    pub exclude: String,
    /// Aggregation window in seconds; zero dispatches immediately.
    #[serde(default)]
    pub delay: u64,
}

/// Statistics log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsConfig {
    /// Log filename template, optionally with `${year}`/`${month}`/`${day}`.
    pub file: String,
    /// Flush and sync the log every N records.
    #[serde(default = "default_flush_frequency")]
    pub frequency: u32,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn default_ssh_port() -> u16 {
    22
}

fn default_flush_frequency() -> u32 {
    10
}

impl Config {
    /// Loads the configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Unreadable {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Validates everything that must hold before the watch tree is built.
    ///
    /// Checks, in order: the watch root exists, the exclusion pattern
    /// compiles, every target placeholder is declared in the source
    /// template, and the statistics filename template is unambiguous.
    /// Any failure is fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.source.watch.is_dir() {
            return Err(ConfigError::WatchRootMissing(self.source.watch.clone()));
        }
        self.exclude_regex()?;
        validate_templates(&self.source_template(), &self.target_template())?;
        self.stats_template().validate()?;
        Ok(())
    }

    /// The parsed source folder template.
    pub fn source_template(&self) -> PathTemplate {
        PathTemplate::parse(&self.source.folder)
    }

    /// The parsed target folder template.
    pub fn target_template(&self) -> PathTemplate {
        PathTemplate::parse(&self.target.folder)
    }

    /// The parsed statistics filename template.
    pub fn stats_template(&self) -> StatsFileTemplate {
        StatsFileTemplate::parse(&self.statistics.file)
    }

    /// The compiled filename exclusion pattern, `None` when disabled.
    pub fn exclude_regex(&self) -> Result<Option<Regex>, ConfigError> {
        if self.watch.exclude.is_empty() {
            return Ok(None);
        }
        Regex::new(&self.watch.exclude)
            .map(Some)
            .map_err(|e| ConfigError::InvalidExcludePattern {
                pattern: self.watch.exclude.clone(),
                message: e.to_string(),
            })
    }

    /// The aggregation window.
    pub fn aggregation_delay(&self) -> Duration {
        Duration::from_secs(self.watch.delay)
    }
}
