//! Statistics filename template
//!
//! The statistics log filename may contain `${year}`, `${month}` and
//! `${day}` placeholders. Which placeholders are present decides both the
//! filename and when an open log has to be rotated: the log is reopened as
//! soon as any *enabled* date component differs from the date captured when
//! the file was opened.

use std::path::PathBuf;

use chrono::{Datelike, NaiveDate};

use crate::domain::errors::ConfigError;

/// A statistics filename template with its enabled date components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsFileTemplate {
    raw: String,
    has_year: bool,
    has_month: bool,
    has_day: bool,
}

impl StatsFileTemplate {
    /// Parses a filename template, recording which date placeholders it uses.
    pub fn parse(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            has_year: raw.contains("${year}"),
            has_month: raw.contains("${month}"),
            has_day: raw.contains("${day}"),
        }
    }

    /// Rejects ambiguous combinations: a `${day}` only makes sense together
    /// with `${month}` and `${year}`, and a `${month}` only together with
    /// `${year}`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if (self.has_day && !(self.has_month && self.has_year))
            || (self.has_month && !self.has_year)
        {
            return Err(ConfigError::AmbiguousStatsTemplate);
        }
        Ok(())
    }

    /// Builds the concrete filename for `date`, substituting only the
    /// placeholders the template actually contains.
    pub fn filename_for(&self, date: NaiveDate) -> PathBuf {
        let name = self
            .raw
            .replace("${year}", &date.year().to_string())
            .replace("${month}", &date.month().to_string())
            .replace("${day}", &date.day().to_string());
        PathBuf::from(name)
    }

    /// True when any enabled date component of `today` differs from the one
    /// captured when the current log was `opened`. This is the only rotation
    /// trigger.
    pub fn rotation_due(&self, opened: NaiveDate, today: NaiveDate) -> bool {
        (self.has_year && opened.year() != today.year())
            || (self.has_month && opened.month() != today.month())
            || (self.has_day && opened.day() != today.day())
    }
}
