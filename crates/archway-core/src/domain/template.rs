//! Path templates and the source-to-target path resolver
//!
//! A [`PathTemplate`] is an ordered sequence of `/`-separated segments, each
//! either a literal string or a named `${placeholder}`. The watched source
//! hierarchy and the remote archive hierarchy are both described by such
//! templates; [`resolve_sync_paths`] maps a triggered directory to its
//! concrete source and target paths by extracting placeholder values from
//! the source side and substituting them on both sides.
//!
//! Matching is a prefix match: a triggered path may be deeper than the
//! source template, and the extra segments are carried over verbatim to both
//! resolved paths.

use std::collections::HashMap;

use crate::domain::errors::{ConfigError, ResolveError};

/// One segment of a path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// A fixed path component that must match exactly
    Literal(String),
    /// A named variable component, written `${name}` in configuration
    Placeholder(String),
}

/// An ordered sequence of literal and placeholder path segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parses a template string such as `/data/${year}/${cycle}/raw`.
    ///
    /// Every `/`-separated component that is wrapped in `${...}` becomes a
    /// [`Segment::Placeholder`]; everything else is a literal. Parsing never
    /// fails: a malformed placeholder is simply a literal that will not
    /// match anything sensible.
    pub fn parse(raw: &str) -> Self {
        let segments = raw
            .split('/')
            .map(|part| match placeholder_name(part) {
                Some(name) => Segment::Placeholder(name.to_string()),
                None => Segment::Literal(part.to_string()),
            })
            .collect();
        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    /// The template as it appeared in configuration.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of segments in the template.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True for a template parsed from an empty string.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Names of all placeholders, in template order.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Walks the template and a triggered path in lockstep, capturing the
    /// value of every placeholder segment.
    ///
    /// Literal segments must match exactly. The triggered path may be longer
    /// than the template (the tail is ignored here, see
    /// [`resolve_sync_paths`]); a shorter path fails with
    /// [`ResolveError::PathMismatch`].
    pub fn match_and_extract(
        &self,
        triggered: &str,
    ) -> Result<HashMap<String, String>, ResolveError> {
        let parts: Vec<&str> = split_path(triggered);
        if parts.len() < self.segments.len() {
            return Err(ResolveError::PathMismatch(format!(
                "'{}' is shorter than the source folder template '{}'",
                triggered, self.raw
            )));
        }

        let mut values = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts.iter()) {
            match segment {
                Segment::Literal(lit) => {
                    if lit != part {
                        return Err(ResolveError::PathMismatch(format!(
                            "segment '{}' does not match template segment '{}'",
                            part, lit
                        )));
                    }
                }
                Segment::Placeholder(name) => {
                    values.insert(name.clone(), (*part).to_string());
                }
            }
        }
        Ok(values)
    }

    /// Builds a concrete path from the template and captured values.
    ///
    /// Fails with [`ResolveError::MissingPlaceholder`] if a placeholder has
    /// no entry in `values`.
    pub fn substitute(&self, values: &HashMap<String, String>) -> Result<String, ResolveError> {
        let mut parts = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => parts.push(lit.as_str()),
                Segment::Placeholder(name) => match values.get(name) {
                    Some(value) => parts.push(value.as_str()),
                    None => return Err(ResolveError::MissingPlaceholder(name.clone())),
                },
            }
        }
        Ok(parts.join("/"))
    }
}

/// Startup check: every placeholder referenced by the target template must
/// be captured by the source template.
pub fn validate_templates(
    source: &PathTemplate,
    target: &PathTemplate,
) -> Result<(), ConfigError> {
    for name in target.placeholders() {
        if !source.placeholders().any(|s| s == name) {
            return Err(ConfigError::UnknownTargetPlaceholder(name.to_string()));
        }
    }
    Ok(())
}

/// Resolves a triggered directory into its concrete `(source, target)` pair.
///
/// Placeholder values are extracted from the source side of `triggered`;
/// segments of the triggered directory beyond the source template's length
/// (deeper subdirectories under the matched node) are appended verbatim to
/// both results. Both paths are normalized to end with exactly one `/`.
pub fn resolve_sync_paths(
    source: &PathTemplate,
    target: &PathTemplate,
    triggered: &str,
) -> Result<(String, String), ResolveError> {
    let values = source.match_and_extract(triggered)?;
    let mut src = source.substitute(&values)?;
    let mut tgt = target.substitute(&values)?;

    let extra: Vec<&str> = split_path(triggered)
        .into_iter()
        .skip(source.len())
        .collect();
    if !extra.is_empty() {
        let tail = extra.join("/");
        src = format!("{}/{}", src.trim_end_matches('/'), tail);
        tgt = format!("{}/{}", tgt.trim_end_matches('/'), tail);
    }

    src.truncate(src.trim_end_matches('/').len());
    src.push('/');
    tgt.truncate(tgt.trim_end_matches('/').len());
    tgt.push('/');
    Ok((src, tgt))
}

fn placeholder_name(part: &str) -> Option<&str> {
    part.strip_prefix("${")?.strip_suffix('}')
}

fn split_path(path: &str) -> Vec<&str> {
    path.trim_end_matches('/').split('/').collect()
}
