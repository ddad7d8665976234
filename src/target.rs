//! Target service set and deployment prefixes
//!
//! Branch deployments register their services as `{prefix}-{name}`, where the
//! prefix comes from the branch being deployed. Cluster-wide services
//! (`consul`, `nomad`, `vault`, ...) keep their bare names.

use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

/// Longest prefix kept after sanitizing
pub const MAX_PREFIX_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("failed to read prefix file {path}: {source}")]
    PrefixFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where the deployment prefix comes from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PrefixSource {
    /// No prefix; every name is used as-is
    #[default]
    None,
    /// Prefix given directly (flag or environment)
    Literal(String),
    /// Prefix is the content of a file, e.g. a CI workspace-status file
    File(PathBuf),
}

/// Read the raw prefix and sanitize it
///
/// A missing or unreadable prefix file is a configuration error.
pub fn resolve_prefix(source: &PrefixSource) -> Result<String, TargetError> {
    let raw = match source {
        PrefixSource::None => return Ok(String::new()),
        PrefixSource::Literal(value) => value.clone(),
        PrefixSource::File(path) => {
            std::fs::read_to_string(path).map_err(|source| TargetError::PrefixFile {
                path: path.clone(),
                source,
            })?
        }
    };
    Ok(sanitize_prefix(&raw))
}

/// Turn a branch or release identifier into a service-name-safe prefix
///
/// Lowercases ASCII, maps everything outside `[a-z0-9]` to `-`, collapses
/// dash runs, strips leading/trailing dashes and truncates to
/// [`MAX_PREFIX_LEN`].
pub fn sanitize_prefix(raw: &str) -> String {
    let mut prefix = String::with_capacity(raw.len().min(MAX_PREFIX_LEN));

    for c in raw.trim().chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            prefix.push(c);
        } else if !prefix.is_empty() && !prefix.ends_with('-') {
            prefix.push('-');
        }
    }

    // Only ASCII has been pushed, so byte truncation is char-safe
    prefix.truncate(MAX_PREFIX_LEN);
    while prefix.ends_with('-') {
        prefix.pop();
    }
    prefix
}

/// Qualify `name` with `prefix`; an empty prefix leaves it untouched
pub fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}-{}", prefix, name)
    }
}

/// The service names the gate waits for
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TargetServiceSet {
    names: BTreeSet<String>,
}

impl TargetServiceSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Build the set from per-deployment names (qualified with `prefix`) and
    /// cluster-wide names (taken as-is)
    pub fn with_prefix(prefix: &str, prefixed: &[String], global: &[String]) -> Self {
        let names = prefixed
            .iter()
            .map(|name| qualify(prefix, name))
            .chain(global.iter().cloned())
            .collect();
        Self { names }
    }

    pub fn names(&self) -> &BTreeSet<String> {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Targets not present in `registered`
    pub fn missing_from(&self, registered: &BTreeSet<String>) -> BTreeSet<String> {
        self.names.difference(registered).cloned().collect()
    }
}
