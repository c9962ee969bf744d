//! Version delta between the installed kit and upstream.

use crate::error::{KitError, Result};
use serde::{Deserialize, Serialize};

/// Placeholder for an install that never recorded a version.
pub const UNVERSIONED: &str = "unversioned";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub current: String,
    pub latest: String,
    /// Revisions between `current` and `latest`.
    pub behind: u64,
}

impl VersionRecord {
    /// Build a record, rejecting a `latest` that is semantically older than
    /// `current`. Versions that are not semver (commit hashes, `unversioned`)
    /// carry no ordering and are accepted as-is.
    pub fn new(current: impl Into<String>, latest: impl Into<String>, behind: u64) -> Result<Self> {
        let current = current.into();
        let latest = latest.into();
        if let (Some(c), Some(l)) = (parse_semver(&current), parse_semver(&latest)) {
            if l < c {
                return Err(KitError::VersionRegression { current, latest });
            }
        }
        Ok(Self {
            current,
            latest,
            behind,
        })
    }

    pub fn is_current(&self) -> bool {
        self.behind == 0
    }
}

impl std::fmt::Display for VersionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} → {}", self.current, self.latest)
    }
}

/// Parse `1.2.0` or `v1.2.0`.
pub fn parse_semver(s: &str) -> Option<semver::Version> {
    let trimmed = s.trim();
    let bare = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    semver::Version::parse(bare).ok()
}
