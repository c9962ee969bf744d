//! Install state: the local version marker.
//!
//! Persisted to `<home>/data/install.json`. The file is shared with other
//! tooling, so a missing or unparseable marker means "unversioned" rather
//! than an error.

use crate::error::Result;
use crate::io::{self, Loaded};
use crate::paths;
use crate::version::UNVERSIONED;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstallState {
    /// Human-facing version (tag or short hash).
    pub version: Option<String>,
    /// Upstream commit the kit home was last synced to (git sources).
    pub commit: Option<String>,
    /// Monotonic release counter (mirror sources).
    pub revision: Option<u64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl InstallState {
    pub fn load(home: &Path) -> Result<Self> {
        let path = paths::install_state_path(home);
        Ok(match io::read_json(&path)? {
            Loaded::Present(state) => state,
            Loaded::Missing => Self::default(),
            Loaded::Malformed(reason) => {
                tracing::warn!(path = %path.display(), %reason, "ignoring malformed install state");
                Self::default()
            }
        })
    }

    pub fn save(&self, home: &Path) -> Result<()> {
        io::write_json(&paths::install_state_path(home), self)
    }

    pub fn version_label(&self) -> &str {
        self.version.as_deref().unwrap_or(UNVERSIONED)
    }

    /// Copy of `self` with `updated_at` set to now.
    pub fn stamped(&self) -> Self {
        Self {
            updated_at: Some(Utc::now()),
            ..self.clone()
        }
    }
}
