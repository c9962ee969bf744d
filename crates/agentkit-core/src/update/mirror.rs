//! Update source backed by an unpacked release directory.
//!
//! Layout:
//!   <dir>/release.json   — `{ "version": "v1.3.0", "revision": 42 }`
//!   <dir>/agents/…, <dir>/skills/…, …
//!
//! `revision` is a monotonic counter; the distance between the installed and
//! the mirrored revision is the number of revisions behind.

use crate::config::ManagedPaths;
use crate::error::{KitError, Result};
use crate::io::{self, Loaded};
use crate::paths;
use crate::version::VersionRecord;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::source::{Probe, RemoteDelta, UpdateSource};
use super::state::InstallState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseMarker {
    pub version: String,
    pub revision: u64,
}

#[derive(Debug, Clone)]
pub struct MirrorSource {
    dir: PathBuf,
}

impl MirrorSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.dir.is_dir() {
            Ok(())
        } else {
            Err(KitError::RemoteUnreachable(format!(
                "mirror directory {} does not exist",
                self.dir.display()
            )))
        }
    }

    fn marker(&self) -> Result<Option<ReleaseMarker>> {
        let path = self.dir.join(paths::RELEASE_FILE);
        Ok(match io::read_json(&path)? {
            Loaded::Present(m) => Some(m),
            Loaded::Missing => None,
            Loaded::Malformed(reason) => {
                tracing::warn!(path = %path.display(), %reason, "unreadable release marker");
                None
            }
        })
    }
}

impl UpdateSource for MirrorSource {
    fn describe(&self) -> String {
        format!("mirror {}", self.dir.display())
    }

    fn probe(&self, installed: &InstallState, home: &Path, managed: &ManagedPaths) -> Result<Probe> {
        self.ensure_reachable()?;
        let Some(marker) = self.marker()? else {
            return Ok(Probe::NoInfo);
        };

        let local_revision = installed.revision.unwrap_or(0);
        let behind = marker.revision.saturating_sub(local_revision);
        let version = VersionRecord::new(installed.version_label(), &marker.version, behind)?;
        let stamp = InstallState {
            version: Some(marker.version.clone()),
            commit: None,
            revision: Some(marker.revision),
            updated_at: None,
        };

        if behind == 0 {
            return Ok(Probe::Info(RemoteDelta {
                version,
                changed: Vec::new(),
                deleted: Vec::new(),
                stamp,
            }));
        }

        let mut changed = Vec::new();
        for rel in self.list_files(managed)? {
            let upstream = std::fs::read(self.dir.join(&rel))?;
            let local = io::safe_join(home, &rel)?;
            let differs = match std::fs::read(&local) {
                Ok(bytes) => bytes != upstream,
                Err(_) => true,
            };
            if differs {
                changed.push(rel);
            }
        }
        tracing::debug!(source = %self.describe(), behind, changed = changed.len(), "mirror probed");

        Ok(Probe::Info(RemoteDelta {
            version,
            changed,
            // A mirror cannot distinguish upstream removals from local additions.
            deleted: Vec::new(),
            stamp,
        }))
    }

    fn fetch(&self, rel: &str) -> Result<Option<Vec<u8>>> {
        let path = io::safe_join(&self.dir, rel)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_files(&self, managed: &ManagedPaths) -> Result<Vec<String>> {
        self.ensure_reachable()?;
        let mut files = Vec::new();
        for dir in managed.dirs() {
            let sub = self.dir.join(dir.trim_end_matches('/'));
            files.extend(io::collect_files(&self.dir, &sub)?);
        }
        for file in managed.files() {
            if self.dir.join(file).is_file() {
                files.push(file.clone());
            }
        }
        Ok(files)
    }
}
