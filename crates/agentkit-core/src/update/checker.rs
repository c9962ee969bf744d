use crate::config::ManagedPaths;
use crate::error::Result;
use crate::version::VersionRecord;
use serde::Serialize;
use std::path::Path;

use super::source::{Probe, UpdateSource};
use super::state::InstallState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    UpToDate,
    UpdateAvailable,
    NoUpdateInfo,
}

impl std::fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UpdateStatus::UpToDate => "up to date",
            UpdateStatus::UpdateAvailable => "update available",
            UpdateStatus::NoUpdateInfo => "no update information available",
        };
        f.write_str(s)
    }
}

/// Result of a read-only comparison between the kit home and upstream.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    pub status: UpdateStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionRecord>,
    pub changed: Vec<String>,
    pub deleted: Vec<String>,
    /// Install state to record after a successful apply.
    #[serde(skip)]
    pub stamp: Option<InstallState>,
}

impl UpdateReport {
    pub fn no_info() -> Self {
        Self {
            status: UpdateStatus::NoUpdateInfo,
            version: None,
            changed: Vec::new(),
            deleted: Vec::new(),
            stamp: None,
        }
    }

    pub fn has_file_changes(&self) -> bool {
        !self.changed.is_empty() || !self.deleted.is_empty()
    }
}

/// Compare the kit home against `source`. Never mutates local state.
pub fn check(source: &dyn UpdateSource, home: &Path, managed: &ManagedPaths) -> Result<UpdateReport> {
    let installed = InstallState::load(home)?;
    let probe = source.probe(&installed, home, managed)?;
    let report = match probe {
        Probe::NoInfo => UpdateReport::no_info(),
        Probe::Info(delta) => {
            let status = if delta.version.is_current() {
                UpdateStatus::UpToDate
            } else {
                UpdateStatus::UpdateAvailable
            };
            UpdateReport {
                status,
                version: Some(delta.version),
                changed: managed.filter(delta.changed),
                deleted: managed.filter(delta.deleted),
                stamp: Some(delta.stamp),
            }
        }
    };
    tracing::debug!(
        source = %source.describe(),
        status = %report.status,
        changed = report.changed.len(),
        deleted = report.deleted.len(),
        "update check complete"
    );
    Ok(report)
}

/// A report that re-installs every managed upstream file, regardless of the
/// installed version.
pub fn full_sync_report(
    source: &dyn UpdateSource,
    home: &Path,
    managed: &ManagedPaths,
) -> Result<UpdateReport> {
    let mut report = check(source, home, managed)?;
    report.changed = source.list_files(managed)?;
    report.deleted.clear();
    if report.has_file_changes() {
        report.status = UpdateStatus::UpdateAvailable;
    }
    Ok(report)
}
