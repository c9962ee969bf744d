//! Scoped backups of the kit home, taken before an update mutates anything.
//!
//! Layout:
//!   <home>/.agentkit_backup/<YYYYmmdd_HHMMSS_mmm>/manifest.json
//!   <home>/.agentkit_backup/<YYYYmmdd_HHMMSS_mmm>/files/<rel path>
//!
//! Only the paths an update is about to touch are copied. Paths that did not
//! exist are recorded too, so a restore can remove what the update created.
//! Every copy is fsynced and the manifest is written last: a backup directory
//! without a manifest is incomplete and never restored.

use crate::error::{KitError, Result};
use crate::io;
use crate::paths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::state::InstallState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    pub path: String,
    pub existed: bool,
    /// Deepest directory (relative to the kit home) that existed when the
    /// backup was taken. Directories below it are pruned on restore.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupManifest {
    pub created_at: DateTime<Utc>,
    /// `None` when no install state had been recorded yet.
    pub install_state: Option<InstallState>,
    pub entries: Vec<BackupEntry>,
}

#[derive(Debug, Clone)]
pub struct Backup {
    home: PathBuf,
    dir: PathBuf,
    manifest: BackupManifest,
}

impl Backup {
    /// Copy every path in `paths` (relative to `home`) into a fresh backup
    /// directory. Fails with `KitError::Backup` before anything is mutated.
    pub fn create(home: &Path, paths: &[String], installed: Option<&InstallState>) -> Result<Self> {
        let root = paths::backup_root(home);
        std::fs::create_dir_all(&root).map_err(|e| {
            KitError::Backup(format!("cannot create {}: {e}", root.display()))
        })?;
        let dir = unique_dir(&root)?;
        let manifest = match fill(home, &dir, paths, installed) {
            Ok(m) => m,
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_dir_all(&dir) {
                    tracing::warn!(dir = %dir.display(), error = %cleanup, "could not remove partial backup");
                }
                return Err(e);
            }
        };

        tracing::info!(dir = %dir.display(), files = manifest.entries.len(), "backup created");
        Ok(Self {
            home: home.to_path_buf(),
            dir,
            manifest,
        })
    }

    pub fn open(home: &Path, dir: &Path) -> Result<Self> {
        let manifest_path = dir.join(paths::BACKUP_MANIFEST);
        let data = std::fs::read(&manifest_path)?;
        let manifest: BackupManifest = serde_json::from_slice(&data)?;
        Ok(Self {
            home: home.to_path_buf(),
            dir: dir.to_path_buf(),
            manifest,
        })
    }

    /// Most recent complete backup, if any.
    pub fn latest(home: &Path) -> Result<Option<Self>> {
        match complete_backups(home)?.last() {
            Some(dir) => Ok(Some(Self::open(home, dir)?)),
            None => Ok(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest(&self) -> &BackupManifest {
        &self.manifest
    }

    /// Put every backed-up path back exactly as it was.
    pub fn restore_files(&self) -> Result<()> {
        let files_dir = self.dir.join(paths::BACKUP_FILES_DIR);
        for entry in &self.manifest.entries {
            let target = io::safe_join(&self.home, &entry.path)?;
            if entry.existed {
                let data = std::fs::read(files_dir.join(&entry.path)).map_err(|e| {
                    KitError::Rollback(format!("backup copy of {} unreadable: {e}", entry.path))
                })?;
                io::atomic_write(&target, &data).map_err(|e| {
                    KitError::Rollback(format!("cannot restore {}: {e}", entry.path))
                })?;
            } else {
                if target.is_file() {
                    std::fs::remove_file(&target).map_err(|e| {
                        KitError::Rollback(format!("cannot remove {}: {e}", entry.path))
                    })?;
                }
                let stop = match &entry.anchor {
                    Some(anchor) => self.home.join(anchor),
                    None => self.home.clone(),
                };
                if let Some(parent) = target.parent() {
                    io::prune_empty_dirs(parent, &stop);
                }
            }
        }
        tracing::info!(dir = %self.dir.display(), "backup restored");
        Ok(())
    }

    /// Restore files and the install state recorded at backup time.
    pub fn restore(&self) -> Result<()> {
        self.restore_files()?;
        let state_path = paths::install_state_path(&self.home);
        match &self.manifest.install_state {
            Some(state) => state.save(&self.home)?,
            None if state_path.exists() => std::fs::remove_file(&state_path)?,
            None => {}
        }
        Ok(())
    }
}

/// Copy `paths` into `dir` and write its manifest last.
fn fill(
    home: &Path,
    dir: &Path,
    paths: &[String],
    installed: Option<&InstallState>,
) -> Result<BackupManifest> {
    let files_dir = dir.join(paths::BACKUP_FILES_DIR);
    let mut entries: Vec<BackupEntry> = Vec::new();
    for rel in paths {
        if entries.iter().any(|e| &e.path == rel) {
            continue;
        }
        let target = io::safe_join(home, rel)?;
        if target.is_file() {
            copy_durable(&target, &files_dir.join(rel))
                .map_err(|e| KitError::Backup(format!("cannot back up {rel}: {e}")))?;
            entries.push(BackupEntry {
                path: rel.clone(),
                existed: true,
                anchor: None,
            });
        } else if target.exists() {
            return Err(KitError::Backup(format!(
                "{rel} exists but is not a regular file"
            )));
        } else {
            entries.push(BackupEntry {
                path: rel.clone(),
                existed: false,
                anchor: deepest_existing_dir(home, rel),
            });
        }
    }

    let manifest = BackupManifest {
        created_at: Utc::now(),
        install_state: installed.cloned(),
        entries,
    };
    io::write_json(&dir.join(paths::BACKUP_MANIFEST), &manifest)
        .map_err(|e| KitError::Backup(format!("cannot write backup manifest: {e}")))?;
    Ok(manifest)
}

/// Delete all but the newest `keep` backups. The newest one is always kept,
/// even with `keep == 0`. Returns how many were removed.
pub fn prune(home: &Path, keep: usize) -> Result<usize> {
    let backups = complete_backups(home)?;
    let excess = backups.len().saturating_sub(keep.max(1));
    for dir in &backups[..excess] {
        std::fs::remove_dir_all(dir)?;
        tracing::debug!(dir = %dir.display(), "pruned old backup");
    }
    Ok(excess)
}

/// Backup directories carrying a manifest, oldest first.
fn complete_backups(home: &Path) -> Result<Vec<PathBuf>> {
    let root = paths::backup_root(home);
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(&root)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.join(paths::BACKUP_MANIFEST).is_file())
        .collect();
    dirs.sort_by_cached_key(|p| order_key(p));
    Ok(dirs)
}

/// `<stamp>` sorts before `<stamp>-1`, and `-2` before `-10`.
fn order_key(dir: &Path) -> (String, u32) {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.split_once('-') {
        Some((stamp, n)) => (stamp.to_string(), n.parse().unwrap_or(u32::MAX)),
        None => (name, 0),
    }
}

fn unique_dir(root: &Path) -> Result<PathBuf> {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S_%3f").to_string();
    let mut candidate = root.join(&stamp);
    let mut n = 1;
    loop {
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                candidate = root.join(format!("{stamp}-{n}"));
                n += 1;
            }
            Err(e) => {
                return Err(KitError::Backup(format!(
                    "cannot create {}: {e}",
                    candidate.display()
                )))
            }
        }
    }
}

fn copy_durable(src: &Path, dst: &Path) -> std::io::Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(src, dst)?;
    std::fs::OpenOptions::new().write(true).open(dst)?.sync_all()
}

fn deepest_existing_dir(home: &Path, rel: &str) -> Option<String> {
    let mut current = Path::new(rel).parent();
    while let Some(dir) = current {
        if dir.as_os_str().is_empty() {
            return None;
        }
        if home.join(dir).is_dir() {
            let parts: Vec<String> = dir
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            return Some(parts.join("/"));
        }
        current = dir.parent();
    }
    None
}
