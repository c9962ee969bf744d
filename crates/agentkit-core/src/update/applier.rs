//! Backup → overwrite → notify, with automatic rollback.
//!
//! A backup that cannot be taken aborts the apply before any file is touched.
//! Once the backup exists, any failure while writing or removing files restores
//! it and reports `ApplyOutcome::RolledBack` instead of an error.

use crate::error::{KitError, Result};
use crate::io;
use crate::paths;
use chrono::Local;
use std::path::{Path, PathBuf};

use super::backup::{self, Backup};
use super::checker::{UpdateReport, UpdateStatus};
use super::notification::Notification;
use super::source::UpdateSource;
use super::state::InstallState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Nothing to copy; only the notification was (re)written.
    NoChanges { notification: Option<PathBuf> },
    Applied {
        backup: PathBuf,
        notification: Option<PathBuf>,
        updated: Vec<String>,
        removed: Vec<String>,
    },
    /// A write failed and the kit home was restored from `backup`.
    RolledBack { backup: PathBuf, reason: String },
}

pub struct Applier<'a> {
    pub home: &'a Path,
    pub source: &'a dyn UpdateSource,
    /// Directory that receives `update_notification.txt`.
    pub notify_dir: &'a Path,
    pub keep_backups: usize,
}

impl Applier<'_> {
    pub fn apply(&self, report: &UpdateReport) -> Result<ApplyOutcome> {
        if !report.has_file_changes() {
            if report.status == UpdateStatus::UpdateAvailable {
                if let Some(stamp) = &report.stamp {
                    stamp.stamped().save(self.home)?;
                }
            }
            let notification = self.notify(report, &[], &[]);
            return Ok(ApplyOutcome::NoChanges { notification });
        }

        let installed = if paths::install_state_path(self.home).exists() {
            Some(InstallState::load(self.home)?)
        } else {
            None
        };
        let scope: Vec<String> = report
            .changed
            .iter()
            .chain(report.deleted.iter())
            .cloned()
            .collect();
        let backup = Backup::create(self.home, &scope, installed.as_ref())?;

        let mut updated = Vec::new();
        let mut removed = Vec::new();
        if let Err(e) = self.mutate(report, &mut updated, &mut removed) {
            tracing::warn!(error = %e, backup = %backup.dir().display(), "apply failed, rolling back");
            backup
                .restore_files()
                .map_err(|re| KitError::Rollback(format!("{re} (while recovering from: {e})")))?;
            return Ok(ApplyOutcome::RolledBack {
                backup: backup.dir().to_path_buf(),
                reason: e.to_string(),
            });
        }

        if let Some(stamp) = &report.stamp {
            stamp.stamped().save(self.home)?;
        }
        let notification = self.notify(report, &updated, &removed);
        if let Err(e) = backup::prune(self.home, self.keep_backups) {
            tracing::warn!(error = %e, "could not prune old backups");
        }

        tracing::info!(updated = updated.len(), removed = removed.len(), "update applied");
        Ok(ApplyOutcome::Applied {
            backup: backup.dir().to_path_buf(),
            notification,
            updated,
            removed,
        })
    }

    fn mutate(
        &self,
        report: &UpdateReport,
        updated: &mut Vec<String>,
        removed: &mut Vec<String>,
    ) -> Result<()> {
        for rel in &report.changed {
            let target = io::safe_join(self.home, rel)?;
            match self.source.fetch(rel)? {
                Some(bytes) => {
                    io::atomic_write(&target, &bytes)?;
                    tracing::debug!(path = %rel, "updated");
                    updated.push(rel.clone());
                }
                None => {
                    self.remove(&target)?;
                    removed.push(rel.clone());
                }
            }
        }
        for rel in &report.deleted {
            let target = io::safe_join(self.home, rel)?;
            self.remove(&target)?;
            removed.push(rel.clone());
        }
        Ok(())
    }

    fn remove(&self, target: &Path) -> Result<()> {
        if target.is_file() {
            std::fs::remove_file(target)?;
            tracing::debug!(path = %target.display(), "removed");
            if let Some(parent) = target.parent() {
                io::prune_empty_dirs(parent, self.home);
            }
        }
        Ok(())
    }

    /// The notification is informational; failing to write it never fails
    /// the apply.
    fn notify(&self, report: &UpdateReport, updated: &[String], removed: &[String]) -> Option<PathBuf> {
        let notification = Notification {
            version: report.version.as_ref(),
            updated,
            removed,
            at: Local::now(),
        };
        match notification.write_to(self.notify_dir) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(error = %e, "could not write update notification");
                None
            }
        }
    }
}

/// Restore the newest backup, files and install state. Returns its directory.
pub fn rollback_latest(home: &Path) -> Result<PathBuf> {
    let backup = Backup::latest(home)?
        .ok_or_else(|| KitError::NoBackup(paths::backup_root(home).display().to_string()))?;
    backup.restore()?;
    Ok(backup.dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagedPaths;
    use crate::update::checker::check;
    use crate::update::mirror::MirrorSource;
    use crate::update::source::Probe;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    fn read(root: &Path, rel: &str) -> String {
        std::fs::read_to_string(root.join(rel)).unwrap()
    }

    /// Every file in the kit home except backups, with its bytes.
    fn snapshot(home: &Path) -> BTreeMap<String, Vec<u8>> {
        io::collect_files(home, home)
            .unwrap()
            .into_iter()
            .filter(|p| !p.starts_with(paths::BACKUP_DIR))
            .map(|p| {
                let bytes = std::fs::read(home.join(&p)).unwrap();
                (p, bytes)
            })
            .collect()
    }

    struct Fixture {
        home: TempDir,
        mirror: TempDir,
        cwd: TempDir,
    }

    /// Installed v1.2.0 (revision 7), mirror at v1.3.0 (revision 12) with two
    /// changed files.
    fn fixture() -> Fixture {
        let fx = Fixture {
            home: TempDir::new().unwrap(),
            mirror: TempDir::new().unwrap(),
            cwd: TempDir::new().unwrap(),
        };
        let m = fx.mirror.path();
        write(m, "release.json", r#"{"version": "v1.3.0", "revision": 12}"#);
        write(m, "agents/frontend-specialist.md", "agent v2");
        write(m, "skills/nextjs/SKILL.md", "nextjs v2");
        write(m, "skills/react/SKILL.md", "react");

        let h = fx.home.path();
        write(h, "agents/frontend-specialist.md", "agent v1");
        write(h, "skills/react/SKILL.md", "react");
        write(h, "skills/custom/SKILL.md", "user skill");
        InstallState {
            version: Some("v1.2.0".to_string()),
            revision: Some(7),
            ..Default::default()
        }
        .save(h)
        .unwrap();
        fx
    }

    fn applier<'a>(fx: &'a Fixture, source: &'a dyn UpdateSource) -> Applier<'a> {
        Applier {
            home: fx.home.path(),
            source,
            notify_dir: fx.cwd.path(),
            keep_backups: 5,
        }
    }

    #[test]
    fn applies_changed_files_and_notifies() {
        let fx = fixture();
        let source = MirrorSource::new(fx.mirror.path());
        let report = check(&source, fx.home.path(), &ManagedPaths::default()).unwrap();

        let outcome = applier(&fx, &source).apply(&report).unwrap();
        let ApplyOutcome::Applied {
            backup,
            notification,
            updated,
            removed,
        } = outcome
        else {
            panic!("expected applied");
        };

        assert_eq!(
            updated,
            vec!["agents/frontend-specialist.md", "skills/nextjs/SKILL.md"]
        );
        assert!(removed.is_empty());
        assert_eq!(read(fx.home.path(), "agents/frontend-specialist.md"), "agent v2");
        assert_eq!(read(fx.home.path(), "skills/nextjs/SKILL.md"), "nextjs v2");
        assert_eq!(read(fx.home.path(), "skills/custom/SKILL.md"), "user skill");

        // the backup holds the pre-apply content
        assert_eq!(read(&backup, "files/agents/frontend-specialist.md"), "agent v1");

        let text = std::fs::read_to_string(notification.unwrap()).unwrap();
        assert!(text.contains("v1.2.0 → v1.3.0"));
        assert!(text.contains("agents/frontend-specialist.md"));
        assert!(text.contains("skills/nextjs/SKILL.md"));

        let state = InstallState::load(fx.home.path()).unwrap();
        assert_eq!(state.version.as_deref(), Some("v1.3.0"));
        assert_eq!(state.revision, Some(12));
    }

    #[test]
    fn empty_change_list_only_writes_notification() {
        let fx = fixture();
        InstallState {
            version: Some("v1.3.0".to_string()),
            revision: Some(12),
            ..Default::default()
        }
        .save(fx.home.path())
        .unwrap();
        let before = snapshot(fx.home.path());

        let source = MirrorSource::new(fx.mirror.path());
        let report = check(&source, fx.home.path(), &ManagedPaths::default()).unwrap();
        assert_eq!(report.status, UpdateStatus::UpToDate);

        let outcome = applier(&fx, &source).apply(&report).unwrap();
        assert!(matches!(outcome, ApplyOutcome::NoChanges { notification: Some(_) }));
        assert_eq!(snapshot(fx.home.path()), before);
        assert!(!fx.home.path().join(paths::BACKUP_DIR).exists());

        let text = read(fx.cwd.path(), paths::NOTIFICATION_FILE);
        assert!(text.contains("No files changed."));
    }

    #[test]
    fn second_apply_is_idempotent() {
        let fx = fixture();
        let source = MirrorSource::new(fx.mirror.path());
        let managed = ManagedPaths::default();

        let first = check(&source, fx.home.path(), &managed).unwrap();
        applier(&fx, &source).apply(&first).unwrap();
        let after_first = snapshot(fx.home.path());

        // re-check at the latest version: nothing left to do
        let second = check(&source, fx.home.path(), &managed).unwrap();
        assert!(second.changed.is_empty());
        let outcome = applier(&fx, &source).apply(&second).unwrap();
        assert!(matches!(outcome, ApplyOutcome::NoChanges { .. }));
        assert_eq!(snapshot(fx.home.path()), after_first);

        // replaying the stale list lands on the same files
        applier(&fx, &source).apply(&first).unwrap();
        let mut replayed = snapshot(fx.home.path());
        let mut expected = after_first.clone();
        replayed.remove(paths::INSTALL_STATE_FILE);
        expected.remove(paths::INSTALL_STATE_FILE);
        assert_eq!(replayed, expected);
    }

    /// Delegates to a mirror but refuses to serve one path.
    struct FailingSource {
        inner: MirrorSource,
        fail_on: &'static str,
    }

    impl UpdateSource for FailingSource {
        fn describe(&self) -> String {
            "failing".to_string()
        }

        fn probe(&self, installed: &InstallState, home: &Path, managed: &ManagedPaths) -> Result<Probe> {
            self.inner.probe(installed, home, managed)
        }

        fn fetch(&self, rel: &str) -> Result<Option<Vec<u8>>> {
            if rel == self.fail_on {
                return Err(KitError::RemoteUnreachable("connection reset".to_string()));
            }
            self.inner.fetch(rel)
        }

        fn list_files(&self, managed: &ManagedPaths) -> Result<Vec<String>> {
            self.inner.list_files(managed)
        }
    }

    #[test]
    fn mid_apply_failure_rolls_back_byte_for_byte() {
        let fx = fixture();
        let before = snapshot(fx.home.path());
        let source = FailingSource {
            inner: MirrorSource::new(fx.mirror.path()),
            fail_on: "skills/nextjs/SKILL.md",
        };
        let report = check(&source, fx.home.path(), &ManagedPaths::default()).unwrap();
        assert_eq!(report.changed.len(), 2);

        let outcome = applier(&fx, &source).apply(&report).unwrap();
        let ApplyOutcome::RolledBack { backup, reason } = outcome else {
            panic!("expected rollback");
        };
        assert!(reason.contains("connection reset"));
        assert!(backup.is_dir());
        assert_eq!(snapshot(fx.home.path()), before);
        assert!(!fx.home.path().join("skills/nextjs").exists());
        assert!(!fx.cwd.path().join(paths::NOTIFICATION_FILE).exists());
    }

    #[test]
    fn write_failure_rolls_back() {
        let fx = fixture();
        // a regular file where the new skill's directory should go
        write(fx.home.path(), "skills/nextjs", "in the way");
        let before = snapshot(fx.home.path());

        let source = MirrorSource::new(fx.mirror.path());
        let report = check(&source, fx.home.path(), &ManagedPaths::default()).unwrap();
        let outcome = applier(&fx, &source).apply(&report).unwrap();

        assert!(matches!(outcome, ApplyOutcome::RolledBack { .. }));
        assert_eq!(snapshot(fx.home.path()), before);
    }

    #[test]
    fn backup_failure_aborts_before_mutation() {
        let fx = fixture();
        std::fs::write(fx.home.path().join(paths::BACKUP_DIR), "disk full").unwrap();
        let before = snapshot(fx.home.path());

        let source = MirrorSource::new(fx.mirror.path());
        let report = check(&source, fx.home.path(), &ManagedPaths::default()).unwrap();
        let err = applier(&fx, &source).apply(&report).unwrap_err();

        assert!(matches!(err, KitError::Backup(_)));
        let mut after = snapshot(fx.home.path());
        after.remove(paths::BACKUP_DIR);
        let mut expected = before;
        expected.remove(paths::BACKUP_DIR);
        assert_eq!(after, expected);
        assert!(!fx.cwd.path().join(paths::NOTIFICATION_FILE).exists());
    }

    #[test]
    fn upstream_deletions_are_removed_and_restorable() {
        let fx = fixture();
        write(fx.home.path(), "skills/old/SKILL.md", "old");
        let before = snapshot(fx.home.path());
        let source = MirrorSource::new(fx.mirror.path());
        let report = UpdateReport {
            status: UpdateStatus::UpdateAvailable,
            version: None,
            changed: Vec::new(),
            deleted: vec!["skills/old/SKILL.md".to_string()],
            stamp: None,
        };

        let outcome = applier(&fx, &source).apply(&report).unwrap();
        let ApplyOutcome::Applied { removed, .. } = outcome else {
            panic!("expected applied");
        };
        assert_eq!(removed, vec!["skills/old/SKILL.md"]);
        assert!(!fx.home.path().join("skills/old").exists());

        rollback_latest(fx.home.path()).unwrap();
        assert_eq!(snapshot(fx.home.path()), before);
    }

    #[test]
    fn zero_keep_backups_still_allows_rollback() {
        let fx = fixture();
        let before = snapshot(fx.home.path());
        let source = MirrorSource::new(fx.mirror.path());
        let report = check(&source, fx.home.path(), &ManagedPaths::default()).unwrap();

        let outcome = Applier {
            keep_backups: 0,
            ..applier(&fx, &source)
        }
        .apply(&report)
        .unwrap();
        let ApplyOutcome::Applied { backup, .. } = outcome else {
            panic!("expected applied");
        };
        assert!(backup.join(paths::BACKUP_MANIFEST).is_file());

        assert_eq!(rollback_latest(fx.home.path()).unwrap(), backup);
        assert_eq!(snapshot(fx.home.path()), before);
    }

    #[test]
    fn rollback_without_backup_is_an_error() {
        let home = TempDir::new().unwrap();
        assert!(matches!(
            rollback_latest(home.path()).unwrap_err(),
            KitError::NoBackup(_)
        ));
    }
}
