//! The human-readable `update_notification.txt` written after an apply.

use crate::error::Result;
use crate::io;
use crate::paths;
use crate::version::VersionRecord;
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Notification<'a> {
    pub version: Option<&'a VersionRecord>,
    pub updated: &'a [String],
    pub removed: &'a [String],
    pub at: DateTime<Local>,
}

impl Notification<'_> {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Agentkit Update");
        let _ = writeln!(out);
        if self.updated.is_empty() && self.removed.is_empty() {
            let _ = writeln!(out, "✅ Agentkit is up to date: no changes were needed.");
        } else {
            let _ = writeln!(out, "🎉 Agentkit has been updated successfully!");
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "📅 Date: {}", self.at.format("%Y-%m-%d %H:%M:%S"));
        match self.version {
            Some(v) => {
                let _ = writeln!(out, "📦 Version: {v}");
                let _ = writeln!(out, "📊 Commits: {} new commit(s)", v.behind);
            }
            None => {
                let _ = writeln!(out, "📦 Version: unknown");
                let _ = writeln!(out, "📊 Commits: 0 new commit(s)");
            }
        }
        let _ = writeln!(out);

        if self.updated.is_empty() && self.removed.is_empty() {
            let _ = writeln!(out, "No files changed.");
            let _ = writeln!(out);
        }
        if !self.updated.is_empty() {
            let _ = writeln!(out, "## Updated Files");
            for f in self.updated {
                let _ = writeln!(out, "  ✓ {f}");
            }
            let _ = writeln!(out);
        }
        if !self.removed.is_empty() {
            let _ = writeln!(out, "## Removed Files");
            for f in self.removed {
                let _ = writeln!(out, "  ✗ {f}");
            }
            let _ = writeln!(out);
        }

        let _ = writeln!(out, "---");
        let _ = writeln!(out, "This file was auto-generated by `agentkit up`.");
        let _ = writeln!(out, "You can safely delete this file.");
        out
    }

    /// Write the notification into `dir`, returning the file path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = paths::notification_path(dir);
        io::atomic_write(&path, self.render().as_bytes())?;
        Ok(path)
    }
}
