//! Update source backed by a git checkout of the upstream repository.
//!
//! The checkout itself is never modified apart from `git fetch`. The installed
//! commit comes from the install state (falling back to the checkout's `HEAD`)
//! and file content is read straight out of the remote-tracking ref.

use crate::config::ManagedPaths;
use crate::error::{KitError, Result};
use crate::version::VersionRecord;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::source::{Probe, RemoteDelta, UpdateSource};
use super::state::InstallState;

const SHORT_HASH_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct GitSource {
    repo_dir: PathBuf,
    remote: String,
    branch: String,
}

impl GitSource {
    pub fn new(repo_dir: impl Into<PathBuf>, remote: &str, branch: &str) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            remote: remote.to_string(),
            branch: branch.to_string(),
        }
    }

    fn remote_ref(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }

    /// Run git in the checkout; `Ok(Err(stderr))` on a non-zero exit.
    fn git_raw(&self, args: &[&str]) -> Result<std::result::Result<Vec<u8>, String>> {
        let git = which::which("git").map_err(|_| KitError::GitNotFound)?;
        tracing::debug!(repo = %self.repo_dir.display(), ?args, "git");
        let output = Command::new(git)
            .args(args)
            .current_dir(&self.repo_dir)
            .stdin(Stdio::null())
            .output()?;
        if output.status.success() {
            Ok(Ok(output.stdout))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Ok(Err(stderr))
        }
    }

    /// Run git and return trimmed stdout, failing on a non-zero exit.
    fn git(&self, args: &[&str]) -> Result<String> {
        match self.git_raw(args)? {
            Ok(stdout) => Ok(String::from_utf8_lossy(&stdout).trim().to_string()),
            Err(detail) => Err(KitError::Git {
                command: args.first().copied().unwrap_or_default().to_string(),
                detail,
            }),
        }
    }

    /// Run git, returning `None` instead of an error on a non-zero exit.
    fn git_opt(&self, args: &[&str]) -> Result<Option<String>> {
        Ok(self
            .git_raw(args)?
            .ok()
            .map(|stdout| String::from_utf8_lossy(&stdout).trim().to_string()))
    }

    fn fetch_remote(&self) -> Result<()> {
        if !self.repo_dir.is_dir() {
            return Err(KitError::RemoteUnreachable(format!(
                "checkout {} does not exist",
                self.repo_dir.display()
            )));
        }
        match self.git_raw(&["fetch", "--quiet", &self.remote])? {
            Ok(_) => Ok(()),
            Err(detail) => Err(KitError::RemoteUnreachable(detail)),
        }
    }

    /// Nearest tag reachable from `rev`, else its short hash.
    fn version_of(&self, rev: &str) -> Result<String> {
        if let Some(tag) = self.git_opt(&["describe", "--tags", "--abbrev=0", rev])? {
            if !tag.is_empty() {
                return Ok(tag);
            }
        }
        Ok(rev.chars().take(SHORT_HASH_LEN).collect())
    }

    fn name_list(&self, args: &[&str]) -> Result<Vec<String>> {
        let out = self.git(args)?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// `git rev-list --count` prints one integer; anything else is a git failure.
fn parse_count(out: &str) -> Result<u64> {
    out.trim().parse().map_err(|_| KitError::Git {
        command: "rev-list --count".to_string(),
        detail: format!("unexpected output '{out}'"),
    })
}

impl UpdateSource for GitSource {
    fn describe(&self) -> String {
        format!("git {} ({})", self.repo_dir.display(), self.remote_ref())
    }

    fn probe(&self, installed: &InstallState, _home: &Path, managed: &ManagedPaths) -> Result<Probe> {
        self.fetch_remote()?;

        let remote_ref = self.remote_ref();
        let Some(remote_commit) = self.git_opt(&["rev-parse", "--verify", &remote_ref])? else {
            return Ok(Probe::NoInfo);
        };

        let local_commit = match &installed.commit {
            Some(c) => c.clone(),
            None => self.git(&["rev-parse", "HEAD"])?,
        };

        let range = format!("{local_commit}..{remote_commit}");
        let behind = parse_count(&self.git(&["rev-list", "--count", &range])?)?;

        let current = match &installed.version {
            Some(v) => v.clone(),
            None => self.version_of(&local_commit)?,
        };
        let latest = self.version_of(&remote_commit)?;
        let version = VersionRecord::new(current, latest.clone(), behind)?;
        let stamp = InstallState {
            version: Some(latest),
            commit: Some(remote_commit.clone()),
            revision: None,
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

        let changed = self.name_list(&[
            "diff",
            "--name-only",
            "--diff-filter=d",
            &local_commit,
            &remote_commit,
        ])?;
        let deleted = self.name_list(&[
            "diff",
            "--name-only",
            "--diff-filter=D",
            &local_commit,
            &remote_commit,
        ])?;

        Ok(Probe::Info(RemoteDelta {
            version,
            changed: managed.filter(changed),
            deleted: managed.filter(deleted),
            stamp,
        }))
    }

    fn fetch(&self, rel: &str) -> Result<Option<Vec<u8>>> {
        let object = format!("{}:{}", self.remote_ref(), rel);
        if self.git_raw(&["cat-file", "-e", &object])?.is_err() {
            return Ok(None);
        }
        match self.git_raw(&["show", &object])? {
            Ok(bytes) => Ok(Some(bytes)),
            Err(detail) => Err(KitError::Git {
                command: "show".to_string(),
                detail,
            }),
        }
    }

    fn list_files(&self, managed: &ManagedPaths) -> Result<Vec<String>> {
        let files = self.name_list(&["ls-tree", "-r", "--name-only", &self.remote_ref()])?;
        Ok(managed.filter(files))
    }
}
