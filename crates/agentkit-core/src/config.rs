use crate::error::{KitError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// SourceConfig
// ---------------------------------------------------------------------------

/// Where upstream kit files come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// A git checkout of the upstream repository.
    Git {
        repo_dir: PathBuf,
        #[serde(default = "default_remote")]
        remote: String,
        #[serde(default = "default_branch")]
        branch: String,
    },
    /// An unpacked release directory carrying a `release.json` marker.
    Mirror { dir: PathBuf },
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

// ---------------------------------------------------------------------------
// UpdateConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    #[serde(default)]
    pub source: Option<SourceConfig>,
    #[serde(default = "default_managed_dirs")]
    pub managed_dirs: Vec<String>,
    #[serde(default = "default_managed_files")]
    pub managed_files: Vec<String>,
    #[serde(default = "default_keep_backups")]
    pub keep_backups: usize,
}

fn default_managed_dirs() -> Vec<String> {
    ["agents/", "commands/", "scripts/", "skills/"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_managed_files() -> Vec<String> {
    ["CHANGELOG.md", "CLAUDE.md", "Makefile"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_keep_backups() -> usize {
    5
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            source: None,
            managed_dirs: default_managed_dirs(),
            managed_files: default_managed_files(),
            keep_backups: default_keep_backups(),
        }
    }
}

impl UpdateConfig {
    pub fn managed(&self) -> ManagedPaths {
        ManagedPaths::new(&self.managed_dirs, &self.managed_files)
    }
}

// ---------------------------------------------------------------------------
// ManagedPaths
// ---------------------------------------------------------------------------

/// The subset of the kit home that updates are allowed to touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedPaths {
    dirs: Vec<String>,
    files: Vec<String>,
}

impl ManagedPaths {
    pub fn new(dirs: &[String], files: &[String]) -> Self {
        let dirs = dirs
            .iter()
            .map(|d| {
                let d = d.trim_matches('/');
                format!("{d}/")
            })
            .collect();
        Self {
            dirs,
            files: files.to_vec(),
        }
    }

    /// Directory prefixes, each ending in `/`.
    pub fn dirs(&self) -> &[String] {
        &self.dirs
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn contains(&self, rel: &str) -> bool {
        self.dirs.iter().any(|d| rel.starts_with(d.as_str())) || self.files.iter().any(|f| rel == f)
    }

    /// Keep only managed paths, preserving order.
    pub fn filter(&self, paths: Vec<String>) -> Vec<String> {
        paths.into_iter().filter(|p| self.contains(p)).collect()
    }
}

impl Default for ManagedPaths {
    fn default() -> Self {
        UpdateConfig::default().managed()
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_recent_errors")]
    pub recent_errors: usize,
    #[serde(default = "default_detect_depth")]
    pub detect_depth: usize,
}

fn default_recent_errors() -> usize {
    3
}

fn default_detect_depth() -> usize {
    3
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            recent_errors: default_recent_errors(),
            detect_depth: default_detect_depth(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub update: UpdateConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Load `<home>/agentkit.yaml`. A missing file yields defaults; a file
    /// that does not parse is an error naming the path.
    pub fn load(home: &Path) -> Result<Self> {
        let path = paths::config_path(home);
        let data = match std::fs::read_to_string(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&data).map_err(|e| KitError::InvalidConfig {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// The configured update source, with relative directories resolved
    /// against the kit home.
    pub fn source(&self, home: &Path) -> Result<SourceConfig> {
        let source = self
            .update
            .source
            .clone()
            .ok_or_else(|| KitError::NoUpdateSource(paths::config_path(home).display().to_string()))?;
        Ok(match source {
            SourceConfig::Git {
                repo_dir,
                remote,
                branch,
            } => SourceConfig::Git {
                repo_dir: home.join(repo_dir),
                remote,
                branch,
            },
            SourceConfig::Mirror { dir } => SourceConfig::Mirror { dir: home.join(dir) },
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_config_is_default() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert!(config.update.source.is_none());
        assert_eq!(config.update.keep_backups, 5);
        assert_eq!(config.session.recent_errors, 3);
    }

    #[test]
    fn parses_git_source_with_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("agentkit.yaml"),
            "update:\n  source:\n    type: git\n    repo_dir: /opt/kit\n",
        )
        .unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(
            config.source(dir.path()).unwrap(),
            SourceConfig::Git {
                repo_dir: PathBuf::from("/opt/kit"),
                remote: "origin".to_string(),
                branch: "main".to_string(),
            }
        );
    }

    #[test]
    fn relative_mirror_dir_resolves_against_home() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("agentkit.yaml"),
            "update:\n  source:\n    type: mirror\n    dir: upstream\n",
        )
        .unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(
            config.source(dir.path()).unwrap(),
            SourceConfig::Mirror {
                dir: dir.path().join("upstream")
            }
        );
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("agentkit.yaml"), "update: [unclosed").unwrap();
        let err = Config::load(dir.path()).unwrap_err();
        assert!(matches!(err, KitError::InvalidConfig { .. }));
    }

    #[test]
    fn unconfigured_source_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = Config::default().source(dir.path()).unwrap_err();
        assert!(matches!(err, KitError::NoUpdateSource(_)));
    }

    #[test]
    fn managed_paths_filter() {
        let managed = ManagedPaths::default();
        let kept = managed.filter(vec![
            "agents/frontend-specialist.md".to_string(),
            "README.md".to_string(),
            "CLAUDE.md".to_string(),
            "skills/nextjs/SKILL.md".to_string(),
            "src/main.rs".to_string(),
        ]);
        assert_eq!(
            kept,
            vec![
                "agents/frontend-specialist.md",
                "CLAUDE.md",
                "skills/nextjs/SKILL.md"
            ]
        );
    }
}
