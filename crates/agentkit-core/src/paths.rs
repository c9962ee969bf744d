use crate::error::{KitError, Result};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants (relative to the kit home)
// ---------------------------------------------------------------------------

pub const DEFAULT_HOME_DIR: &str = ".claude";
pub const PROJECTS_DIR: &str = "data/projects";
pub const BACKUP_DIR: &str = ".agentkit_backup";

pub const CONFIG_FILE: &str = "agentkit.yaml";
pub const INSTALL_STATE_FILE: &str = "data/install.json";
pub const ERROR_DB_FILE: &str = "data/error-database.json";
pub const ERROR_TRACKER_FILE: &str = "data/error-tracker.json";
pub const CURRENT_PROJECT_FILE: &str = "data/current-project.json";

pub const SESSION_STATS_FILE: &str = "session-stats.json";
pub const PROJECT_TRACKER_FILE: &str = "error-tracker.json";
pub const BACKUP_MANIFEST: &str = "manifest.json";
pub const BACKUP_FILES_DIR: &str = "files";

/// Written to the invocation directory after an update.
pub const NOTIFICATION_FILE: &str = "update_notification.txt";

/// Marker file at the root of an unpacked release mirror.
pub const RELEASE_FILE: &str = "release.json";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Resolve the kit home: an explicit path wins, otherwise `~/.claude`.
pub fn resolve_home(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    home::home_dir()
        .map(|h| h.join(DEFAULT_HOME_DIR))
        .ok_or(KitError::HomeNotFound)
}

pub fn config_path(home: &Path) -> PathBuf {
    home.join(CONFIG_FILE)
}

pub fn install_state_path(home: &Path) -> PathBuf {
    home.join(INSTALL_STATE_FILE)
}

pub fn error_db_path(home: &Path) -> PathBuf {
    home.join(ERROR_DB_FILE)
}

pub fn error_tracker_path(home: &Path) -> PathBuf {
    home.join(ERROR_TRACKER_FILE)
}

pub fn current_project_path(home: &Path) -> PathBuf {
    home.join(CURRENT_PROJECT_FILE)
}

pub fn backup_root(home: &Path) -> PathBuf {
    home.join(BACKUP_DIR)
}

pub fn notification_path(dir: &Path) -> PathBuf {
    dir.join(NOTIFICATION_FILE)
}

/// Per-project data directory, keyed by a filesystem-safe form of the
/// project directory name.
pub fn project_data_dir(home: &Path, project: &Path) -> PathBuf {
    home.join(PROJECTS_DIR).join(safe_project_name(project))
}

/// Last path component with everything but alphanumerics, `-` and `_`
/// replaced by `_`.
pub fn safe_project_name(project: &Path) -> String {
    let name = project
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub fn project_name(project: &Path) -> String {
    project
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
