//! Per-project session snapshots.
//!
//! Layout:
//!   <home>/data/projects/<safe name>/session-stats.json
//!   <home>/data/projects/<safe name>/error-tracker.json   (read, stamped on end)
//!   <home>/data/current-project.json

use crate::error::Result;
use crate::io::{self, Loaded};
use crate::paths;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SKIP_DIRS: &[&str] = &["node_modules", "venv", "__pycache__", "dist", "build"];

// ---------------------------------------------------------------------------
// Project detection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectAnalysis {
    pub project_type: Option<String>,
    pub framework: Option<String>,
    pub platform: Option<String>,
    /// Directory the marker file was found in.
    pub detected_at: Option<String>,
}

impl ProjectAnalysis {
    fn found(dir: &Path, project_type: &str, framework: &str, platform: &str) -> Self {
        Self {
            project_type: Some(project_type.to_string()),
            framework: Some(framework.to_string()),
            platform: Some(platform.to_string()),
            detected_at: Some(dir.display().to_string()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageJson {
    #[serde(default)]
    dependencies: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    dev_dependencies: serde_json::Map<String, serde_json::Value>,
}

/// Look for project markers in `root`, then in its subdirectories (name
/// order, depth first) up to `max_depth` levels down. An undetected project
/// yields an all-`None` analysis.
pub fn detect_project(root: &Path, max_depth: usize) -> ProjectAnalysis {
    detect_in(root, 0, max_depth).unwrap_or_default()
}

fn detect_in(dir: &Path, depth: usize, max_depth: usize) -> Option<ProjectAnalysis> {
    if depth > max_depth {
        return None;
    }
    if let Some(found) = detect_markers(dir) {
        return Some(found);
    }

    let mut children: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|e| {
            let name = e.file_name();
            let name = name.to_string_lossy();
            !name.starts_with('.') && !SKIP_DIRS.contains(&name.as_ref())
        })
        .map(|e| e.path())
        .collect();
    children.sort();
    children
        .iter()
        .find_map(|child| detect_in(child, depth + 1, max_depth))
}

fn detect_markers(dir: &Path) -> Option<ProjectAnalysis> {
    let package_json = dir.join("package.json");
    if package_json.is_file() {
        match io::read_json::<PackageJson>(&package_json) {
            Ok(Loaded::Present(pkg)) => return Some(node_analysis(dir, &pkg)),
            _ => tracing::debug!(path = %package_json.display(), "unreadable package.json, skipping"),
        }
    }

    if dir.join("requirements.txt").is_file() || dir.join("pyproject.toml").is_file() {
        let analysis = if dir.join("manage.py").is_file() {
            ProjectAnalysis::found(dir, "python", "django", "web")
        } else if dir.join("app.py").is_file() || dir.join("main.py").is_file() {
            ProjectAnalysis::found(dir, "python", "flask-or-fastapi", "api")
        } else {
            ProjectAnalysis::found(dir, "python", "python", "general")
        };
        return Some(analysis);
    }

    if dir.join("Cargo.toml").is_file() {
        return Some(ProjectAnalysis::found(dir, "rust", "rust", "general"));
    }
    if dir.join("go.mod").is_file() {
        return Some(ProjectAnalysis::found(dir, "go", "go", "general"));
    }
    None
}

fn node_analysis(dir: &Path, pkg: &PackageJson) -> ProjectAnalysis {
    let has = |name: &str| {
        pkg.dependencies.contains_key(name) || pkg.dev_dependencies.contains_key(name)
    };
    let (framework, platform) = if has("react-native") || has("expo") {
        ("react-native", "mobile")
    } else if has("next") {
        ("nextjs", "web")
    } else if has("react") {
        ("react", "web")
    } else if has("express") {
        ("express", "api")
    } else if has("fastify") {
        ("fastify", "api")
    } else if has("vue") {
        ("vue", "web")
    } else {
        ("node", "general")
    };
    ProjectAnalysis::found(dir, "node", framework, platform)
}

// ---------------------------------------------------------------------------
// Session records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentError {
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub pattern: Option<String>,
    pub solution: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub project_path: String,
    pub project_name: String,
    #[serde(with = "crate::timestamp")]
    pub timestamp: DateTime<Local>,
    pub analysis: ProjectAnalysis,
    #[serde(default)]
    pub recent_errors: Vec<RecentError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentProject {
    pub project_path: String,
    pub project_name: String,
    pub data_dir: String,
    #[serde(with = "crate::timestamp")]
    pub last_access: DateTime<Local>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEnd {
    pub project_path: String,
    pub timestamp: DateTime<Local>,
    pub status: &'static str,
    /// `H:MM:SS`; absent when no readable start record exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProjectTracker {
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

/// The last `limit` errors of the project's tracker, oldest first.
pub fn recent_errors(home: &Path, project: &Path, limit: usize) -> Vec<RecentError> {
    let path = paths::project_data_dir(home, project).join(paths::PROJECT_TRACKER_FILE);
    let tracker: ProjectTracker = match io::read_json(&path) {
        Ok(loaded) => loaded.or_default(),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "project tracker unreadable");
            return Vec::new();
        }
    };
    let field = |e: &serde_json::Value, key: &str| e.get(key).and_then(|v| v.as_str()).map(String::from);
    let skip = tracker.errors.len().saturating_sub(limit);
    tracker.errors[skip..]
        .iter()
        .map(|e| RecentError {
            error_type: field(e, "errorType"),
            pattern: field(e, "pattern"),
            solution: field(e, "solution"),
        })
        .collect()
}

/// Record the start of a session in `project`.
pub fn start(home: &Path, project: &Path, recent_limit: usize, detect_depth: usize) -> Result<SessionStats> {
    let data_dir = paths::project_data_dir(home, project);
    io::ensure_dir(&data_dir)?;

    let now = Local::now();
    let stats = SessionStats {
        project_path: project.display().to_string(),
        project_name: paths::project_name(project),
        timestamp: now,
        analysis: detect_project(project, detect_depth),
        recent_errors: recent_errors(home, project, recent_limit),
    };
    io::write_json(&data_dir.join(paths::SESSION_STATS_FILE), &stats)?;

    let current = CurrentProject {
        project_path: stats.project_path.clone(),
        project_name: stats.project_name.clone(),
        data_dir: data_dir.display().to_string(),
        last_access: now,
    };
    io::write_json(&paths::current_project_path(home), &current)?;

    tracing::debug!(project = %stats.project_name, framework = ?stats.analysis.framework, "session started");
    Ok(stats)
}

/// Close the session in `project`.
pub fn end(home: &Path, project: &Path) -> Result<SessionEnd> {
    let data_dir = paths::project_data_dir(home, project);
    let now = Local::now();

    let duration = match io::read_json::<SessionStats>(&data_dir.join(paths::SESSION_STATS_FILE))? {
        Loaded::Present(stats) => Some(format_duration(now - stats.timestamp)),
        Loaded::Missing => None,
        Loaded::Malformed(reason) => {
            tracing::warn!(%reason, "session stats unreadable, duration unknown");
            None
        }
    };

    let tracker_path = data_dir.join(paths::PROJECT_TRACKER_FILE);
    if let Loaded::Present(mut tracker) =
        io::read_json::<serde_json::Map<String, serde_json::Value>>(&tracker_path)?
    {
        tracker.insert(
            "lastSessionEnd".to_string(),
            serde_json::Value::String(now.to_rfc3339()),
        );
        io::write_json(&tracker_path, &tracker)?;
    }

    Ok(SessionEnd {
        project_path: project.display().to_string(),
        timestamp: now,
        status: "completed",
        duration,
    })
}

fn format_duration(d: chrono::Duration) -> String {
    let secs = d.num_seconds().max(0);
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
