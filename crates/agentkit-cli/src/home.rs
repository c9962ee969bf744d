use agentkit_core::paths;
use std::path::{Path, PathBuf};

/// Resolve the kit home directory.
///
/// Priority:
/// 1. `--home` flag / `AGENTKIT_HOME` env var (passed in as `explicit`)
/// 2. `~/.claude`
pub fn resolve_home(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    Ok(paths::resolve_home(explicit)?)
}

/// Resolve the project directory for session and tracking commands,
/// falling back to the current directory.
pub fn resolve_project(explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(p) if p.is_absolute() => p.to_path_buf(),
        Some(p) => current_dir().join(p),
        None => current_dir(),
    }
}

pub fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
