use crate::error::{KitError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// The tempfile is fsynced before it replaces `path`.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut data = serde_json::to_vec_pretty(value)?;
    data.push(b'\n');
    atomic_write(path, &data)
}

/// Outcome of reading a JSON data file that other tools may also write.
#[derive(Debug)]
pub enum Loaded<T> {
    Missing,
    Malformed(String),
    Present(T),
}

impl<T: Default> Loaded<T> {
    pub fn or_default(self) -> T {
        match self {
            Loaded::Present(v) => v,
            Loaded::Missing | Loaded::Malformed(_) => T::default(),
        }
    }
}

/// Read a JSON file, classifying absence and parse failures instead of erroring.
/// A leading UTF-8 BOM is ignored. Only unreadable-but-present files error.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Loaded<T>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Loaded::Missing),
        Err(e) => return Err(e.into()),
    };
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes.as_slice());
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Loaded::Malformed("file is empty".to_string()));
    }
    match serde_json::from_slice(body) {
        Ok(v) => Ok(Loaded::Present(v)),
        Err(e) => Ok(Loaded::Malformed(e.to_string())),
    }
}

/// Join a forward-slash relative path onto `root`, refusing anything that
/// could escape it (absolute paths, `..`, drive prefixes).
pub fn safe_join(root: &Path, rel: &str) -> Result<PathBuf> {
    let candidate = Path::new(rel);
    if rel.is_empty() {
        return Err(KitError::UnsafePath(rel.to_string()));
    }
    for component in candidate.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(KitError::UnsafePath(rel.to_string())),
        }
    }
    Ok(root.join(candidate))
}

/// Remove empty directories from `start` upward, stopping at `stop`
/// (exclusive) or at the first directory that cannot be removed.
pub fn prune_empty_dirs(start: &Path, stop: &Path) {
    let mut dir = start.to_path_buf();
    while dir != stop && dir.starts_with(stop) {
        if std::fs::remove_dir(&dir).is_err() {
            break;
        }
        match dir.parent() {
            Some(p) => dir = p.to_path_buf(),
            None => break,
        }
    }
}

/// Recursively collect every regular file under `dir` as forward-slash paths
/// relative to `base`, sorted.
pub fn collect_files(base: &Path, dir: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    if dir.is_dir() {
        walk(base, dir, &mut out)?;
    }
    out.sort();
    Ok(out)
}

fn walk(base: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(base, &path, out)?;
        } else if file_type.is_file() {
            if let Ok(rel) = path.strip_prefix(base) {
                let parts: Vec<String> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                out.push(parts.join("/"));
            }
        }
    }
    Ok(())
}
