use thiserror::Error;

#[derive(Debug, Error)]
pub enum KitError {
    #[error("home directory not found: set HOME or pass --home")]
    HomeNotFound,

    #[error("no update source configured: set `update.source` in {0}")]
    NoUpdateSource(String),

    #[error("invalid config {path}: {reason}")]
    InvalidConfig { path: String, reason: String },

    #[error("remote source unreachable: {0}")]
    RemoteUnreachable(String),

    #[error("git executable not found on PATH")]
    GitNotFound,

    #[error("git {command} failed: {detail}")]
    Git { command: String, detail: String },

    #[error("backup failed: {0}")]
    Backup(String),

    #[error("rollback failed: {0}")]
    Rollback(String),

    #[error("no backup found in {0}")]
    NoBackup(String),

    #[error("latest version {latest} is older than current version {current}")]
    VersionRegression { current: String, latest: String },

    #[error("unsafe path '{0}': must be relative and stay inside the kit home")]
    UnsafePath(String),

    #[error("error record not found: {0}")]
    ErrorNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, KitError>;
