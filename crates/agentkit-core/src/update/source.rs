use crate::config::{ManagedPaths, SourceConfig};
use crate::error::Result;
use crate::version::VersionRecord;
use std::path::Path;

use super::git::GitSource;
use super::mirror::MirrorSource;
use super::state::InstallState;

/// What a source knows about upstream relative to the installed kit.
#[derive(Debug, Clone)]
pub enum Probe {
    /// Upstream carries no readable version marker.
    NoInfo,
    Info(RemoteDelta),
}

#[derive(Debug, Clone)]
pub struct RemoteDelta {
    pub version: VersionRecord,
    /// Managed paths added or modified upstream, in source order.
    pub changed: Vec<String>,
    /// Managed paths removed upstream.
    pub deleted: Vec<String>,
    /// Install state to record once the delta has been applied.
    pub stamp: InstallState,
}

/// An upstream the kit home can be synchronized from.
///
/// `probe` must not mutate the kit home. Sources report an unreachable
/// upstream as `KitError::RemoteUnreachable`.
pub trait UpdateSource {
    /// Short human-readable location, for logs and messages.
    fn describe(&self) -> String;

    fn probe(&self, installed: &InstallState, home: &Path, managed: &ManagedPaths) -> Result<Probe>;

    /// Upstream content of `rel`, or `None` when upstream has no such file.
    fn fetch(&self, rel: &str) -> Result<Option<Vec<u8>>>;

    /// Every managed file upstream.
    fn list_files(&self, managed: &ManagedPaths) -> Result<Vec<String>>;
}

/// Build the source described by `config`.
pub fn open(config: &SourceConfig) -> Box<dyn UpdateSource> {
    match config {
        SourceConfig::Git {
            repo_dir,
            remote,
            branch,
        } => Box::new(GitSource::new(repo_dir, remote, branch)),
        SourceConfig::Mirror { dir } => Box::new(MirrorSource::new(dir)),
    }
}
