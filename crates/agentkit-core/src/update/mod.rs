//! Keeping the kit home in sync with upstream.
//!
//! `checker` compares without touching anything; `applier` backs up the
//! affected paths, overwrites them, and rolls back on failure.

pub mod applier;
pub mod backup;
pub mod checker;
pub mod git;
pub mod mirror;
pub mod notification;
pub mod source;
pub mod state;

pub use applier::{rollback_latest, Applier, ApplyOutcome};
pub use checker::{check, full_sync_report, UpdateReport, UpdateStatus};
pub use source::{open, Probe, RemoteDelta, UpdateSource};
pub use state::InstallState;
