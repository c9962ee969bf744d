use crate::output::print_json;
use agentkit_core::{
    config::{Config, ManagedPaths},
    update::{self, Applier, ApplyOutcome, UpdateReport, UpdateSource, UpdateStatus},
    KitError,
};
use anyhow::Context;
use clap::Subcommand;
use std::io::IsTerminal;
use std::path::Path;

#[derive(Subcommand)]
pub enum UpAction {
    /// Only compare with upstream and print what would change
    Check,
    /// Re-install every managed file from upstream
    Sync,
    /// Restore the most recent backup
    Rollback,
}

/// `agentkit up` — check upstream, confirm, back up, apply.
///
/// An unreachable upstream is reported as "check failed" and exits 0, except
/// under `--force`, where the requested apply could not happen.
pub fn run(
    home: &Path,
    action: Option<UpAction>,
    force: bool,
    cwd: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    if let Some(UpAction::Rollback) = action {
        return rollback(home, json);
    }

    let config = Config::load(home)?;
    let source = update::open(&config.source(home)?);
    let managed = config.update.managed();

    if let Some(UpAction::Check) = action {
        return match update::check(source.as_ref(), home, &managed) {
            Ok(report) => print_report(&report, json),
            Err(KitError::RemoteUnreachable(reason)) => check_failed(&reason, json),
            Err(e) => Err(e.into()),
        };
    }

    let full = matches!(action, Some(UpAction::Sync));
    let report = match scan(source.as_ref(), home, &managed, full) {
        Ok(report) => report,
        Err(KitError::RemoteUnreachable(reason)) if !force => return check_failed(&reason, json),
        Err(e) => return Err(e).context("cannot update"),
    };

    if report.status == UpdateStatus::NoUpdateInfo && !report.has_file_changes() {
        return print_report(&report, json);
    }
    if !json {
        print_report(&report, false)?;
    }
    if report.has_file_changes() && !force && !confirm()? {
        println!("Update cancelled.");
        return Ok(());
    }

    let notify_dir = match cwd {
        Some(dir) => dir.to_path_buf(),
        None => crate::home::current_dir(),
    };
    let applier = Applier {
        home,
        source: source.as_ref(),
        notify_dir: &notify_dir,
        keep_backups: config.update.keep_backups,
    };
    let outcome = applier.apply(&report)?;
    print_outcome(&report, &outcome, json)
}

fn scan(
    source: &dyn UpdateSource,
    home: &Path,
    managed: &ManagedPaths,
    full: bool,
) -> agentkit_core::Result<UpdateReport> {
    if full {
        update::full_sync_report(source, home, managed)
    } else {
        update::check(source, home, managed)
    }
}

fn confirm() -> anyhow::Result<bool> {
    if !std::io::stdin().is_terminal() {
        anyhow::bail!("confirmation required but stdin is not a terminal: rerun with --force");
    }
    use dialoguer::{theme::ColorfulTheme, Confirm};
    let ok = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Apply this update?")
        .default(true)
        .interact()
        .context("failed to read confirmation")?;
    Ok(ok)
}

fn check_failed(reason: &str, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(&serde_json::json!({ "status": "check_failed", "reason": reason }))?;
    } else {
        println!("check failed: {reason}");
    }
    Ok(())
}

fn print_report(report: &UpdateReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }
    match &report.version {
        Some(v) => {
            println!("Version: {v} ({} new commit(s))", v.behind);
        }
        None => println!("Version: unknown"),
    }
    println!("Status: {}", report.status);
    if report.changed.is_empty() && report.deleted.is_empty() {
        println!("No files to update.");
    }
    if !report.changed.is_empty() {
        println!("\nChanged files ({}):", report.changed.len());
        for f in &report.changed {
            println!("  {f}");
        }
    }
    if !report.deleted.is_empty() {
        println!("\nRemoved upstream ({}):", report.deleted.len());
        for f in &report.deleted {
            println!("  {f}");
        }
    }
    Ok(())
}

fn print_outcome(report: &UpdateReport, outcome: &ApplyOutcome, json: bool) -> anyhow::Result<()> {
    match outcome {
        ApplyOutcome::NoChanges { notification } => {
            if json {
                print_json(&serde_json::json!({
                    "outcome": "no_changes",
                    "version": report.version,
                    "notification": notification,
                }))?;
            } else {
                println!("\nNothing to update.");
                if let Some(path) = notification {
                    println!("Notification: {}", path.display());
                }
            }
        }
        ApplyOutcome::Applied {
            backup,
            notification,
            updated,
            removed,
        } => {
            if json {
                print_json(&serde_json::json!({
                    "outcome": "applied",
                    "version": report.version,
                    "updated": updated,
                    "removed": removed,
                    "backup": backup,
                    "notification": notification,
                }))?;
            } else {
                println!(
                    "\nUpdated {} file(s), removed {}.",
                    updated.len(),
                    removed.len()
                );
                println!("Backup: {}", backup.display());
                if let Some(path) = notification {
                    println!("Notification: {}", path.display());
                }
            }
        }
        ApplyOutcome::RolledBack { backup, reason } => {
            if json {
                print_json(&serde_json::json!({
                    "outcome": "rolled_back",
                    "reason": reason,
                    "backup": backup,
                }))?;
            } else {
                eprintln!("warning: update failed and was rolled back: {reason}");
                eprintln!("  backup kept at {}", backup.display());
            }
        }
    }
    Ok(())
}

fn rollback(home: &Path, json: bool) -> anyhow::Result<()> {
    let dir = update::rollback_latest(home).context("rollback failed")?;
    if json {
        print_json(&serde_json::json!({ "restored": dir }))?;
    } else {
        println!("Restored backup {}", dir.display());
    }
    Ok(())
}
