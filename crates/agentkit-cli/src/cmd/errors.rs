use crate::output::{print_json, print_table};
use agentkit_core::tracker::{self, ErrorStatus};
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum ErrorsSubcommand {
    /// List tracked errors
    List {
        /// Filter by status (pending, recurring, resolved)
        #[arg(long)]
        status: Option<ErrorStatus>,
    },
    /// Mark an error resolved
    Resolve {
        id: String,
        /// What fixed it
        #[arg(long)]
        solution: Option<String>,
    },
    /// Turn an error into a prevention rule checked by `agentkit guard`
    Promote { id: String },
}

pub fn run(home: &Path, subcmd: ErrorsSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ErrorsSubcommand::List { status } => list(home, status, json),
        ErrorsSubcommand::Resolve { id, solution } => resolve(home, &id, solution.as_deref(), json),
        ErrorsSubcommand::Promote { id } => promote(home, &id, json),
    }
}

fn list(home: &Path, status: Option<ErrorStatus>, json: bool) -> anyhow::Result<()> {
    let errors = tracker::list(home, status).context("failed to read error database")?;
    if json {
        return print_json(&errors);
    }
    if errors.is_empty() {
        println!("No errors tracked.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = errors
        .iter()
        .map(|e| {
            vec![
                e.id.clone(),
                e.error_type.to_string(),
                e.status.to_string(),
                e.occurrences.to_string(),
                e.last_seen.format("%Y-%m-%d %H:%M").to_string(),
                e.pattern.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "TYPE", "STATUS", "SEEN", "LAST", "PATTERN"], &rows);
    Ok(())
}

fn resolve(home: &Path, id: &str, solution: Option<&str>, json: bool) -> anyhow::Result<()> {
    let record = tracker::resolve(home, id, solution)?;
    if json {
        print_json(&record)?;
    } else {
        println!("Resolved {id}");
    }
    Ok(())
}

fn promote(home: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let (rule, added) = tracker::promote(home, id)?;
    if json {
        print_json(&serde_json::json!({ "rule": rule, "added": added }))?;
    } else if added {
        println!("Prevention rule added: {}", rule.pattern);
    } else {
        println!("Prevention rule already exists: {}", rule.pattern);
    }
    Ok(())
}
