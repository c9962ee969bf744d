use crate::home::resolve_project;
use crate::output::print_json;
use agentkit_core::{config::Config, session};
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum SessionSubcommand {
    /// Snapshot the project at session start
    Start {
        /// Project directory (default: current directory)
        project: Option<PathBuf>,
        /// Print only the machine-readable record
        #[arg(long)]
        silent: bool,
    },
    /// Close the session and report its duration
    End {
        project: Option<PathBuf>,
        #[arg(long)]
        silent: bool,
    },
}

pub fn run(home: &Path, subcmd: SessionSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        SessionSubcommand::Start { project, silent } => {
            start(home, &resolve_project(project.as_deref()), json || silent)
        }
        SessionSubcommand::End { project, silent } => {
            end(home, &resolve_project(project.as_deref()), json || silent)
        }
    }
}

fn start(home: &Path, project: &Path, quiet: bool) -> anyhow::Result<()> {
    let config = Config::load(home)?;
    let stats = session::start(
        home,
        project,
        config.session.recent_errors,
        config.session.detect_depth,
    )?;
    if quiet {
        return print_json(&stats);
    }

    println!("📁 Project: {}", stats.project_name);
    if let Some(framework) = &stats.analysis.framework {
        println!("🔧 Framework: {framework}");
    }
    if let Some(platform) = &stats.analysis.platform {
        println!("🎯 Platform: {platform}");
    }
    if !stats.recent_errors.is_empty() {
        println!("\n⚠️ Recent errors in this project: {}", stats.recent_errors.len());
    }
    Ok(())
}

fn end(home: &Path, project: &Path, quiet: bool) -> anyhow::Result<()> {
    let ended = session::end(home, project)?;
    if quiet {
        return print_json(&ended);
    }
    println!("✅ Session completed");
    if let Some(duration) = &ended.duration {
        println!("⏱️ Duration: {duration}");
    }
    Ok(())
}
