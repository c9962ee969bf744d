mod cmd;
mod home;
mod output;

use clap::{Parser, Subcommand};
use cmd::{errors::ErrorsSubcommand, session::SessionSubcommand, up::UpAction};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "agentkit",
    about = "Keep an agent configuration kit up to date and learn from failed commands",
    version,
    propagate_version = true
)]
struct Cli {
    /// Kit home directory (default: ~/.claude)
    #[arg(long, global = true, env = "AGENTKIT_HOME")]
    home: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check for kit updates and apply them
    Up {
        /// Apply without asking for confirmation
        #[arg(long, short = 'f')]
        force: bool,

        /// Directory that receives update_notification.txt (default: current directory)
        #[arg(long)]
        cwd: Option<PathBuf>,

        #[command(subcommand)]
        action: Option<UpAction>,
    },

    /// Record the result of a shell command in the error database
    Track {
        command: String,
        exit_code: String,
        output: String,
        /// Project directory (default: current directory)
        project: Option<PathBuf>,
    },

    /// Check a command against dangerous patterns and learned prevention rules
    Guard { command: String },

    /// Inspect and curate tracked errors
    Errors {
        #[command(subcommand)]
        subcommand: ErrorsSubcommand,
    },

    /// Record session start and end for a project
    Session {
        #[command(subcommand)]
        subcommand: SessionSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let result = home::resolve_home(cli.home.as_deref()).and_then(|home| match cli.command {
        Commands::Up { force, cwd, action } => {
            cmd::up::run(&home, action, force, cwd.as_deref(), cli.json)
        }
        Commands::Track {
            command,
            exit_code,
            output,
            project,
        } => cmd::track::run(
            &home,
            &command,
            &exit_code,
            &output,
            project.as_deref(),
            cli.json,
        ),
        Commands::Guard { command } => cmd::guard::run(&home, &command, cli.json),
        Commands::Errors { subcommand } => cmd::errors::run(&home, subcommand, cli.json),
        Commands::Session { subcommand } => cmd::session::run(&home, subcommand, cli.json),
    });

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
