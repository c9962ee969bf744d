use crate::home::resolve_project;
use crate::output::print_json;
use agentkit_core::tracker::{self, TrackOutcome};
use std::path::Path;

/// `agentkit track` — record a command result. Never fails the calling hook
/// on a successful command: those are skipped.
pub fn run(
    home: &Path,
    command: &str,
    exit_code: &str,
    output: &str,
    project: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let project = resolve_project(project);
    let outcome = tracker::track(home, command, exit_code, output, &project.display().to_string())?;

    if json {
        return print_json(&outcome);
    }
    match outcome {
        TrackOutcome::Skipped => println!("No error detected."),
        TrackOutcome::New { error } => {
            println!("📝 New error tracked [{}]: {}", error.error_type, error.error_message);
            println!("   💡 {}", error.suggestion);
        }
        TrackOutcome::Recurring { error } => {
            println!(
                "🔁 Recurring error [{}] seen {} times: {}",
                error.error_type, error.occurrences, error.error_message
            );
            match &error.solution {
                Some(solution) => println!("   ✅ Known solution: {solution}"),
                None => println!("   💡 {}", error.suggestion),
            }
        }
    }
    Ok(())
}
