use crate::output::print_json;
use agentkit_core::guard::{self, Severity};
use std::path::Path;

/// `agentkit guard` — always exits 0; callers act on the verdict.
pub fn run(home: &Path, command: &str, json: bool) -> anyhow::Result<()> {
    let verdict = guard::check_command(home, command)?;
    if json {
        return print_json(&verdict);
    }

    match (&verdict.severity, &verdict.prevention_action) {
        (Some(Severity::Blocked), _) => {
            println!("🚫 BLOCKED: {}", verdict.warning.as_deref().unwrap_or_default());
            println!("   Pattern: {}", verdict.pattern.as_deref().unwrap_or_default());
        }
        (Some(Severity::Warning), _) => {
            println!("⚠️ WARNING: {}", verdict.warning.as_deref().unwrap_or_default());
            println!("   Pattern: {}", verdict.pattern.as_deref().unwrap_or_default());
        }
        (None, Some(action)) => {
            println!("⚠️ PREVENTION: Known problematic pattern detected");
            println!("   Pattern: {}", verdict.error_pattern.as_deref().unwrap_or_default());
            println!("   Suggestion: {action}");
        }
        (None, None) => println!("OK"),
    }
    Ok(())
}
