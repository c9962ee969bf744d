//! Pre-execution check of shell commands.
//!
//! Built-in dangerous patterns are checked first; learned prevention rules
//! (promoted from tracked errors) second. Matching never fails: a missing or
//! unreadable rule file simply means no learned rules.

use crate::error::Result;
use crate::io::{self, Loaded};
use crate::paths;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Built-in patterns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Blocked,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Blocked => f.write_str("BLOCKED"),
            Severity::Warning => f.write_str("WARNING"),
        }
    }
}

struct Dangerous {
    pattern: &'static str,
    warning: &'static str,
}

/// Checked in order; the first case-insensitive substring match wins.
const DANGEROUS_PATTERNS: &[Dangerous] = &[
    Dangerous {
        pattern: "rm -rf /",
        warning: "System destruction - BLOCKED",
    },
    Dangerous {
        pattern: "rm -rf ~",
        warning: "Home directory deletion - BLOCKED",
    },
    Dangerous {
        pattern: "rm -rf *",
        warning: "Mass file deletion - WARNING",
    },
    Dangerous {
        pattern: "DROP DATABASE",
        warning: "Database deletion - BLOCKED",
    },
    Dangerous {
        pattern: "DROP TABLE",
        warning: "Table deletion - WARNING",
    },
    Dangerous {
        pattern: "git push --force",
        warning: "Force push - WARNING",
    },
    Dangerous {
        pattern: "git reset --hard",
        warning: "Hard reset - WARNING",
    },
    Dangerous {
        pattern: "npm publish",
        warning: "Package publish - CONFIRMATION REQUIRED",
    },
    Dangerous {
        pattern: "chmod 777",
        warning: "Insecure permissions - WARNING",
    },
];

impl Dangerous {
    fn severity(&self) -> Severity {
        if self.warning.contains("BLOCKED") {
            Severity::Blocked
        } else {
            Severity::Warning
        }
    }
}

// ---------------------------------------------------------------------------
// Learned rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreventionRule {
    pub pattern: String,
    #[serde(default)]
    pub error_type: String,
    #[serde(default)]
    pub auto_solution: String,
}

impl PreventionRule {
    /// Literal, case-insensitive match. Placeholders left by command
    /// normalization (`{package}`, `{path}`, `{host}`, `{port}`) match any
    /// run of non-whitespace.
    pub fn matches(&self, command: &str) -> bool {
        if self.pattern.is_empty() {
            return false;
        }
        let mut expr = String::from("(?i)");
        let mut rest = self.pattern.as_str();
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            let name = &rest[start + 1..start + len];
            if matches!(name, "package" | "path" | "host" | "port") {
                expr.push_str(&regex::escape(&rest[..start]));
                expr.push_str(r"\S+");
            } else {
                expr.push_str(&regex::escape(&rest[..=start + len]));
            }
            rest = &rest[start + len + 1..];
        }
        expr.push_str(&regex::escape(rest));
        match Regex::new(&expr) {
            Ok(re) => re.is_match(command),
            Err(_) => command.to_lowercase().contains(&self.pattern.to_lowercase()),
        }
    }
}

/// `<home>/data/error-tracker.json`. Only `preventionRules` is interpreted;
/// everything else is carried through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleBook {
    #[serde(default)]
    pub prevention_rules: Vec<PreventionRule>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RuleBook {
    pub fn load(home: &Path) -> Result<Self> {
        let path = paths::error_tracker_path(home);
        let loaded = io::read_json(&path)?;
        if let Loaded::Malformed(reason) = &loaded {
            tracing::warn!(path = %path.display(), %reason, "malformed rule file, ignoring learned rules");
        }
        Ok(loaded.or_default())
    }

    pub fn save(&self, home: &Path) -> Result<()> {
        io::write_json(&paths::error_tracker_path(home), self)
    }
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub should_apply_prevention: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prevention_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl Verdict {
    pub fn allow() -> Self {
        Self::default()
    }
}

pub fn check_dangerous(command: &str) -> Option<Verdict> {
    let lower = command.to_lowercase();
    let hit = DANGEROUS_PATTERNS
        .iter()
        .find(|d| lower.contains(&d.pattern.to_lowercase()))?;
    let severity = hit.severity();
    Some(Verdict {
        should_apply_prevention: true,
        severity: Some(severity),
        warning: Some(hit.warning.to_string()),
        pattern: Some(hit.pattern.to_string()),
        blocked: severity == Severity::Blocked,
        ..Verdict::default()
    })
}

pub fn check_learned(command: &str, rules: &[PreventionRule]) -> Option<Verdict> {
    let rule = rules.iter().find(|r| r.matches(command))?;
    let action = if rule.auto_solution.is_empty() {
        "Review this command carefully".to_string()
    } else {
        rule.auto_solution.clone()
    };
    Some(Verdict {
        should_apply_prevention: true,
        prevention_action: Some(action),
        error_pattern: Some(rule.pattern.clone()),
        error_type: Some(rule.error_type.clone()),
        ..Verdict::default()
    })
}

/// Check `command` against built-in patterns, then learned rules.
pub fn check_command(home: &Path, command: &str) -> Result<Verdict> {
    if let Some(v) = check_dangerous(command) {
        return Ok(v);
    }
    let rules = RuleBook::load(home)?;
    Ok(check_learned(command, &rules.prevention_rules).unwrap_or_else(Verdict::allow))
}
