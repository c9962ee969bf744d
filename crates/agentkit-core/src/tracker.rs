//! Error tracker: a JSON log of failed shell commands.
//!
//! Layout:
//!   <home>/data/error-database.json   — `{ version, errors: [...], lastUpdated }`
//!
//! A failure is classified by the first matching output pattern, its command
//! is generalized into a pattern (`npm install {package}`, `:{port}`, …), and
//! repeats of a known failure bump its occurrence counter instead of adding a
//! record. Three occurrences mark a record `recurring`.

use crate::error::{KitError, Result};
use crate::guard::{PreventionRule, RuleBook};
use crate::io::{self, Loaded};
use crate::paths;
use chrono::{DateTime, Local};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

const DB_VERSION: &str = "1.0";
const MESSAGE_LIMIT: usize = 200;
const DEDUP_PREFIX: usize = 50;
const RECURRING_AT: u32 = 3;
const DEFAULT_SUGGESTION: &str = "Review the error message and check documentation.";

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "NPM_ERROR")]
    Npm,
    TypeScript,
    Build,
    Permission,
    Network,
    Syntax,
    Runtime,
    Database,
    Git,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl ErrorKind {
    /// Detection order; the first match wins.
    const DETECTION_ORDER: [ErrorKind; 9] = [
        ErrorKind::Npm,
        ErrorKind::TypeScript,
        ErrorKind::Build,
        ErrorKind::Permission,
        ErrorKind::Network,
        ErrorKind::Syntax,
        ErrorKind::Runtime,
        ErrorKind::Database,
        ErrorKind::Git,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Npm => "NPM_ERROR",
            ErrorKind::TypeScript => "TypeScript",
            ErrorKind::Build => "Build",
            ErrorKind::Permission => "Permission",
            ErrorKind::Network => "Network",
            ErrorKind::Syntax => "Syntax",
            ErrorKind::Runtime => "Runtime",
            ErrorKind::Database => "Database",
            ErrorKind::Git => "Git",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }

    fn pattern(&self) -> Option<&'static str> {
        Some(match self {
            ErrorKind::Npm => r"(?i)npm ERR!|ERESOLVE|E404|ENOENT",
            ErrorKind::TypeScript => r"(?i)TS\d+|type .+ is not assignable|Cannot find module",
            ErrorKind::Build => r"(?i)build failed|compilation error|webpack|vite.*error",
            ErrorKind::Permission => r"(?i)EACCES|permission denied|access denied",
            ErrorKind::Network => r"(?i)ECONNREFUSED|timeout|ETIMEDOUT|getaddrinfo",
            ErrorKind::Syntax => r"(?i)SyntaxError|Unexpected token|ParseError",
            ErrorKind::Runtime => r"(?i)ReferenceError|TypeError|Cannot read property",
            ErrorKind::Database => r"(?i)ECONNREFUSED.*:5432|connection refused|database.*error",
            ErrorKind::Git => r"(?i)fatal:|error: .+git",
            ErrorKind::Unknown => return None,
        })
    }

    pub fn category(&self) -> &'static str {
        match self {
            ErrorKind::Npm => "NPM",
            ErrorKind::TypeScript => "TypeScript",
            ErrorKind::Build => "Build",
            ErrorKind::Permission => "System",
            ErrorKind::Network => "Network",
            ErrorKind::Syntax | ErrorKind::Runtime => "Code",
            ErrorKind::Database => "Database",
            ErrorKind::Git => "Git",
            ErrorKind::Unknown => "Unknown",
        }
    }

    /// A canned remediation, for the kinds that have one.
    pub fn auto_solution(&self) -> Option<&'static str> {
        match self {
            ErrorKind::Npm => {
                Some("npm cache clean --force && rm -rf node_modules && npm install")
            }
            ErrorKind::TypeScript => Some("npx tsc --noEmit to check types"),
            ErrorKind::Build => Some("Check build configuration and dependencies"),
            ErrorKind::Permission => {
                Some("Run with elevated permissions or check file ownership")
            }
            ErrorKind::Network => Some("Check network connection and firewall settings"),
            ErrorKind::Database => Some("Ensure database server is running: docker-compose up -d"),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn kind_regexes() -> &'static Vec<(ErrorKind, Regex)> {
    static RES: OnceLock<Vec<(ErrorKind, Regex)>> = OnceLock::new();
    RES.get_or_init(|| {
        ErrorKind::DETECTION_ORDER
            .iter()
            .filter_map(|k| k.pattern().map(|p| (*k, Regex::new(p).unwrap())))
            .collect()
    })
}

pub fn detect_kind(output: &str) -> ErrorKind {
    kind_regexes()
        .iter()
        .find(|(_, re)| re.is_match(output))
        .map(|(k, _)| *k)
        .unwrap_or(ErrorKind::Unknown)
}

/// Tried in order: an `error:` line anywhere in the output beats an earlier
/// `ERR!` or `failed:` line.
fn message_regexes() -> &'static Vec<Regex> {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"(?i)error[:\s]+(.+?)(?:\n|$)",
            r"(?i)ERR![:\s]+(.+?)(?:\n|$)",
            r"(?i)failed[:\s]+(.+?)(?:\n|$)",
        ]
        .into_iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

/// The message after the highest-priority marker (`error`, then `ERR!`,
/// then `failed`), capped at 200 characters. Falls back to the head of the
/// output.
pub fn extract_message(output: &str) -> String {
    let hit = message_regexes()
        .iter()
        .find_map(|re| re.captures(output).and_then(|c| c.get(1)));
    if let Some(m) = hit {
        return truncate(m.as_str().trim(), MESSAGE_LIMIT);
    }
    let head = truncate(output, MESSAGE_LIMIT);
    let head = head.trim();
    if head.is_empty() {
        "Unknown error".to_string()
    } else {
        head.to_string()
    }
}

fn normalize_rules() -> &'static Vec<(Regex, &'static str)> {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (r"npm install\s+[\w@/-]+", "npm install {package}"),
            (r"pip install\s+[\w-]+", "pip install {package}"),
            (r"[A-Za-z]:\\[\w\\/.-]+", "{path}"),
            (r":\d{4,5}", ":{port}"),
            (r"localhost|127\.0\.0\.1", "{host}"),
        ]
        .into_iter()
        .map(|(p, r)| (Regex::new(p).unwrap(), r))
        .collect()
    })
}

/// Generalize a command so repeats with different packages, paths, hosts
/// or ports collapse onto one pattern.
pub fn normalize_command(command: &str) -> String {
    let mut normalized = command.to_string();
    for (re, replacement) in normalize_rules() {
        normalized = re.replace_all(&normalized, *replacement).into_owned();
    }
    normalized.trim().to_string()
}

fn failure_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"error|Error|ERROR|failed|Failed").unwrap())
}

/// Whether a command result counts as a failure worth tracking.
pub fn is_failure(exit_code: &str, output: &str) -> bool {
    exit_code.trim() != "0" || failure_marker_re().is_match(output)
}

/// Non-negative integer exit codes are kept; anything else records as 1.
fn parse_exit_code(raw: &str) -> i32 {
    raw.trim().parse::<i32>().ok().filter(|c| *c >= 0).unwrap_or(1)
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStatus {
    Pending,
    Recurring,
    Resolved,
}

impl std::fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorStatus::Pending => f.write_str("pending"),
            ErrorStatus::Recurring => f.write_str("recurring"),
            ErrorStatus::Resolved => f.write_str("resolved"),
        }
    }
}

impl std::str::FromStr for ErrorStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "pending" => Ok(ErrorStatus::Pending),
            "recurring" => Ok(ErrorStatus::Recurring),
            "resolved" => Ok(ErrorStatus::Resolved),
            other => Err(format!(
                "unknown status '{other}': must be pending, recurring, or resolved"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub id: String,
    pub command: String,
    pub pattern: String,
    pub error_message: String,
    pub error_type: ErrorKind,
    pub error_category: String,
    pub suggestion: String,
    #[serde(default)]
    pub project: String,
    #[serde(with = "crate::timestamp")]
    pub timestamp: DateTime<Local>,
    #[serde(with = "crate::timestamp")]
    pub last_seen: DateTime<Local>,
    #[serde(default)]
    pub solution: Option<String>,
    pub status: ErrorStatus,
    #[serde(default = "default_occurrences")]
    pub occurrences: u32,
    #[serde(default = "default_exit_code")]
    pub exit_code: i32,
}

fn default_occurrences() -> u32 {
    1
}

fn default_exit_code() -> i32 {
    1
}

impl ErrorRecord {
    fn matches(&self, pattern: &str, kind: ErrorKind, message: &str) -> bool {
        self.pattern == pattern
            || (self.error_type == kind
                && truncate(&self.error_message, DEDUP_PREFIX) == truncate(message, DEDUP_PREFIX))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDatabase {
    #[serde(default = "default_db_version")]
    pub version: String,
    #[serde(default)]
    pub errors: Vec<ErrorRecord>,
    #[serde(default, with = "crate::timestamp::option")]
    pub last_updated: Option<DateTime<Local>>,
    /// Keys written by other tools, preserved on rewrite.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_db_version() -> String {
    DB_VERSION.to_string()
}

impl Default for ErrorDatabase {
    fn default() -> Self {
        Self {
            version: default_db_version(),
            errors: Vec::new(),
            last_updated: None,
            extra: serde_json::Map::new(),
        }
    }
}

impl ErrorDatabase {
    /// Load the database. Missing means empty; a file that does not parse is
    /// moved aside to `error-database.json.corrupt` and treated as empty.
    pub fn load(home: &Path) -> Result<Self> {
        let path = paths::error_db_path(home);
        match io::read_json(&path)? {
            Loaded::Present(db) => Ok(db),
            Loaded::Missing => Ok(Self::default()),
            Loaded::Malformed(reason) => {
                let aside = path.with_extension("json.corrupt");
                tracing::warn!(path = %path.display(), %reason, aside = %aside.display(), "malformed error database, starting fresh");
                if let Err(e) = std::fs::rename(&path, &aside) {
                    tracing::warn!(error = %e, "could not move malformed error database aside");
                }
                Ok(Self::default())
            }
        }
    }

    pub fn save(&mut self, home: &Path) -> Result<()> {
        self.last_updated = Some(Local::now());
        io::write_json(&paths::error_db_path(home), self)
    }

    pub fn find(&self, id: &str) -> Option<&ErrorRecord> {
        self.errors.iter().find(|e| e.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Result<&mut ErrorRecord> {
        self.errors
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| KitError::ErrorNotFound(id.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TrackOutcome {
    /// Exit code 0 and no failure marker in the output.
    Skipped,
    New { error: ErrorRecord },
    Recurring { error: ErrorRecord },
}

/// Record a command result in the error database.
pub fn track(
    home: &Path,
    command: &str,
    exit_code: &str,
    output: &str,
    project: &str,
) -> Result<TrackOutcome> {
    if !is_failure(exit_code, output) {
        return Ok(TrackOutcome::Skipped);
    }

    let mut db = ErrorDatabase::load(home)?;
    let kind = detect_kind(output);
    let message = extract_message(output);
    let pattern = normalize_command(command);
    let now = Local::now();

    let outcome = if let Some(existing) = db
        .errors
        .iter_mut()
        .find(|e| e.matches(&pattern, kind, &message))
    {
        existing.occurrences += 1;
        existing.last_seen = now;
        if existing.occurrences >= RECURRING_AT && existing.status != ErrorStatus::Resolved {
            existing.status = ErrorStatus::Recurring;
        }
        tracing::debug!(id = %existing.id, occurrences = existing.occurrences, "repeat error");
        TrackOutcome::Recurring {
            error: existing.clone(),
        }
    } else {
        let record = ErrorRecord {
            id: uuid::Uuid::new_v4().to_string(),
            command: command.to_string(),
            pattern,
            error_message: message,
            error_type: kind,
            error_category: kind.category().to_string(),
            suggestion: kind.auto_solution().unwrap_or(DEFAULT_SUGGESTION).to_string(),
            project: project.to_string(),
            timestamp: now,
            last_seen: now,
            solution: None,
            status: ErrorStatus::Pending,
            occurrences: 1,
            exit_code: parse_exit_code(exit_code),
        };
        db.errors.push(record.clone());
        tracing::debug!(id = %record.id, kind = %kind, "new error");
        TrackOutcome::New { error: record }
    };

    db.save(home)?;
    Ok(outcome)
}

/// Errors, optionally filtered by status, in insertion order.
pub fn list(home: &Path, status: Option<ErrorStatus>) -> Result<Vec<ErrorRecord>> {
    let db = ErrorDatabase::load(home)?;
    Ok(db
        .errors
        .into_iter()
        .filter(|e| status.map_or(true, |s| e.status == s))
        .collect())
}

/// Mark an error resolved, optionally recording what fixed it.
pub fn resolve(home: &Path, id: &str, solution: Option<&str>) -> Result<ErrorRecord> {
    let mut db = ErrorDatabase::load(home)?;
    let record = db.find_mut(id)?;
    record.status = ErrorStatus::Resolved;
    if let Some(s) = solution {
        record.solution = Some(s.to_string());
    }
    let record = record.clone();
    db.save(home)?;
    Ok(record)
}

/// Turn a tracked error into a prevention rule the guard matches against.
/// Returns `false` when a rule with the same pattern already exists.
pub fn promote(home: &Path, id: &str) -> Result<(PreventionRule, bool)> {
    let db = ErrorDatabase::load(home)?;
    let record = db
        .find(id)
        .ok_or_else(|| KitError::ErrorNotFound(id.to_string()))?;
    let rule = PreventionRule {
        pattern: record.pattern.clone(),
        error_type: record.error_type.as_str().to_string(),
        auto_solution: record
            .solution
            .clone()
            .unwrap_or_else(|| record.suggestion.clone()),
    };

    let mut rules = RuleBook::load(home)?;
    if rules.prevention_rules.iter().any(|r| r.pattern == rule.pattern) {
        return Ok((rule, false));
    }
    rules.prevention_rules.push(rule.clone());
    rules.save(home)?;
    tracing::debug!(pattern = %rule.pattern, "prevention rule added");
    Ok((rule, true))
}
