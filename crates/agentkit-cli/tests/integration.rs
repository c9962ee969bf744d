#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

/// A kit home at v1.2.0 (revision 10) and a mirror at v1.3.0 (revision 15)
/// in which two managed files differ.
struct Fixture {
    home: TempDir,
    mirror: TempDir,
    work: TempDir,
}

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

fn read(root: &Path, rel: &str) -> String {
    std::fs::read_to_string(root.join(rel)).unwrap()
}

fn fixture() -> Fixture {
    let fx = Fixture {
        home: TempDir::new().unwrap(),
        mirror: TempDir::new().unwrap(),
        work: TempDir::new().unwrap(),
    };
    write(
        fx.home.path(),
        "agentkit.yaml",
        &format!(
            "update:\n  source:\n    type: mirror\n    dir: '{}'\n",
            fx.mirror.path().display()
        ),
    );
    write(
        fx.home.path(),
        "data/install.json",
        r#"{"version": "v1.2.0", "revision": 10}"#,
    );
    write(fx.home.path(), "agents/frontend-specialist.md", "old frontend");
    write(fx.home.path(), "agents/backend-specialist.md", "backend");

    write(
        fx.mirror.path(),
        "release.json",
        r#"{"version": "v1.3.0", "revision": 15}"#,
    );
    write(fx.mirror.path(), "agents/frontend-specialist.md", "new frontend");
    write(fx.mirror.path(), "agents/backend-specialist.md", "backend");
    write(fx.mirror.path(), "skills/nextjs/SKILL.md", "nextjs skill");
    fx
}

fn agentkit(fx: &Fixture) -> Command {
    let mut cmd = Command::cargo_bin("agentkit").unwrap();
    cmd.current_dir(fx.work.path())
        .env("AGENTKIT_HOME", fx.home.path())
        .env_remove("RUST_LOG");
    cmd
}

// ---------------------------------------------------------------------------
// agentkit up check
// ---------------------------------------------------------------------------

#[test]
fn check_reports_version_pair_and_changed_files() {
    let fx = fixture();
    agentkit(&fx)
        .args(["up", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("v1.2.0 → v1.3.0"))
        .stdout(predicate::str::contains("5 new commit(s)"))
        .stdout(predicate::str::contains("agents/frontend-specialist.md"))
        .stdout(predicate::str::contains("skills/nextjs/SKILL.md"))
        .stdout(predicate::str::contains("backend-specialist").not());

    assert_eq!(read(fx.home.path(), "agents/frontend-specialist.md"), "old frontend");
    assert!(!fx.work.path().join("update_notification.txt").exists());
}

#[test]
fn check_json_output() {
    let fx = fixture();
    let out = agentkit(&fx).args(["--json", "up", "check"]).output().unwrap();
    assert!(out.status.success());
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["status"], "update_available");
    assert_eq!(report["version"]["current"], "v1.2.0");
    assert_eq!(report["version"]["latest"], "v1.3.0");
    assert_eq!(report["version"]["behind"], 5);
    assert_eq!(
        report["changed"],
        serde_json::json!(["agents/frontend-specialist.md", "skills/nextjs/SKILL.md"])
    );
}

#[test]
fn check_without_release_marker_is_not_fatal() {
    let fx = fixture();
    std::fs::remove_file(fx.mirror.path().join("release.json")).unwrap();
    agentkit(&fx)
        .args(["up", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no update information available"));
}

#[test]
fn unreachable_source_reports_check_failed() {
    let fx = fixture();
    let mirror = fx.mirror.path().to_path_buf();
    std::fs::remove_dir_all(&mirror).unwrap();

    agentkit(&fx)
        .args(["up", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("check failed"));

    agentkit(&fx)
        .args(["up", "--force"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unreachable"));
}

#[test]
fn missing_source_config_fails() {
    let fx = fixture();
    std::fs::remove_file(fx.home.path().join("agentkit.yaml")).unwrap();
    agentkit(&fx)
        .args(["up", "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no update source configured"));
}

// ---------------------------------------------------------------------------
// agentkit up
// ---------------------------------------------------------------------------

#[test]
fn forced_update_applies_changes_and_writes_notification() {
    let fx = fixture();
    agentkit(&fx)
        .args(["up", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated 2 file(s)"));

    assert_eq!(read(fx.home.path(), "agents/frontend-specialist.md"), "new frontend");
    assert_eq!(read(fx.home.path(), "skills/nextjs/SKILL.md"), "nextjs skill");
    assert_eq!(read(fx.home.path(), "agents/backend-specialist.md"), "backend");

    let note = read(fx.work.path(), "update_notification.txt");
    assert!(note.contains("v1.2.0 → v1.3.0"));
    assert!(note.contains("agents/frontend-specialist.md"));
    assert!(note.contains("skills/nextjs/SKILL.md"));

    let state: serde_json::Value =
        serde_json::from_str(&read(fx.home.path(), "data/install.json")).unwrap();
    assert_eq!(state["version"], "v1.3.0");
    assert_eq!(state["revision"], 15);
}

#[test]
fn notification_goes_to_cwd_flag() {
    let fx = fixture();
    let elsewhere = TempDir::new().unwrap();
    agentkit(&fx)
        .args(["up", "--force", "--cwd"])
        .arg(elsewhere.path())
        .assert()
        .success();
    assert!(elsewhere.path().join("update_notification.txt").exists());
    assert!(!fx.work.path().join("update_notification.txt").exists());
}

#[test]
fn second_update_only_rewrites_notification() {
    let fx = fixture();
    agentkit(&fx).args(["up", "--force"]).assert().success();
    std::fs::remove_file(fx.work.path().join("update_notification.txt")).unwrap();

    agentkit(&fx)
        .args(["up", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to update"));
    let note = read(fx.work.path(), "update_notification.txt");
    assert!(note.contains("No files changed."));
    assert_eq!(read(fx.home.path(), "agents/frontend-specialist.md"), "new frontend");
}

#[test]
fn backup_failure_aborts_without_changes() {
    let fx = fixture();
    write(fx.home.path(), ".agentkit_backup", "disk full");

    agentkit(&fx)
        .args(["up", "--force"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("backup failed"));

    assert_eq!(read(fx.home.path(), "agents/frontend-specialist.md"), "old frontend");
    assert!(!fx.home.path().join("skills").exists());
    assert!(!fx.work.path().join("update_notification.txt").exists());
    let state: serde_json::Value =
        serde_json::from_str(&read(fx.home.path(), "data/install.json")).unwrap();
    assert_eq!(state["version"], "v1.2.0");
}

#[test]
fn unconfirmed_update_needs_a_terminal() {
    let fx = fixture();
    agentkit(&fx)
        .arg("up")
        .assert()
        .failure()
        .stderr(predicate::str::contains("rerun with --force"));
    assert_eq!(read(fx.home.path(), "agents/frontend-specialist.md"), "old frontend");
}

#[test]
fn rollback_restores_previous_files() {
    let fx = fixture();
    agentkit(&fx).args(["up", "--force"]).assert().success();

    agentkit(&fx)
        .args(["up", "rollback"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Restored backup"));

    assert_eq!(read(fx.home.path(), "agents/frontend-specialist.md"), "old frontend");
    assert!(!fx.home.path().join("skills/nextjs").exists());
    let state: serde_json::Value =
        serde_json::from_str(&read(fx.home.path(), "data/install.json")).unwrap();
    assert_eq!(state["version"], "v1.2.0");
}

#[test]
fn rollback_without_backup_fails() {
    let fx = fixture();
    agentkit(&fx)
        .args(["up", "rollback"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no backup found"));
}

#[test]
fn sync_reinstalls_every_managed_file() {
    let fx = fixture();
    agentkit(&fx).args(["up", "--force"]).assert().success();
    write(fx.home.path(), "agents/backend-specialist.md", "local edit");

    agentkit(&fx)
        .args(["up", "--force", "sync"])
        .assert()
        .success();
    assert_eq!(read(fx.home.path(), "agents/backend-specialist.md"), "backend");
}

// ---------------------------------------------------------------------------
// agentkit track / errors
// ---------------------------------------------------------------------------

#[test]
fn track_creates_missing_database() {
    let fx = fixture();
    assert!(!fx.home.path().join("data/error-database.json").exists());

    let out = agentkit(&fx)
        .args([
            "--json",
            "track",
            "npm install left-pad",
            "1",
            "npm ERR! 404 Not Found - left-pad",
        ])
        .output()
        .unwrap();
    assert!(out.status.success());
    let outcome: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(outcome["outcome"], "new");
    assert_eq!(outcome["error"]["errorType"], "NPM_ERROR");
    assert!(fx.home.path().join("data/error-database.json").exists());
}

#[test]
fn track_skips_successful_commands() {
    let fx = fixture();
    agentkit(&fx)
        .args(["track", "ls", "0", "README.md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No error detected"));
    assert!(!fx.home.path().join("data/error-database.json").exists());
}

#[test]
fn resolve_and_promote_feed_the_guard() {
    let fx = fixture();
    let out = agentkit(&fx)
        .args(["--json", "track", "pip install numpy", "1", "error: externally-managed-environment"])
        .output()
        .unwrap();
    let outcome: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let id = outcome["error"]["id"].as_str().unwrap().to_string();

    agentkit(&fx)
        .args(["errors", "resolve", &id, "--solution", "use a virtualenv"])
        .assert()
        .success();
    agentkit(&fx)
        .args(["errors", "list", "--status", "resolved"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pip install {package}"));
    agentkit(&fx).args(["errors", "promote", &id]).assert().success();

    let out = agentkit(&fx)
        .args(["--json", "guard", "pip install pandas"])
        .output()
        .unwrap();
    let verdict: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(verdict["shouldApplyPrevention"], true);
    assert_eq!(verdict["preventionAction"], "use a virtualenv");
}

#[test]
fn resolve_unknown_error_fails() {
    let fx = fixture();
    agentkit(&fx)
        .args(["errors", "resolve", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error record not found"));
}

#[test]
fn invalid_status_filter_is_rejected() {
    let fx = fixture();
    agentkit(&fx)
        .args(["errors", "list", "--status", "open"])
        .assert()
        .failure();
}

// ---------------------------------------------------------------------------
// agentkit guard
// ---------------------------------------------------------------------------

#[test]
fn guard_blocks_destructive_command() {
    let fx = fixture();
    agentkit(&fx)
        .args(["guard", "rm -rf /"])
        .assert()
        .success()
        .stdout(predicate::str::contains("BLOCKED"));

    let out = agentkit(&fx)
        .args(["--json", "guard", "rm -rf /"])
        .output()
        .unwrap();
    let verdict: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(verdict["blocked"], true);
    assert_eq!(verdict["severity"], "BLOCKED");
}

#[test]
fn guard_allows_harmless_command() {
    let fx = fixture();
    let out = agentkit(&fx)
        .args(["--json", "guard", "cargo test"])
        .output()
        .unwrap();
    let verdict: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(verdict, serde_json::json!({ "shouldApplyPrevention": false }));
}

// ---------------------------------------------------------------------------
// agentkit session
// ---------------------------------------------------------------------------

#[test]
fn session_start_and_end() {
    let fx = fixture();
    let project = fx.work.path().join("crate-app");
    write(&project, "Cargo.toml", "[package]\nname = \"app\"\n");

    let out = agentkit(&fx)
        .args(["session", "start", "--silent"])
        .arg(&project)
        .output()
        .unwrap();
    assert!(out.status.success());
    let stats: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(stats["projectName"], "crate-app");
    assert_eq!(stats["analysis"]["projectType"], "rust");
    assert!(fx
        .home
        .path()
        .join("data/projects/crate-app/session-stats.json")
        .exists());
    assert!(fx.home.path().join("data/current-project.json").exists());

    agentkit(&fx)
        .args(["session", "end"])
        .arg(&project)
        .assert()
        .success()
        .stdout(predicate::str::contains("Session completed"))
        .stdout(predicate::str::contains("Duration: 0:00:"));
}
