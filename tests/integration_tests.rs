//! Integration tests for the conductor CLI
//!
//! Each test runs the binary against a throwaway project directory. The
//! global directive manifest is isolated through `XDG_CONFIG_HOME`.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to create a conductor Command rooted at `dir`
fn conductor(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("conductor");
    cmd.current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path().join("xdg"))
        .env("CONDUCTOR_ADAPTER_CMD", "true")
        .env_remove("RUST_LOG");
    cmd
}

fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

fn write_workflow(dir: &Path, name: &str, body: &str) -> String {
    fs::write(dir.join(name), body).unwrap();
    name.to_string()
}

/// A stand-in model CLI that always answers "model says hi".
fn write_fake_model(dir: &Path) -> String {
    let path = dir.join("fake-model.sh");
    fs::write(
        &path,
        r#"#!/bin/sh
cat > /dev/null
echo '{"type":"result","subtype":"success","result":"model says hi","is_error":false,"usage":{"input_tokens":10,"output_tokens":2}}'
"#,
    )
    .unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
    }
    path.to_string_lossy().to_string()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_conductor_help() {
        let dir = create_temp_project();
        conductor(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("resume"));
    }

    #[test]
    fn test_conductor_version() {
        let dir = create_temp_project();
        conductor(&dir).arg("--version").assert().success();
    }

    #[test]
    fn test_unknown_subcommand_fails() {
        let dir = create_temp_project();
        conductor(&dir).arg("frobnicate").assert().failure();
    }
}

// =============================================================================
// Configuration
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_validate_without_file() {
        let dir = create_temp_project();
        conductor(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No conductor.toml found"));
    }

    #[test]
    fn test_config_init_then_validate() {
        let dir = create_temp_project();
        conductor(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created conductor.toml"));
        assert!(dir.path().join(".conductor/conductor.toml").exists());

        conductor(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid."));

        conductor(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join(".conductor")).unwrap();
        fs::write(
            dir.path().join(".conductor/conductor.toml"),
            "[context]\nmin_density = 150.0\n",
        )
        .unwrap();

        conductor(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("min_density"));
    }

    #[test]
    fn test_config_show_effective_command() {
        let dir = create_temp_project();
        conductor(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("adapter.command = \"true\""));
    }
}

// =============================================================================
// Directive manifests
// =============================================================================

mod directives {
    use super::*;

    fn write_manifest(dir: &Path, body: &str) {
        fs::create_dir_all(dir.join(".conductor")).unwrap();
        fs::write(dir.join(".conductor/directives.yaml"), body).unwrap();
    }

    #[test]
    fn test_directives_list_empty() {
        let dir = create_temp_project();
        conductor(&dir)
            .args(["directives", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No directive manifests found."));
    }

    #[test]
    fn test_directives_list_and_validate() {
        let dir = create_temp_project();
        write_manifest(
            dir.path(),
            r#"directives:
  greet:
    hello:
      handler: "echo hello {value}"
      description: Say hello
"#,
        );

        conductor(&dir)
            .args(["directives", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("greet:hello"))
            .stdout(predicate::str::contains("Say hello"));

        conductor(&dir)
            .args(["directives", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("1 handler(s)"));
    }

    #[test]
    fn test_directives_validate_rejects_unknown_capability() {
        let dir = create_temp_project();
        write_manifest(
            dir.path(),
            r#"directives:
  greet:
    hello:
      handler: "echo hello"
      requires: [teleport]
"#,
        );

        conductor(&dir)
            .args(["directives", "validate"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("teleport"));
    }
}

// =============================================================================
// Running workflows
// =============================================================================

mod workflows {
    use super::*;

    #[test]
    fn test_checkpoints_without_sessions() {
        let dir = create_temp_project();
        conductor(&dir)
            .arg("checkpoints")
            .assert()
            .success()
            .stdout(predicate::str::contains("No sessions found."));
    }

    #[test]
    fn test_run_completes_and_records_checkpoint() {
        let dir = create_temp_project();
        let workflow = write_workflow(
            dir.path(),
            "flow.json",
            r#"{"steps": [
                {"type": "run", "command": "echo built > built.txt"},
                {"type": "checkpoint", "name": "after-build"}
            ]}"#,
        );

        conductor(&dir)
            .args(["--quiet", "run", &workflow, "--session", "demo"])
            .assert()
            .success()
            .stdout(predicate::str::contains("completed"));

        assert!(dir.path().join("built.txt").exists());
        conductor(&dir)
            .args(["checkpoints", "demo"])
            .assert()
            .success()
            .stdout(predicate::str::contains("after-build"));
    }

    #[test]
    fn test_run_refuses_existing_session() {
        let dir = create_temp_project();
        let workflow = write_workflow(
            dir.path(),
            "flow.json",
            r#"{"steps": [{"type": "checkpoint", "name": "only"}]}"#,
        );

        conductor(&dir)
            .args(["--quiet", "run", &workflow, "--session", "again"])
            .assert()
            .success();
        conductor(&dir)
            .args(["--quiet", "run", &workflow, "--session", "again"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("conductor resume"));
    }

    #[test]
    fn test_failing_command_fails_session() {
        let dir = create_temp_project();
        let workflow = write_workflow(
            dir.path(),
            "flow.yaml",
            "steps:\n  - type: run\n    command: exit 3\n",
        );

        conductor(&dir)
            .args(["--quiet", "run", &workflow, "--session", "broken"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Session broken failed"))
            .stderr(predicate::str::contains("exit code 3"));
    }

    #[test]
    fn test_on_failure_block_recovers() {
        let dir = create_temp_project();
        let workflow = write_workflow(
            dir.path(),
            "flow.yaml",
            r#"steps:
  - type: run
    command: exit 1
    on_failure:
      - type: checkpoint
        name: recovered
"#,
        );

        conductor(&dir)
            .args(["--quiet", "run", &workflow, "--session", "recover"])
            .assert()
            .success();
        conductor(&dir)
            .args(["checkpoints", "recover"])
            .assert()
            .success()
            .stdout(predicate::str::contains("recovered"));
    }

    #[test]
    fn test_pause_blocks_resume_until_review_cleared() {
        let dir = create_temp_project();
        let workflow = write_workflow(
            dir.path(),
            "flow.json",
            r#"{"steps": [
                {"type": "pause", "message": "check the diff"},
                {"type": "run", "command": "touch resumed.txt"}
            ]}"#,
        );

        conductor(&dir)
            .args(["--quiet", "run", &workflow, "--session", "gate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("paused"));
        assert!(!dir.path().join("resumed.txt").exists());

        conductor(&dir)
            .args(["--quiet", "resume", "gate", &workflow])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Review pending"));

        conductor(&dir)
            .args(["review", "clear", "gate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 1 review marker(s)"));

        conductor(&dir)
            .args(["--quiet", "resume", "gate", &workflow])
            .assert()
            .success()
            .stdout(predicate::str::contains("completed"));
        assert!(dir.path().join("resumed.txt").exists());
    }

    #[test]
    fn test_resume_unknown_session_fails() {
        let dir = create_temp_project();
        let workflow = write_workflow(dir.path(), "flow.json", r#"{"steps": []}"#);

        conductor(&dir)
            .args(["--quiet", "resume", "ghost", &workflow])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Cannot resume session ghost"));
    }

    #[test]
    fn test_prompt_response_written_to_output() {
        let dir = create_temp_project();
        let model = write_fake_model(dir.path());
        let workflow = write_workflow(
            dir.path(),
            "flow.json",
            r#"{"output": "transcript.md", "steps": [
                {"type": "prompt", "text": "say hi"},
                {"type": "checkpoint", "name": "answered"}
            ]}"#,
        );

        conductor(&dir)
            .env("CONDUCTOR_ADAPTER_CMD", &model)
            .args(["--quiet", "run", &workflow, "--session", "chat"])
            .assert()
            .success();

        let transcript = fs::read_to_string(dir.path().join("transcript.md")).unwrap();
        assert!(transcript.contains("model says hi"));
    }
}
