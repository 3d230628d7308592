//! Directive handler execution.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::types::{Capability, DirectiveHandler, DirectiveResult};
use crate::process::run_command;

/// Values available to a handler at execution time.
#[derive(Debug, Clone)]
pub struct DirectiveContext<'a> {
    pub workspace_root: &'a Path,
    pub value: &'a str,
    /// Adapter session name, exposed only to handlers requiring `adapter_access`
    pub adapter_session: Option<&'a str>,
}

/// Resolve the repository root for `{root}`, falling back to the workspace.
pub fn repo_root(workspace_root: &Path) -> PathBuf {
    git2::Repository::discover(workspace_root)
        .ok()
        .and_then(|repo| repo.workdir().map(Path::to_path_buf))
        .map(|p| {
            let s = p.to_string_lossy();
            PathBuf::from(s.trim_end_matches('/'))
        })
        .unwrap_or_else(|| workspace_root.to_path_buf())
}

/// Substitute `{root}`, `{workspace}`, `{value}` and `{directive}`.
pub fn render_command(handler: &DirectiveHandler, root: &Path, ctx: &DirectiveContext<'_>) -> String {
    handler
        .command_template
        .replace("{root}", &root.to_string_lossy())
        .replace("{workspace}", &ctx.workspace_root.to_string_lossy())
        .replace("{directive}", &handler.name)
        .replace("{value}", ctx.value)
}

/// Run a handler. Never returns an error; failures are encoded in the result.
pub async fn execute(
    handler: &DirectiveHandler,
    ctx: &DirectiveContext<'_>,
    default_timeout: Duration,
    timeout_override: Option<Duration>,
) -> DirectiveResult {
    let root = repo_root(ctx.workspace_root);
    let command = render_command(handler, &root, ctx);
    let timeout = timeout_override
        .or(handler.timeout)
        .unwrap_or(default_timeout);

    let mut env = vec![
        ("CONDUCTOR_DIRECTIVE".to_string(), handler.key()),
        ("CONDUCTOR_DIRECTIVE_VALUE".to_string(), ctx.value.to_string()),
        (
            "CONDUCTOR_WORKSPACE".to_string(),
            ctx.workspace_root.to_string_lossy().to_string(),
        ),
        ("CONDUCTOR_ROOT".to_string(), root.to_string_lossy().to_string()),
    ];
    if handler.requires(Capability::AdapterAccess)
        && let Some(session) = ctx.adapter_session
    {
        env.push(("CONDUCTOR_ADAPTER_SESSION".to_string(), session.to_string()));
    }

    tracing::debug!(directive = %handler.key(), %command, ?timeout, "executing directive");
    let output = run_command(&command, ctx.workspace_root, &env, Some(timeout)).await;

    let result = DirectiveResult {
        success: output.success(),
        stdout: output.stdout,
        stderr: output.stderr,
        exit_code: output.exit_code,
        timed_out: output.timed_out,
    };
    if !result.success {
        tracing::warn!(
            directive = %handler.key(),
            exit_code = result.exit_code,
            timed_out = result.timed_out,
            "directive handler failed"
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{EXIT_NOT_FOUND, EXIT_TIMEOUT};
    use tempfile::tempdir;

    fn handler(template: &str, caps: Vec<Capability>) -> DirectiveHandler {
        DirectiveHandler {
            name: "echo".into(),
            directive_type: "test".into(),
            command_template: template.into(),
            description: None,
            timeout: None,
            required_capabilities: caps,
            inject_output: true,
            source: PathBuf::from("directives.yaml"),
        }
    }

    #[tokio::test]
    async fn test_placeholders_are_substituted() {
        let dir = tempdir().unwrap();
        let ctx = DirectiveContext {
            workspace_root: dir.path(),
            value: "hello",
            adapter_session: None,
        };
        let h = handler("echo {directive} {value} {workspace}", vec![]);
        let result = execute(&h, &ctx, Duration::from_secs(10), None).await;
        assert!(result.success);
        assert_eq!(
            result.stdout.trim(),
            format!("echo hello {}", dir.path().display())
        );
    }

    #[tokio::test]
    async fn test_timeout_reports_124() {
        let dir = tempdir().unwrap();
        let ctx = DirectiveContext {
            workspace_root: dir.path(),
            value: "",
            adapter_session: None,
        };
        let h = handler("sleep 10", vec![]);
        let result = execute(&h, &ctx, Duration::from_secs(10), Some(Duration::from_millis(200))).await;
        assert!(!result.success);
        assert!(result.timed_out);
        assert_eq!(result.exit_code, EXIT_TIMEOUT);
    }

    #[tokio::test]
    async fn test_missing_command_reports_127() {
        let dir = tempdir().unwrap();
        let ctx = DirectiveContext {
            workspace_root: dir.path(),
            value: "",
            adapter_session: None,
        };
        let h = handler("no-such-handler-binary-xyz", vec![]);
        let result = execute(&h, &ctx, Duration::from_secs(10), None).await;
        assert_eq!(result.exit_code, EXIT_NOT_FOUND);
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_adapter_session_requires_capability() {
        let dir = tempdir().unwrap();
        let ctx = DirectiveContext {
            workspace_root: dir.path(),
            value: "",
            adapter_session: Some("sess-1"),
        };

        let without = handler("echo \"[$CONDUCTOR_ADAPTER_SESSION]\"", vec![]);
        let result = execute(&without, &ctx, Duration::from_secs(10), None).await;
        assert_eq!(result.stdout.trim(), "[]");

        let with = handler(
            "echo \"[$CONDUCTOR_ADAPTER_SESSION]\"",
            vec![Capability::AdapterAccess],
        );
        let result = execute(&with, &ctx, Duration::from_secs(10), None).await;
        assert_eq!(result.stdout.trim(), "[sess-1]");
    }

    #[test]
    fn test_repo_root_falls_back_to_workspace() {
        let dir = tempdir().unwrap();
        if git2::Repository::discover(dir.path()).is_err() {
            assert_eq!(repo_root(dir.path()), dir.path());
        }
    }
}
