//! Foreground shell command execution.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Exit code reported when a command hits its timeout.
pub const EXIT_TIMEOUT: i32 = 124;
/// Exit code reported when a command cannot be found or spawned.
pub const EXIT_NOT_FOUND: i32 = 127;

/// Captured result of a shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// stdout and stderr joined the way they are shown to the model.
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim_end();
        let stderr = self.stderr.trim_end();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, true) => String::new(),
            (false, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{}\n{}", stdout, stderr),
        }
    }

    fn spawn_failed(error: &std::io::Error, started: Instant) -> Self {
        Self {
            stdout: String::new(),
            stderr: format!("failed to spawn command: {}", error),
            exit_code: EXIT_NOT_FOUND,
            timed_out: false,
            duration: started.elapsed(),
        }
    }
}

/// Run `command` through `sh -c` in `cwd`.
///
/// Never fails: spawn errors map to exit code 127 and timeouts to 124.
/// On timeout the whole process group is killed.
pub async fn run_command(
    command: &str,
    cwd: &Path,
    env: &[(String, String)],
    timeout: Option<Duration>,
) -> CommandOutput {
    let started = Instant::now();

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    for (key, value) in env {
        cmd.env(key, value);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(command, error = %e, "failed to spawn command");
            return CommandOutput::spawn_failed(&e, started);
        }
    };
    let pid = child.id();

    let stdout_task = tokio::spawn(read_all(child.stdout.take()));
    let stderr_task = tokio::spawn(read_all(child.stderr.take()));

    let status = match timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait()).await.ok(),
        None => Some(child.wait().await),
    };

    let (exit_code, timed_out) = match status {
        Some(Ok(status)) => (exit_code_of(&status), false),
        Some(Err(e)) => {
            tracing::warn!(command, error = %e, "failed to wait for command");
            (-1, false)
        }
        None => {
            tracing::warn!(command, ?timeout, "command timed out");
            if let Some(pid) = pid {
                super::kill_group(pid, super::Signal::Kill);
            }
            let _ = child.kill().await;
            (EXIT_TIMEOUT, true)
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    CommandOutput {
        stdout,
        stderr,
        exit_code,
        timed_out,
        duration: started.elapsed(),
    }
}

/// Drain a child pipe to a lossy UTF-8 string.
pub(crate) async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        let _ = reader.read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}
