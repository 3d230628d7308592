//! Supervision of processes started by `run_async` steps.
//!
//! Every child is spawned in its own process group so teardown reaches
//! anything the shell started. [`AsyncProcessRegistry::shutdown`] is called
//! from the engine's cleanup path; `Drop` is the last resort.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};

use super::{Signal, kill_group};

/// Identifies a tracked background process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub id: usize,
    pub pid: Option<u32>,
    pub command: String,
}

struct TrackedProcess {
    handle: ProcessHandle,
    child: Child,
}

/// Outcome counts from a shutdown pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub already_exited: usize,
    pub terminated: usize,
    pub killed: usize,
}

#[derive(Default)]
pub struct AsyncProcessRegistry {
    processes: Vec<TrackedProcess>,
    next_id: usize,
}

impl AsyncProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `command` via `sh -c` without waiting for it.
    pub fn spawn(
        &mut self,
        command: &str,
        cwd: &Path,
        env: &[(String, String)],
    ) -> Result<ProcessHandle> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn background command: {}", command))?;

        let handle = ProcessHandle {
            id: self.next_id,
            pid: child.id(),
            command: command.to_string(),
        };
        self.next_id += 1;

        tracing::info!(command, pid = ?handle.pid, "background process started");
        self.processes.push(TrackedProcess {
            handle: handle.clone(),
            child,
        });
        Ok(handle)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Terminate every tracked child, escalating to a kill after `grace`.
    ///
    /// Never fails; problems are logged. The tracked set is always empty
    /// afterwards.
    pub async fn shutdown(&mut self, grace: Duration) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        let mut running = Vec::new();

        for mut process in std::mem::take(&mut self.processes) {
            match process.child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(command = %process.handle.command, %status, "background process already exited");
                    report.already_exited += 1;
                }
                Ok(None) | Err(_) => {
                    terminate(&mut process);
                    running.push(process);
                }
            }
        }

        let deadline = tokio::time::Instant::now() + grace;
        for mut process in running {
            match tokio::time::timeout_at(deadline, process.child.wait()).await {
                Ok(Ok(_)) => report.terminated += 1,
                Ok(Err(e)) => {
                    tracing::warn!(command = %process.handle.command, error = %e, "failed waiting on background process");
                    force_kill(&mut process).await;
                    report.killed += 1;
                }
                Err(_) => {
                    tracing::warn!(
                        command = %process.handle.command,
                        grace_ms = grace.as_millis() as u64,
                        "background process ignored SIGTERM, killing"
                    );
                    force_kill(&mut process).await;
                    report.killed += 1;
                }
            }
        }

        if report.terminated + report.killed > 0 {
            tracing::info!(
                terminated = report.terminated,
                killed = report.killed,
                "background processes stopped"
            );
        }
        report
    }
}

fn terminate(process: &mut TrackedProcess) {
    let delivered = process
        .handle
        .pid
        .is_some_and(|pid| kill_group(pid, Signal::Term));
    if !delivered && let Err(e) = process.child.start_kill() {
        tracing::warn!(command = %process.handle.command, error = %e, "failed to signal background process");
    }
}

async fn force_kill(process: &mut TrackedProcess) {
    if let Some(pid) = process.handle.pid {
        kill_group(pid, Signal::Kill);
    }
    if let Err(e) = process.child.kill().await {
        tracing::warn!(command = %process.handle.command, error = %e, "failed to kill background process");
    }
}

impl Drop for AsyncProcessRegistry {
    fn drop(&mut self) {
        for process in &mut self.processes {
            if let Some(pid) = process.handle.pid {
                kill_group(pid, Signal::Kill);
            }
            let _ = process.child.start_kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_spawn_does_not_block() {
        let dir = tempdir().unwrap();
        let mut registry = AsyncProcessRegistry::new();
        let started = Instant::now();
        let handle = registry.spawn("sleep 30", dir.path(), &[]).unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(handle.id, 0);
        assert!(handle.pid.is_some());
        assert_eq!(registry.len(), 1);

        let report = registry.shutdown(Duration::from_secs(2)).await;
        assert_eq!(report.terminated, 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_kills_processes_ignoring_sigterm() {
        let dir = tempdir().unwrap();
        let mut registry = AsyncProcessRegistry::new();
        registry
            .spawn("trap '' TERM; while true; do sleep 1; done", dir.path(), &[])
            .unwrap();
        // give the shell a moment to install the trap
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = Instant::now();
        let report = registry.shutdown(Duration::from_millis(300)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(report.terminated + report.killed, 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_counts_exited_processes() {
        let dir = tempdir().unwrap();
        let mut registry = AsyncProcessRegistry::new();
        registry.spawn("true", dir.path(), &[]).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let report = registry.shutdown(Duration::from_millis(100)).await;
        assert_eq!(report.already_exited + report.terminated, 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_empty_registry() {
        let mut registry = AsyncProcessRegistry::new();
        assert_eq!(
            registry.shutdown(Duration::from_millis(10)).await,
            ShutdownReport::default()
        );
    }

    #[tokio::test]
    async fn test_spawn_failure_in_missing_dir() {
        let mut registry = AsyncProcessRegistry::new();
        assert!(
            registry
                .spawn("true", Path::new("/nonexistent/xyz"), &[])
                .is_err()
        );
        assert!(registry.is_empty());
    }
}
