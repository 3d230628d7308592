use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use super::{VerificationReport, Verifier, VerifyRequest};
use crate::process::run_command;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Verifier backed by a shell command.
///
/// Request options are exported as `VERIFY_<KEY>` environment variables.
/// If stdout is a JSON report it is used as-is; otherwise the exit code
/// decides and the first output line becomes the summary.
pub struct CommandVerifier {
    command: String,
    timeout: Duration,
}

impl CommandVerifier {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Verifier for CommandVerifier {
    async fn verify(&self, root: &Path, request: &VerifyRequest) -> Result<VerificationReport> {
        let mut env = vec![("VERIFY_KIND".to_string(), request.kind.clone())];
        for (key, value) in &request.options {
            env.push((
                format!("VERIFY_{}", key.to_uppercase().replace('-', "_")),
                value.clone(),
            ));
        }

        let output = run_command(&self.command, root, &env, Some(self.timeout)).await;
        if output.timed_out {
            anyhow::bail!("verifier timed out after {:?}", self.timeout);
        }

        if let Ok(report) = serde_json::from_str::<VerificationReport>(output.stdout.trim()) {
            return Ok(report);
        }

        let combined = output.combined();
        let summary = combined.lines().next().unwrap_or_default().to_string();
        if output.success() {
            Ok(VerificationReport::passed(summary))
        } else {
            let mut report = VerificationReport::failed(format!(
                "`{}` exited with code {}",
                self.command, output.exit_code
            ));
            if !summary.is_empty() {
                report.summary = summary;
            }
            if !combined.is_empty() {
                report.details = serde_json::json!({ "output": combined });
            }
            Ok(report)
        }
    }
}
