//! Verification gates.
//!
//! Verifiers are looked up by name in a [`VerifierRegistry`] and return a
//! [`VerificationReport`]. The engine turns reports into markdown for the
//! session log and applies the `[verify] on_error` policy.
//!
//! ## Report contract
//!
//! - `passed`: overall verdict
//! - `errors` / `warnings`: individual findings
//! - `summary`: one line for logs and progress output
//! - `details`: free-form JSON; coverage checks read `details.metrics.<name>`

mod command;

pub use command::CommandVerifier;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::step::CompareOp;

/// Name that runs every registered verifier.
pub const ALL_VERIFIERS: &str = "all";
/// Verifier consulted by `verify_trace` steps.
pub const TRACE_VERIFIER: &str = "trace";
/// Verifier consulted by `verify_coverage` steps.
pub const COVERAGE_VERIFIER: &str = "coverage";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub kind: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl VerifyRequest {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            options: BTreeMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub passed: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl VerificationReport {
    pub fn passed(summary: impl Into<String>) -> Self {
        Self {
            passed: true,
            summary: summary.into(),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            passed: false,
            summary: error.clone(),
            errors: vec![error],
            ..Default::default()
        }
    }

    /// Numeric metric from `details.metrics.<name>`.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.details
            .get("metrics")
            .and_then(|m| m.get(name))
            .and_then(|v| v.as_f64())
    }

    /// Re-judge the report against a metric threshold.
    pub fn check_metric(mut self, metric: &str, op: CompareOp, threshold: f64) -> Self {
        match self.metric(metric) {
            Some(actual) if op.compare(actual, threshold) => {
                self.summary = format!("{} = {} ({} {})", metric, actual, op, threshold);
            }
            Some(actual) => {
                self.passed = false;
                let msg = format!(
                    "{} = {} does not satisfy {} {}",
                    metric, actual, op, threshold
                );
                self.summary = msg.clone();
                self.errors.push(msg);
            }
            None => {
                self.passed = false;
                let msg = format!("metric '{}' not reported", metric);
                self.summary = msg.clone();
                self.errors.push(msg);
            }
        }
        self
    }

    /// Render as markdown for the session log.
    pub fn to_markdown(&self, verifier: &str) -> String {
        let verdict = if self.passed { "PASSED" } else { "FAILED" };
        let mut out = format!("### Verification `{}`: {}\n\n", verifier, verdict);
        if !self.summary.is_empty() {
            out.push_str(&self.summary);
            out.push_str("\n\n");
        }
        if !self.errors.is_empty() {
            out.push_str("**Errors**\n\n");
            for e in &self.errors {
                out.push_str(&format!("- {}\n", e));
            }
            out.push('\n');
        }
        if !self.warnings.is_empty() {
            out.push_str("**Warnings**\n\n");
            for w in &self.warnings {
                out.push_str(&format!("- {}\n", w));
            }
            out.push('\n');
        }
        out.trim_end().to_string()
    }
}

#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, root: &Path, request: &VerifyRequest) -> Result<VerificationReport>;
}

/// Named verifiers available to `verify*` steps.
#[derive(Default, Clone)]
pub struct VerifierRegistry {
    verifiers: BTreeMap<String, Arc<dyn Verifier>>,
}

impl VerifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build command verifiers from `[verify.commands]`.
    pub fn from_commands(commands: &BTreeMap<String, String>) -> Self {
        let mut registry = Self::new();
        for (name, command) in commands {
            registry.register(name, Arc::new(CommandVerifier::new(command)));
        }
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, verifier: Arc<dyn Verifier>) {
        self.verifiers.insert(name.into(), verifier);
    }

    pub fn names(&self) -> Vec<&str> {
        self.verifiers.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.verifiers.is_empty()
    }

    /// Run the verifier(s) selected by `request.kind`.
    ///
    /// Lookup misses and verifier errors become failed reports.
    pub async fn run(&self, root: &Path, request: &VerifyRequest) -> Vec<(String, VerificationReport)> {
        let selected: Vec<(&String, &Arc<dyn Verifier>)> = if request.kind == ALL_VERIFIERS {
            self.verifiers.iter().collect()
        } else {
            self.verifiers
                .get_key_value(&request.kind)
                .into_iter()
                .collect()
        };

        if selected.is_empty() {
            let msg = if request.kind == ALL_VERIFIERS {
                "no verifiers configured".to_string()
            } else {
                format!("no verifier named '{}'", request.kind)
            };
            return vec![(request.kind.clone(), VerificationReport::failed(msg))];
        }

        let mut reports = Vec::with_capacity(selected.len());
        for (name, verifier) in selected {
            let report = match verifier.verify(root, request).await {
                Ok(report) => report,
                Err(e) => VerificationReport::failed(format!("verifier error: {:#}", e)),
            };
            tracing::debug!(verifier = %name, passed = report.passed, "verification finished");
            reports.push((name.clone(), report));
        }
        reports
    }
}
