//! Workflow document and step model.
//!
//! A workflow document is the output of the external directive parser: an
//! ordered list of steps plus the pause/consult points and context inputs
//! that apply to the whole session. Documents are read from JSON or YAML.
//!
//! ```yaml
//! name: release-prep
//! consult_timeout: 5m
//! context:
//!   - path: docs/overview.md
//!     required: true
//! pause_points:
//!   1: { kind: consult, topic: "API shape" }
//! steps:
//!   - type: prompt
//!     text: "Summarize the open issues"
//!   - type: run
//!     command: cargo test
//!     retry_count: 2
//!     on_success:
//!       - type: checkpoint
//!         name: tests-green
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::EngineError;

/// A single directive in a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Send text to the model.
    Prompt { text: String },

    /// Send text whose placeholders are replaced by command output first.
    MergedPrompt {
        text: String,
        #[serde(default)]
        embedded_commands: Vec<EmbeddedCommand>,
    },

    /// Run a shell command with optional retry and follow-up blocks.
    Run {
        command: String,
        #[serde(default)]
        retry_count: u32,
        #[serde(default)]
        retry_prompt: Option<String>,
        #[serde(default)]
        on_failure: Vec<Step>,
        #[serde(default)]
        on_success: Vec<Step>,
    },

    /// Start a background command without waiting for it.
    RunAsync { command: String },

    /// Sleep for a duration token such as `500ms`, `5s`, `1m` or `5`.
    RunWait { duration: String },

    Checkpoint { name: String },

    Compact {
        #[serde(default)]
        preserve_list: Vec<String>,
    },

    Verify {
        kind: String,
        #[serde(default)]
        options: BTreeMap<String, String>,
    },

    VerifyTrace { from_id: String, to_id: String },

    VerifyCoverage {
        metric: String,
        op: CompareOp,
        threshold: f64,
    },

    Consult { topic: String },

    Pause { message: String },

    Lsp {
        subcommand: String,
        #[serde(default)]
        args: Vec<String>,
    },

    /// Drop the current conversation and start a fresh adapter session.
    NewConversation,

    /// Invoke a plugin handler registered through a directives manifest.
    Directive {
        directive_type: String,
        name: String,
        #[serde(default)]
        value: String,
    },
}

impl Step {
    /// Short kind name used in logs and progress output.
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Prompt { .. } => "prompt",
            Step::MergedPrompt { .. } => "merged_prompt",
            Step::Run { .. } => "run",
            Step::RunAsync { .. } => "run_async",
            Step::RunWait { .. } => "run_wait",
            Step::Checkpoint { .. } => "checkpoint",
            Step::Compact { .. } => "compact",
            Step::Verify { .. } => "verify",
            Step::VerifyTrace { .. } => "verify_trace",
            Step::VerifyCoverage { .. } => "verify_coverage",
            Step::Consult { .. } => "consult",
            Step::Pause { .. } => "pause",
            Step::Lsp { .. } => "lsp",
            Step::NewConversation => "new_conversation",
            Step::Directive { .. } => "directive",
        }
    }

    /// Whether this step sends a user prompt to the model.
    pub fn is_prompt(&self) -> bool {
        matches!(self, Step::Prompt { .. } | Step::MergedPrompt { .. })
    }

    /// Whether this step may appear inside an `on_failure`/`on_success` block.
    pub fn allowed_in_block(&self) -> bool {
        matches!(
            self,
            Step::Prompt { .. }
                | Step::Run { .. }
                | Step::Checkpoint { .. }
                | Step::Compact { .. }
                | Step::Pause { .. }
                | Step::Consult { .. }
        )
    }

    /// One-line description for progress output.
    pub fn describe(&self) -> String {
        match self {
            Step::Prompt { text } | Step::MergedPrompt { text, .. } => {
                crate::util::truncate_str(text.lines().next().unwrap_or(""), 50)
            }
            Step::Run { command, .. } | Step::RunAsync { command } => {
                crate::util::truncate_str(command, 50)
            }
            Step::RunWait { duration } => format!("wait {}", duration),
            Step::Checkpoint { name } => name.clone(),
            Step::Compact { preserve_list } => {
                format!("preserve {} item(s)", preserve_list.len())
            }
            Step::Verify { kind, .. } => kind.clone(),
            Step::VerifyTrace { from_id, to_id } => format!("{} -> {}", from_id, to_id),
            Step::VerifyCoverage {
                metric,
                op,
                threshold,
            } => format!("{} {} {}", metric, op, threshold),
            Step::Consult { topic } => topic.clone(),
            Step::Pause { message } => crate::util::truncate_str(message, 50),
            Step::Lsp { subcommand, args } => format!("{} {}", subcommand, args.join(" ")),
            Step::NewConversation => "fresh session".to_string(),
            Step::Directive {
                directive_type,
                name,
                ..
            } => format!("{}:{}", directive_type, name),
        }
    }
}

/// A command whose output replaces `placeholder` in a merged prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedCommand {
    pub placeholder: String,
    pub command: String,
}

/// Comparison operator for coverage gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "==")]
    Eq,
}

impl CompareOp {
    pub fn compare(self, actual: f64, threshold: f64) -> bool {
        match self {
            CompareOp::Ge => actual >= threshold,
            CompareOp::Gt => actual > threshold,
            CompareOp::Le => actual <= threshold,
            CompareOp::Lt => actual < threshold,
            CompareOp::Eq => (actual - threshold).abs() < f64::EPSILON,
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CompareOp::Ge => ">=",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
            CompareOp::Lt => "<",
            CompareOp::Eq => "==",
        };
        write!(f, "{}", s)
    }
}

/// A halt registered after a given prompt (keyed by prompt ordinal, 0-based).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PausePoint {
    Pause { message: String },
    Consult { topic: String },
}

/// A file whose content is prepended to the first prompt of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextInput {
    pub path: PathBuf,
    #[serde(default)]
    pub required: bool,
}

/// The parsed workflow consumed by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default)]
    pub name: Option<String>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub pause_points: BTreeMap<usize, PausePoint>,
    #[serde(default)]
    pub context: Vec<ContextInput>,
    /// Overrides `[context] consult_timeout` for this workflow.
    #[serde(default)]
    pub consult_timeout: Option<String>,
    /// Overrides `[checkpoint] output` for this workflow.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl Workflow {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            ..Default::default()
        }
    }

    /// Load a workflow document, choosing the format from the extension.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow file: {}", path.display()))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::parse_yaml(&content),
            _ => Self::parse_json(&content),
        }
        .with_context(|| format!("Failed to parse workflow file: {}", path.display()))
    }

    pub fn parse_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Invalid workflow JSON")
    }

    pub fn parse_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Invalid workflow YAML")
    }

    /// Number of prompt steps before `step_index`, i.e. the ordinal the
    /// prompt at `step_index` carries.
    pub fn prompt_ordinal(&self, step_index: usize) -> usize {
        self.steps
            .iter()
            .take(step_index)
            .filter(|s| s.is_prompt())
            .count()
    }

    pub fn prompt_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_prompt()).count()
    }

    /// Validate the document and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let prompts = self.prompt_count();

        for ordinal in self.pause_points.keys() {
            if *ordinal >= prompts {
                warnings.push(format!(
                    "Pause point registered for prompt {} but workflow has only {} prompt(s)",
                    ordinal, prompts
                ));
            }
        }

        for step in &self.steps {
            match step {
                Step::RunWait { duration } => {
                    if parse_duration(duration).is_err() {
                        warnings.push(format!("Invalid run_wait duration '{}'", duration));
                    }
                }
                Step::Run {
                    on_failure,
                    on_success,
                    ..
                } => {
                    for inner in on_failure.iter().chain(on_success.iter()) {
                        if !inner.allowed_in_block() {
                            warnings.push(format!(
                                "Step kind '{}' is not supported inside run blocks and will be skipped",
                                inner.kind()
                            ));
                        }
                    }
                }
                _ => {}
            }
        }

        if let Some(ref timeout) = self.consult_timeout
            && parse_duration(timeout).is_err()
        {
            warnings.push(format!("Invalid consult_timeout '{}'", timeout));
        }

        warnings
    }
}

/// Parse a duration token.
///
/// Accepts `500ms`, `5s`, `1m`, `2h` and bare numbers (seconds). Fractions
/// are allowed (`1.5s`).
pub fn parse_duration(token: &str) -> Result<Duration, EngineError> {
    let s = token.trim();
    if s.is_empty() {
        return Err(EngineError::InvalidDuration(token.to_string()));
    }

    let (number, scale) = if let Some(n) = s.strip_suffix("ms") {
        (n, 0.001)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1.0)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60.0)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3600.0)
    } else {
        (s, 1.0)
    };

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| EngineError::InvalidDuration(token.to_string()))?;

    if !value.is_finite() || value < 0.0 {
        return Err(EngineError::InvalidDuration(token.to_string()));
    }

    Duration::try_from_secs_f64(value * scale)
        .map_err(|_| EngineError::InvalidDuration(token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("1m").unwrap().as_secs_f64(), 60.0);
        assert_eq!(parse_duration("500ms").unwrap().as_secs_f64(), 0.5);
        assert_eq!(parse_duration("5").unwrap().as_secs_f64(), 5.0);
        assert_eq!(parse_duration("5s").unwrap().as_secs_f64(), 5.0);
        assert_eq!(parse_duration("1.5s").unwrap().as_secs_f64(), 1.5);
        assert_eq!(parse_duration(" 2h ").unwrap().as_secs(), 7200);
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("ms").is_err());
        assert!(parse_duration("1e20").is_err());
        assert!(parse_duration("99999999999999999999s").is_err());
    }

    #[test]
    fn test_step_deserialize_run_defaults() {
        let json = r#"{"type": "run", "command": "make test"}"#;
        let step: Step = serde_json::from_str(json).unwrap();
        match step {
            Step::Run {
                command,
                retry_count,
                retry_prompt,
                on_failure,
                on_success,
            } => {
                assert_eq!(command, "make test");
                assert_eq!(retry_count, 0);
                assert!(retry_prompt.is_none());
                assert!(on_failure.is_empty());
                assert!(on_success.is_empty());
            }
            other => panic!("Expected Run, got {:?}", other),
        }
    }

    #[test]
    fn test_step_rejects_unknown_kind() {
        let json = r#"{"type": "teleport", "destination": "mars"}"#;
        assert!(serde_json::from_str::<Step>(json).is_err());
    }

    #[test]
    fn test_step_new_conversation_unit_variant() {
        let step: Step = serde_json::from_str(r#"{"type": "new_conversation"}"#).unwrap();
        assert_eq!(step, Step::NewConversation);
    }

    #[test]
    fn test_verify_coverage_op_parsing() {
        let json = r#"{"type": "verify_coverage", "metric": "lines", "op": ">=", "threshold": 80}"#;
        let step: Step = serde_json::from_str(json).unwrap();
        assert_eq!(
            step,
            Step::VerifyCoverage {
                metric: "lines".into(),
                op: CompareOp::Ge,
                threshold: 80.0
            }
        );
    }

    #[test]
    fn test_compare_op() {
        assert!(CompareOp::Ge.compare(80.0, 80.0));
        assert!(!CompareOp::Gt.compare(80.0, 80.0));
        assert!(CompareOp::Lt.compare(79.9, 80.0));
        assert!(CompareOp::Le.compare(80.0, 80.0));
        assert!(CompareOp::Eq.compare(80.0, 80.0));
        assert_eq!(CompareOp::Ge.to_string(), ">=");
    }

    #[test]
    fn test_workflow_yaml_with_pause_points() {
        let yaml = r#"
name: demo
consult_timeout: 5s
pause_points:
  0:
    kind: consult
    topic: "API shape"
steps:
  - type: prompt
    text: hello
  - type: run
    command: "true"
    retry_count: 2
    on_success:
      - type: checkpoint
        name: green
"#;
        let workflow = Workflow::parse_yaml(yaml).unwrap();
        assert_eq!(workflow.name.as_deref(), Some("demo"));
        assert_eq!(workflow.steps.len(), 2);
        assert_eq!(
            workflow.pause_points.get(&0),
            Some(&PausePoint::Consult {
                topic: "API shape".into()
            })
        );
        assert!(workflow.validate().is_empty());
    }

    #[test]
    fn test_workflow_json_pause_point_keys() {
        let json = r#"{
            "steps": [{"type": "prompt", "text": "a"}, {"type": "prompt", "text": "b"}],
            "pause_points": {"1": {"kind": "pause", "message": "review"}}
        }"#;
        let workflow = Workflow::parse_json(json).unwrap();
        assert!(workflow.pause_points.contains_key(&1));
    }

    #[test]
    fn test_prompt_ordinal() {
        let workflow = Workflow::new(vec![
            Step::Prompt { text: "a".into() },
            Step::Checkpoint { name: "c".into() },
            Step::MergedPrompt {
                text: "b".into(),
                embedded_commands: vec![],
            },
            Step::Prompt { text: "c".into() },
        ]);
        assert_eq!(workflow.prompt_ordinal(0), 0);
        assert_eq!(workflow.prompt_ordinal(2), 1);
        assert_eq!(workflow.prompt_ordinal(3), 2);
        assert_eq!(workflow.prompt_count(), 3);
    }

    #[test]
    fn test_workflow_validate_warnings() {
        let mut workflow = Workflow::new(vec![
            Step::RunWait {
                duration: "soon".into(),
            },
            Step::Run {
                command: "false".into(),
                retry_count: 0,
                retry_prompt: None,
                on_failure: vec![Step::Verify {
                    kind: "docs".into(),
                    options: BTreeMap::new(),
                }],
                on_success: vec![],
            },
        ]);
        workflow.pause_points.insert(
            3,
            PausePoint::Pause {
                message: "x".into(),
            },
        );

        let warnings = workflow.validate();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().any(|w| w.contains("Invalid run_wait")));
        assert!(warnings.iter().any(|w| w.contains("'verify'")));
        assert!(warnings.iter().any(|w| w.contains("prompt 3")));
    }

    #[test]
    fn test_allowed_in_block() {
        assert!(Step::Checkpoint { name: "x".into() }.allowed_in_block());
        assert!(!Step::RunAsync {
            command: "x".into()
        }
        .allowed_in_block());
        assert!(!Step::NewConversation.allowed_in_block());
    }
}
