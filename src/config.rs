//! Configuration for conductor.
//!
//! Settings are read from `.conductor/conductor.toml` and layered
//! (file → environment → CLI) into a [`RunOptions`] value that is threaded
//! through the engine and its components.
//!
//! # Configuration File Format
//!
//! ```toml
//! [adapter]
//! command = "claude"
//! model = "sonnet"
//! context_window = 200000
//! near_limit_percent = 80
//!
//! [run]
//! on_error = "stop"          # stop | continue
//! inject_output = "on-error" # always | on-error | never
//! output_limit = 4000
//! timeout_secs = 600
//!
//! [verify]
//! on_error = "fail"          # fail | warn
//! inject = "on-error"
//!
//! [verify.commands]
//! trace = "./scripts/trace.sh"
//!
//! [context]
//! min_density = 0
//! consult_timeout = "30m"
//!
//! [checkpoint]
//! output = "SESSION.md"
//! commit = true
//!
//! [background]
//! grace_period = "5s"
//!
//! [directives]
//! on_error = "warn"
//! default_timeout = 60
//!
//! [logging]
//! level = "info"
//! json = false
//! file = false
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::step::parse_duration;

/// Name of the per-workspace state directory.
pub const STATE_DIR: &str = ".conductor";

/// When to inject command or verifier output into the session log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InjectPolicy {
    #[serde(rename = "always")]
    Always,
    #[default]
    #[serde(rename = "on-error")]
    OnError,
    #[serde(rename = "never")]
    Never,
}

impl InjectPolicy {
    pub fn should_inject(self, failed: bool) -> bool {
        match self {
            InjectPolicy::Always => true,
            InjectPolicy::OnError => failed,
            InjectPolicy::Never => false,
        }
    }
}

impl std::fmt::Display for InjectPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InjectPolicy::Always => write!(f, "always"),
            InjectPolicy::OnError => write!(f, "on-error"),
            InjectPolicy::Never => write!(f, "never"),
        }
    }
}

impl std::str::FromStr for InjectPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "always" => Ok(InjectPolicy::Always),
            "on-error" | "on_error" => Ok(InjectPolicy::OnError),
            "never" => Ok(InjectPolicy::Never),
            _ => anyhow::bail!(
                "Invalid inject policy '{}'. Valid values: always, on-error, never",
                s
            ),
        }
    }
}

/// What a failed RUN step does once retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunErrorPolicy {
    #[default]
    Stop,
    Continue,
}

/// What a failed gate (verifier, plugin directive) does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateErrorPolicy {
    #[default]
    Fail,
    Warn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterSection {
    /// Model CLI command (default: "claude")
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Extra arguments passed on every invocation
    #[serde(default)]
    pub args: Vec<String>,
    /// Context window size in tokens
    #[serde(default = "default_context_window")]
    pub context_window: u64,
    /// Usage percentage at which the adapter reports "near limit"
    #[serde(default = "default_near_limit_percent")]
    pub near_limit_percent: f64,
}

fn default_context_window() -> u64 {
    200_000
}

fn default_near_limit_percent() -> f64 {
    80.0
}

impl Default for AdapterSection {
    fn default() -> Self {
        Self {
            command: None,
            model: None,
            args: Vec::new(),
            context_window: default_context_window(),
            near_limit_percent: default_near_limit_percent(),
        }
    }
}

impl AdapterSection {
    /// Adapter command (file → env → default).
    pub fn command(&self) -> String {
        self.command
            .clone()
            .or_else(|| std::env::var("CONDUCTOR_ADAPTER_CMD").ok())
            .unwrap_or_else(|| "claude".to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSection {
    #[serde(default)]
    pub on_error: RunErrorPolicy,
    #[serde(default)]
    pub inject_output: InjectPolicy,
    /// Character budget for injected command output
    #[serde(default = "default_output_limit")]
    pub output_limit: usize,
    /// Hard timeout for a single command attempt
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_output_limit() -> usize {
    4000
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            on_error: RunErrorPolicy::default(),
            inject_output: InjectPolicy::default(),
            output_limit: default_output_limit(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifySection {
    #[serde(default)]
    pub on_error: GateErrorPolicy,
    #[serde(default)]
    pub inject: InjectPolicy,
    /// Named shell verifiers, e.g. `trace = "./scripts/trace.sh"`
    #[serde(default)]
    pub commands: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextSection {
    /// Minimum usage percent before a near-limit compaction runs (0 = always)
    #[serde(default)]
    pub min_density: f64,
    /// How long a consult pause stays open, e.g. "30m"
    #[serde(default)]
    pub consult_timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSection {
    /// Output artifact flushed on every checkpoint (relative to workspace)
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Commit the output artifact when inside a git repository
    #[serde(default = "default_commit")]
    pub commit: bool,
}

fn default_commit() -> bool {
    true
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            output: None,
            commit: default_commit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundSection {
    #[serde(default = "default_grace_period")]
    pub grace_period: String,
}

fn default_grace_period() -> String {
    "5s".to_string()
}

impl Default for BackgroundSection {
    fn default() -> Self {
        Self {
            grace_period: default_grace_period(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectivesSection {
    #[serde(default = "default_directive_on_error")]
    pub on_error: GateErrorPolicy,
    /// Timeout applied when a handler does not declare one
    #[serde(default = "default_directive_timeout")]
    pub default_timeout: u64,
}

fn default_directive_on_error() -> GateErrorPolicy {
    GateErrorPolicy::Warn
}

fn default_directive_timeout() -> u64 {
    60
}

impl Default for DirectivesSection {
    fn default() -> Self {
        Self {
            on_error: default_directive_on_error(),
            default_timeout: default_directive_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// Also write a daily log file under `.conductor/logs`
    #[serde(default)]
    pub file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: false,
        }
    }
}

/// The complete conductor.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConductorToml {
    #[serde(default)]
    pub adapter: AdapterSection,
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub verify: VerifySection,
    #[serde(default)]
    pub context: ContextSection,
    #[serde(default)]
    pub checkpoint: CheckpointSection,
    #[serde(default)]
    pub background: BackgroundSection,
    #[serde(default)]
    pub directives: DirectivesSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl ConductorToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse conductor.toml")
    }

    /// Load configuration from `<state_dir>/conductor.toml`.
    /// Returns default configuration if the file doesn't exist.
    pub fn load_or_default(state_dir: &Path) -> Result<Self> {
        let config_path = state_dir.join("conductor.toml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize conductor.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !(0.0..=100.0).contains(&self.context.min_density) {
            warnings.push(format!(
                "context.min_density must be between 0 and 100, got {}",
                self.context.min_density
            ));
        }

        if let Some(ref timeout) = self.context.consult_timeout
            && parse_duration(timeout).is_err()
        {
            warnings.push(format!("Invalid context.consult_timeout '{}'", timeout));
        }

        if parse_duration(&self.background.grace_period).is_err() {
            warnings.push(format!(
                "Invalid background.grace_period '{}'",
                self.background.grace_period
            ));
        }

        if self.run.output_limit == 0 {
            warnings.push("run.output_limit of 0 drops all injected output".to_string());
        }

        if self.run.timeout_secs == Some(0) {
            warnings.push("run.timeout_secs of 0 times out every command".to_string());
        }

        if self.directives.default_timeout == 0 {
            warnings.push("directives.default_timeout of 0 seconds".to_string());
        }

        if self.adapter.context_window == 0 {
            warnings.push("adapter.context_window cannot be zero".to_string());
        }

        if !(0.0..=100.0).contains(&self.adapter.near_limit_percent) {
            warnings.push(format!(
                "adapter.near_limit_percent must be between 0 and 100, got {}",
                self.adapter.near_limit_percent
            ));
        }

        warnings
    }
}

/// Explicit run context threaded through the engine and its components.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub workspace_root: PathBuf,
    pub state_dir: PathBuf,
    pub run_on_error: RunErrorPolicy,
    pub run_inject: InjectPolicy,
    pub output_limit: usize,
    pub run_timeout: Option<Duration>,
    pub verify_on_error: GateErrorPolicy,
    pub verify_inject: InjectPolicy,
    pub min_density: f64,
    pub consult_timeout: Option<Duration>,
    pub output_path: Option<PathBuf>,
    pub commit_checkpoints: bool,
    pub grace_period: Duration,
    pub directive_on_error: GateErrorPolicy,
    pub directive_timeout: Duration,
    /// Wait for review markers to be removed instead of failing fast.
    pub wait_for_review: bool,
    pub review_poll_interval: Duration,
    /// Suppress progress output.
    pub quiet: bool,
    pub verbose: bool,
}

impl RunOptions {
    /// Defaults for a workspace, without reading any file.
    pub fn for_workspace(workspace_root: impl Into<PathBuf>) -> Self {
        let workspace_root = workspace_root.into();
        let state_dir = workspace_root.join(STATE_DIR);
        Self {
            workspace_root,
            state_dir,
            run_on_error: RunErrorPolicy::Stop,
            run_inject: InjectPolicy::OnError,
            output_limit: default_output_limit(),
            run_timeout: None,
            verify_on_error: GateErrorPolicy::Fail,
            verify_inject: InjectPolicy::OnError,
            min_density: 0.0,
            consult_timeout: None,
            output_path: None,
            commit_checkpoints: false,
            grace_period: Duration::from_secs(5),
            directive_on_error: GateErrorPolicy::Warn,
            directive_timeout: Duration::from_secs(default_directive_timeout()),
            wait_for_review: false,
            review_poll_interval: Duration::from_secs(2),
            quiet: true,
            verbose: false,
        }
    }

    /// Build options from a parsed config file.
    pub fn from_toml(workspace_root: impl Into<PathBuf>, toml: &ConductorToml) -> Result<Self> {
        let mut options = Self::for_workspace(workspace_root);

        options.run_on_error = toml.run.on_error;
        options.run_inject = toml.run.inject_output;
        options.output_limit = toml.run.output_limit;
        options.run_timeout = toml.run.timeout_secs.map(Duration::from_secs);
        options.verify_on_error = toml.verify.on_error;
        options.verify_inject = toml.verify.inject;
        options.min_density = toml.context.min_density;
        options.consult_timeout = toml
            .context
            .consult_timeout
            .as_deref()
            .map(parse_duration)
            .transpose()
            .context("Invalid context.consult_timeout")?;
        options.output_path = toml.checkpoint.output.clone();
        options.commit_checkpoints = toml.checkpoint.commit;
        options.grace_period = parse_duration(&toml.background.grace_period)
            .context("Invalid background.grace_period")?;
        options.directive_on_error = toml.directives.on_error;
        options.directive_timeout = Duration::from_secs(toml.directives.default_timeout);
        options.quiet = false;

        Ok(options)
    }

    /// Load `<workspace>/.conductor/conductor.toml` and build options from it.
    pub fn load(workspace_root: impl Into<PathBuf>) -> Result<(Self, ConductorToml)> {
        let workspace_root = workspace_root.into();
        let toml = ConductorToml::load_or_default(&workspace_root.join(STATE_DIR))?;
        let options = Self::from_toml(workspace_root, &toml)?;
        Ok((options, toml))
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.state_dir.join("sessions")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    /// Output artifact path resolved against the workspace.
    pub fn resolved_output_path(&self) -> Option<PathBuf> {
        self.output_path.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                self.workspace_root.join(p)
            }
        })
    }
}
