//! Core types for plugin directives.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Capabilities a handler may declare in its manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ReadFiles,
    WriteFiles,
    RunCommands,
    Network,
    AdapterAccess,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::ReadFiles,
        Capability::WriteFiles,
        Capability::RunCommands,
        Capability::Network,
        Capability::AdapterAccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ReadFiles => "read_files",
            Capability::WriteFiles => "write_files",
            Capability::RunCommands => "run_commands",
            Capability::Network => "network",
            Capability::AdapterAccess => "adapter_access",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Capability {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown capability '{}'. Valid values: read_files, write_files, run_commands, network, adapter_access",
                    s
                )
            })
    }
}

/// A directive handler loaded from a manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveHandler {
    pub name: String,
    pub directive_type: String,
    /// Shell command with `{root}`, `{workspace}`, `{value}`, `{directive}` placeholders
    pub command_template: String,
    pub description: Option<String>,
    pub timeout: Option<Duration>,
    pub required_capabilities: Vec<Capability>,
    /// Whether output is injected into the session log
    pub inject_output: bool,
    /// Manifest this handler was loaded from
    pub source: PathBuf,
}

impl DirectiveHandler {
    /// `type:name` key used in listings and logs.
    pub fn key(&self) -> String {
        format!("{}:{}", self.directive_type, self.name)
    }

    pub fn requires(&self, capability: Capability) -> bool {
        self.required_capabilities.contains(&capability)
    }
}

/// Result of executing a directive handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectiveResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

impl DirectiveResult {
    pub fn failure(message: impl Into<String>, exit_code: i32) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: message.into(),
            exit_code,
            timed_out: false,
        }
    }

    /// Text injected into the session log.
    pub fn injection(&self, handler: &DirectiveHandler) -> String {
        let mut out = format!("[directive {}] exit {}", handler.key(), self.exit_code);
        if self.timed_out {
            out.push_str(" (timed out)");
        }
        if !self.stdout.trim().is_empty() {
            out.push_str("\n\n");
            out.push_str(self.stdout.trim_end());
        }
        if !self.success && !self.stderr.trim().is_empty() {
            out.push_str("\n\nstderr:\n");
            out.push_str(self.stderr.trim_end());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_parse() {
        for cap in Capability::ALL {
            assert_eq!(cap.as_str().parse::<Capability>().unwrap(), cap);
        }
        assert!("teleport".parse::<Capability>().is_err());
    }

    #[test]
    fn test_capability_serde() {
        let caps: Vec<Capability> =
            serde_yaml::from_str("[read_files, adapter_access]").unwrap();
        assert_eq!(caps, vec![Capability::ReadFiles, Capability::AdapterAccess]);
    }

    #[test]
    fn test_injection_format() {
        let handler = DirectiveHandler {
            name: "lint".into(),
            directive_type: "check".into(),
            command_template: "true".into(),
            description: None,
            timeout: None,
            required_capabilities: vec![],
            inject_output: true,
            source: PathBuf::from("directives.yaml"),
        };
        let result = DirectiveResult {
            success: false,
            stdout: "1 warning\n".into(),
            stderr: "bad file\n".into(),
            exit_code: 2,
            timed_out: false,
        };
        let text = result.injection(&handler);
        assert!(text.starts_with("[directive check:lint] exit 2"));
        assert!(text.contains("1 warning"));
        assert!(text.contains("stderr:\nbad file"));
    }
}
