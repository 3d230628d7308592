//! Directive manifest parsing and discovery.
//!
//! Manifests live at `.conductor/directives.yaml` in a workspace (or any
//! parent up to the repository root) and at
//! `<config_dir>/conductor/directives.yaml` for user-global handlers.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::types::{Capability, DirectiveHandler};
use crate::config::STATE_DIR;

pub const MANIFEST_FILE: &str = "directives.yaml";

const SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default = "default_version")]
    pub version: u32,
    /// directive_type -> handler name -> entry
    #[serde(default)]
    pub directives: BTreeMap<String, BTreeMap<String, ManifestEntry>>,
}

fn default_version() -> u32 {
    SUPPORTED_VERSION
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub handler: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Seconds
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub inject: bool,
}

impl Manifest {
    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse directive manifest")
    }

    /// Convert entries into handlers, collecting validation warnings.
    pub fn into_handlers(self, source: &Path) -> (Vec<DirectiveHandler>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut handlers = Vec::new();

        if self.version != SUPPORTED_VERSION {
            warnings.push(format!(
                "{}: unsupported manifest version {} (expected {})",
                source.display(),
                self.version,
                SUPPORTED_VERSION
            ));
        }

        for (directive_type, entries) in self.directives {
            for (name, entry) in entries {
                let key = format!("{}:{}", directive_type, name);

                if entry.handler.trim().is_empty() {
                    warnings.push(format!(
                        "{}: directive {} has an empty handler, skipped",
                        source.display(),
                        key
                    ));
                    continue;
                }

                let mut capabilities = Vec::new();
                for raw in &entry.requires {
                    match raw.parse::<Capability>() {
                        Ok(cap) => {
                            if !capabilities.contains(&cap) {
                                capabilities.push(cap);
                            }
                        }
                        Err(_) => warnings.push(format!(
                            "{}: directive {} requires unknown capability '{}'",
                            source.display(),
                            key,
                            raw
                        )),
                    }
                }

                if entry.timeout == Some(0) {
                    warnings.push(format!(
                        "{}: directive {} has a zero timeout",
                        source.display(),
                        key
                    ));
                }

                let mut command_template = entry.handler.trim().to_string();
                for arg in &entry.args {
                    command_template.push(' ');
                    command_template.push_str(arg);
                }

                handlers.push(DirectiveHandler {
                    name,
                    directive_type: directive_type.clone(),
                    command_template,
                    description: entry.description,
                    timeout: entry.timeout.map(Duration::from_secs),
                    required_capabilities: capabilities,
                    inject_output: entry.inject,
                    source: source.to_path_buf(),
                });
            }
        }

        (handlers, warnings)
    }
}

/// Load handlers from one manifest file.
pub fn load(path: &Path) -> Result<(Vec<DirectiveHandler>, Vec<String>)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    let manifest =
        Manifest::parse(&content).with_context(|| format!("Invalid manifest: {}", path.display()))?;
    Ok(manifest.into_handlers(path))
}

/// User-global manifest location.
pub fn global_manifest_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("conductor").join(MANIFEST_FILE))
}

/// Manifests from `start_dir` up to the repository root, then `global`.
///
/// Outside a repository only `start_dir` itself is searched.
pub fn discover_with_global(start_dir: &Path, global: Option<PathBuf>) -> Vec<PathBuf> {
    let start = start_dir
        .canonicalize()
        .unwrap_or_else(|_| start_dir.to_path_buf());
    let repo_root = git2::Repository::discover(&start)
        .ok()
        .and_then(|repo| repo.workdir().map(Path::to_path_buf))
        .map(|root| root.canonicalize().unwrap_or(root));

    let mut candidates = Vec::new();
    let mut dir = Some(start.as_path());
    while let Some(current) = dir {
        candidates.push(current.join(STATE_DIR).join(MANIFEST_FILE));
        match repo_root {
            Some(ref root) if current != root.as_path() => dir = current.parent(),
            _ => break,
        }
    }
    candidates.extend(global);

    let mut found: Vec<PathBuf> = Vec::new();
    for candidate in candidates {
        if !candidate.is_file() {
            continue;
        }
        let canonical = candidate.canonicalize().unwrap_or(candidate);
        if !found.contains(&canonical) {
            found.push(canonical);
        }
    }
    found
}

pub fn discover(start_dir: &Path) -> Vec<PathBuf> {
    discover_with_global(start_dir, global_manifest_path())
}
