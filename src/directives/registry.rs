//! Registry of discovered directive handlers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::executor::{self, DirectiveContext};
use super::manifest;
use super::types::{DirectiveHandler, DirectiveResult};

/// Handlers keyed by `(directive_type, name)`, first registration wins.
#[derive(Debug, Clone, Default)]
pub struct PluginDirectiveRegistry {
    handlers: Vec<DirectiveHandler>,
    warnings: Vec<String>,
    manifests: Vec<PathBuf>,
    default_timeout: Duration,
}

impl PluginDirectiveRegistry {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            default_timeout,
            ..Default::default()
        }
    }

    /// Discover manifests from `start_dir` and load them in precedence order.
    pub fn discover(start_dir: &Path, default_timeout: Duration) -> Self {
        let mut registry = Self::new(default_timeout);
        registry.load_all(&manifest::discover(start_dir));
        registry
    }

    /// Load each manifest in order. Unreadable manifests become warnings.
    pub fn load_all(&mut self, manifests: &[PathBuf]) {
        for path in manifests {
            match manifest::load(path) {
                Ok((handlers, warnings)) => {
                    for warning in &warnings {
                        tracing::warn!(manifest = %path.display(), "{}", warning);
                    }
                    self.warnings.extend(warnings);
                    for handler in handlers {
                        self.register(handler);
                    }
                    self.manifests.push(path.clone());
                }
                Err(e) => {
                    let message = format!("{:#}", e);
                    tracing::warn!(manifest = %path.display(), error = %message, "skipping manifest");
                    self.warnings.push(message);
                }
            }
        }
    }

    /// Add a handler unless one with the same key is already registered.
    pub fn register(&mut self, handler: DirectiveHandler) -> bool {
        if let Some(existing) = self.get(&handler.directive_type, &handler.name) {
            tracing::debug!(
                directive = %handler.key(),
                kept = %existing.source.display(),
                shadowed = %handler.source.display(),
                "directive already registered"
            );
            return false;
        }
        self.handlers.push(handler);
        true
    }

    pub fn get(&self, directive_type: &str, name: &str) -> Option<&DirectiveHandler> {
        self.handlers
            .iter()
            .find(|h| h.directive_type == directive_type && h.name == name)
    }

    pub fn handlers(&self) -> &[DirectiveHandler] {
        &self.handlers
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn manifests(&self) -> &[PathBuf] {
        &self.manifests
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Execute a registered handler. An unknown directive is a failed result.
    pub async fn execute(
        &self,
        directive_type: &str,
        name: &str,
        ctx: &DirectiveContext<'_>,
        timeout_override: Option<Duration>,
    ) -> (Option<&DirectiveHandler>, DirectiveResult) {
        match self.get(directive_type, name) {
            Some(handler) => {
                let result =
                    executor::execute(handler, ctx, self.default_timeout, timeout_override).await;
                (Some(handler), result)
            }
            None => (
                None,
                DirectiveResult::failure(
                    format!("no handler registered for {}:{}", directive_type, name),
                    crate::process::EXIT_NOT_FOUND,
                ),
            ),
        }
    }
}
