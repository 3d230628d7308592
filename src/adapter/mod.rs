//! Language-model adapter boundary.
//!
//! The engine talks to a model backend only through [`AdapterSession`].
//! Implementations own their transport; the engine owns the lifetime of
//! each [`SessionHandle`] and always destroys it when a run ends.
//!
//! Events reported by a backend are normalized into [`AdapterEvent`] so
//! exporters and progress output never have to probe loosely typed data.

mod command;
pub mod events;

#[cfg(test)]
pub(crate) mod scripted;

pub use command::CommandAdapter;
pub use events::{AdapterEvent, EventLog};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::AdapterError;

/// Default usage percentage at which a session counts as near its limit.
pub const DEFAULT_NEAR_LIMIT_PERCENT: f64 = 80.0;

/// Opaque handle to an adapter-side conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionHandle {
    pub name: String,
}

impl SessionHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Settings used when creating or resuming an adapter session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Working directory for tool use on the backend side.
    #[serde(default)]
    pub working_dir: Option<std::path::PathBuf>,
}

/// Authoritative token usage reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextUsage {
    pub used_tokens: u64,
    pub max_tokens: u64,
}

impl ContextUsage {
    pub fn percent(&self) -> f64 {
        if self.max_tokens == 0 {
            return 100.0;
        }
        (self.used_tokens as f64 / self.max_tokens as f64 * 100.0).clamp(0.0, 100.0)
    }
}

/// Callback receiving streamed response text as it arrives.
pub type ChunkCallback<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Contract the engine consumes from a model backend.
#[async_trait]
pub trait AdapterSession: Send + Sync {
    async fn start(&self) -> Result<(), AdapterError>;

    async fn stop(&self) -> Result<(), AdapterError>;

    async fn create_session(&self, config: &SessionConfig) -> Result<SessionHandle, AdapterError>;

    async fn resume_session(
        &self,
        name: &str,
        config: &SessionConfig,
    ) -> Result<SessionHandle, AdapterError>;

    async fn destroy_session(&self, session: &SessionHandle) -> Result<(), AdapterError>;

    /// Send a user message and return the full response text.
    async fn send(
        &self,
        session: &SessionHandle,
        text: &str,
        on_chunk: Option<ChunkCallback<'_>>,
    ) -> Result<String, AdapterError>;

    async fn context_usage(&self, session: &SessionHandle) -> Result<ContextUsage, AdapterError>;

    /// Whether the backend considers the session close to its context limit.
    async fn near_context_limit(&self, session: &SessionHandle) -> Result<bool, AdapterError> {
        let usage = self.context_usage(session).await?;
        Ok(usage.percent() >= DEFAULT_NEAR_LIMIT_PERCENT)
    }

    /// Write the session's events as JSON lines and return how many were written.
    async fn export_events(
        &self,
        session: &SessionHandle,
        path: &Path,
    ) -> Result<usize, AdapterError>;
}
