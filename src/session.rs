//! Session state owned by a single engine invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::errors::EngineError;

/// Lifecycle status of a session.
///
/// `idle → running → {paused, consulting, completed, failed}`. `completed`
/// and `failed` are terminal; `paused` and `consulting` return to `running`
/// when the session is resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Consulting,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::Paused => "paused",
            SessionStatus::Consulting => "consulting",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }

    /// Whether the state machine permits moving from `self` to `to`.
    pub fn can_transition_to(&self, to: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, to) {
            (Idle, Running) => true,
            (Running, Paused | Consulting | Completed | Failed) => true,
            (Paused | Consulting, Running) => true,
            // A resume that fails before reaching `running` still ends the session.
            (Idle | Paused | Consulting, Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(SessionStatus::Idle),
            "running" => Ok(SessionStatus::Running),
            "paused" => Ok(SessionStatus::Paused),
            "consulting" => Ok(SessionStatus::Consulting),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            _ => anyhow::bail!(
                "Invalid session status '{}'. Valid values: idle, running, paused, consulting, completed, failed",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Content injected by the engine (command output, verifier reports).
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Token accounting for the conversation.
///
/// The adapter's count is authoritative; [`ContextWindow::record_local`]
/// only keeps an advisory estimate between refreshes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindow {
    pub used_tokens: u64,
    pub max_tokens: u64,
}

impl ContextWindow {
    pub fn new(used_tokens: u64, max_tokens: u64) -> Self {
        Self {
            used_tokens,
            max_tokens,
        }
    }

    /// Usage as a percentage of the window, clamped to `[0, 100]`.
    pub fn usage_percent(&self) -> f64 {
        if self.max_tokens == 0 {
            return 100.0;
        }
        let pct = self.used_tokens as f64 / self.max_tokens as f64 * 100.0;
        pct.clamp(0.0, 100.0)
    }

    pub fn record_local(&mut self, tokens: u64) {
        self.used_tokens = self.used_tokens.saturating_add(tokens);
    }

    pub fn sync(&mut self, used_tokens: u64, max_tokens: u64) {
        self.used_tokens = used_tokens;
        self.max_tokens = max_tokens;
    }
}

/// A long-lived automation session.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    /// Name of the adapter-side session, kept so a later run can resume it.
    pub adapter_session: Option<String>,
    pub messages: Vec<Message>,
    status: SessionStatus,
    /// Index of the next step to execute.
    pub prompt_index: usize,
    pub cycle_number: u32,
    pub checkpoints: Vec<PathBuf>,
    pub context: ContextWindow,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            adapter_session: None,
            messages: Vec::new(),
            status: SessionStatus::Idle,
            prompt_index: 0,
            cycle_number: 0,
            checkpoints: Vec::new(),
            context: ContextWindow::default(),
        }
    }

    /// Create a session with a fresh random id.
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Move to `to`, enforcing the lifecycle rules.
    pub fn transition(&mut self, to: SessionStatus) -> Result<(), EngineError> {
        if self.status == to {
            return Ok(());
        }
        if !self.status.can_transition_to(to) {
            return Err(EngineError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Restore persisted state without going through the state machine.
    pub(crate) fn restore_status(&mut self, status: SessionStatus) {
        self.status = status;
    }

    pub fn push_message(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(Message {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    /// Most recent assistant response, if any.
    pub fn last_response(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    /// Render the message log as markdown (the checkpoint output artifact).
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# Session {}\n\n", self.id);
        for message in &self.messages {
            out.push_str(&format!(
                "## {} ({})\n\n{}\n\n",
                message.role,
                message.timestamp.to_rfc3339(),
                message.content.trim_end()
            ));
        }
        out
    }
}
