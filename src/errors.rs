//! Typed error hierarchy for conductor.
//!
//! Three top-level enums cover the three boundaries:
//! - `EngineError`: session and sequencer failures
//! - `AdapterError`: language-model adapter failures
//! - `CheckpointError`: checkpoint persistence failures

use std::path::PathBuf;
use thiserror::Error;

use crate::session::SessionStatus;

/// Errors from the step engine and session state machine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("Session {session_id} is already {status} and cannot run again")]
    SessionTerminal {
        session_id: String,
        status: SessionStatus,
    },

    #[error("Review pending: remove {} to continue", path.display())]
    ReviewPending { path: PathBuf },

    #[error("Required context input missing: {}", path.display())]
    MissingContext { path: PathBuf },

    #[error("Invalid duration '{0}'")]
    InvalidDuration(String),

    #[error("Invalid lsp command '{0}'")]
    InvalidLspCommand(String),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors raised across the adapter boundary.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Failed to create adapter session: {0}")]
    CreateFailed(String),

    #[error("Failed to resume adapter session '{name}': {message}")]
    ResumeFailed { name: String, message: String },

    #[error("Adapter session '{0}' is not active")]
    UnknownSession(String),

    #[error("Failed to spawn adapter process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("Adapter reported an error: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from checkpoint persistence.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Failed to write checkpoint at {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read checkpoint at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Checkpoint at {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No checkpoints recorded for session {0}")]
    NoCheckpoints(String),
}
