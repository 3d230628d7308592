use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::CheckpointError;
use crate::session::{Message, Session, SessionStatus};

const CHECKPOINT_PREFIX: &str = "checkpoint-";
const CHECKPOINT_SUFFIX: &str = ".json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointKind {
    Manual,
    Pause,
    Consult,
    Failure,
}

impl std::fmt::Display for CheckpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointKind::Manual => write!(f, "manual"),
            CheckpointKind::Pause => write!(f, "pause"),
            CheckpointKind::Consult => write!(f, "consult"),
            CheckpointKind::Failure => write!(f, "failure"),
        }
    }
}

/// Immutable snapshot of a session at a point in the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub cycle_number: u32,
    /// Index of the next step to execute when resuming.
    pub prompt_index: usize,
    pub status: SessionStatus,
    pub kind: CheckpointKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter_session: Option<String>,
    /// Message log at the time of the snapshot.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
}

impl Checkpoint {
    /// Whether a consult window has closed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// What to record in a new checkpoint.
#[derive(Debug, Clone)]
pub struct CheckpointRequest<'a> {
    pub kind: CheckpointKind,
    pub name: &'a str,
    pub message: Option<&'a str>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl<'a> CheckpointRequest<'a> {
    pub fn new(kind: CheckpointKind, name: &'a str) -> Self {
        Self {
            kind,
            name,
            message: None,
            expires_at: None,
        }
    }

    pub fn with_message(mut self, message: &'a str) -> Self {
        self.message = Some(message);
        self
    }

    pub fn expires_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = at;
        self
    }
}

/// Append-only checkpoint persistence under `<sessions>/<session_id>/`.
pub struct CheckpointStore {
    sessions_dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
        }
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(session_id)
    }

    /// Persist a snapshot of `session` and return the record's path.
    pub fn save(
        &self,
        session: &Session,
        request: CheckpointRequest<'_>,
    ) -> Result<PathBuf, CheckpointError> {
        let dir = self.session_dir(&session.id);
        fs::create_dir_all(&dir).map_err(|source| CheckpointError::WriteFailed {
            path: dir.clone(),
            source,
        })?;

        let seq = self.last_seq(&session.id)?.map_or(1, |s| s + 1);
        let path = dir.join(format!("{}{:04}{}", CHECKPOINT_PREFIX, seq, CHECKPOINT_SUFFIX));

        let checkpoint = Checkpoint {
            id: uuid::Uuid::new_v4().to_string(),
            name: request.name.to_string(),
            timestamp: Utc::now(),
            cycle_number: session.cycle_number,
            prompt_index: session.prompt_index,
            status: session.status(),
            kind: request.kind,
            message: request.message.map(str::to_string),
            expires_at: request.expires_at,
            adapter_session: session.adapter_session.clone(),
            messages: session.messages.clone(),
        };

        let json = serde_json::to_string_pretty(&checkpoint).map_err(|e| {
            CheckpointError::WriteFailed {
                path: path.clone(),
                source: std::io::Error::other(e),
            }
        })?;

        // create_new keeps records immutable once written
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| CheckpointError::WriteFailed {
                path: path.clone(),
                source,
            })?;
        file.write_all(json.as_bytes())
            .map_err(|source| CheckpointError::WriteFailed {
                path: path.clone(),
                source,
            })?;

        tracing::info!(
            session_id = %session.id,
            kind = %checkpoint.kind,
            name = %checkpoint.name,
            path = %path.display(),
            "checkpoint saved"
        );

        Ok(path)
    }

    pub fn load(&self, path: &Path) -> Result<Checkpoint, CheckpointError> {
        let content = fs::read_to_string(path).map_err(|source| CheckpointError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| CheckpointError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// All checkpoint records for a session in sequence order.
    pub fn list(&self, session_id: &str) -> Result<Vec<(PathBuf, Checkpoint)>, CheckpointError> {
        self.record_paths(session_id)?
            .into_iter()
            .map(|(_, path)| {
                let checkpoint = self.load(&path)?;
                Ok((path, checkpoint))
            })
            .collect()
    }

    pub fn latest(
        &self,
        session_id: &str,
    ) -> Result<Option<(PathBuf, Checkpoint)>, CheckpointError> {
        match self.record_paths(session_id)?.pop() {
            Some((_, path)) => {
                let checkpoint = self.load(&path)?;
                Ok(Some((path, checkpoint)))
            }
            None => Ok(None),
        }
    }

    /// Restore cursor, status, message log and history from the most
    /// recent checkpoint.
    pub fn apply_to(&self, session: &mut Session) -> Result<Checkpoint, CheckpointError> {
        let records = self.list(&session.id)?;
        let Some((_, latest)) = records.last() else {
            return Err(CheckpointError::NoCheckpoints(session.id.clone()));
        };
        let latest = latest.clone();

        session.prompt_index = latest.prompt_index;
        session.cycle_number = latest.cycle_number;
        session.restore_status(latest.status);
        if latest.adapter_session.is_some() {
            session.adapter_session = latest.adapter_session.clone();
        }
        session.messages = latest.messages.clone();
        session.checkpoints = records.into_iter().map(|(path, _)| path).collect();

        Ok(latest)
    }

    /// Session ids that have a directory in the store.
    pub fn session_ids(&self) -> Result<Vec<String>, CheckpointError> {
        if !self.sessions_dir.exists() {
            return Ok(Vec::new());
        }
        let entries =
            fs::read_dir(&self.sessions_dir).map_err(|source| CheckpointError::ReadFailed {
                path: self.sessions_dir.clone(),
                source,
            })?;
        let mut ids: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn last_seq(&self, session_id: &str) -> Result<Option<u32>, CheckpointError> {
        Ok(self
            .record_paths(session_id)?
            .last()
            .map(|(seq, _)| *seq))
    }

    fn record_paths(&self, session_id: &str) -> Result<Vec<(u32, PathBuf)>, CheckpointError> {
        let dir = self.session_dir(session_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir).map_err(|source| CheckpointError::ReadFailed {
            path: dir.clone(),
            source,
        })?;

        let mut records: Vec<(u32, PathBuf)> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name();
                let seq = name
                    .to_str()?
                    .strip_prefix(CHECKPOINT_PREFIX)?
                    .strip_suffix(CHECKPOINT_SUFFIX)?
                    .parse::<u32>()
                    .ok()?;
                Some((seq, e.path()))
            })
            .collect();
        records.sort_by_key(|(seq, _)| *seq);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;
    use tempfile::tempdir;

    fn running_session(id: &str) -> Session {
        let mut session = Session::new(id);
        session.transition(SessionStatus::Running).unwrap();
        session
    }

    #[test]
    fn test_save_then_load_preserves_cursor_and_status() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let mut session = running_session("s1");
        session.prompt_index = 3;
        session.transition(SessionStatus::Paused).unwrap();

        let path = store
            .save(
                &session,
                CheckpointRequest::new(CheckpointKind::Pause, "review").with_message("look"),
            )
            .unwrap();
        assert!(path.ends_with("s1/checkpoint-0001.json"));

        let loaded = store.load(&path).unwrap();
        assert_eq!(loaded.prompt_index, 3);
        assert_eq!(loaded.status, SessionStatus::Paused);
        assert_eq!(loaded.name, "review");
        assert_eq!(loaded.kind, CheckpointKind::Pause);
        assert_eq!(loaded.message.as_deref(), Some("look"));
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let mut session = running_session("s1");

        for i in 0..3 {
            session.prompt_index = i;
            store
                .save(&session, CheckpointRequest::new(CheckpointKind::Manual, "m"))
                .unwrap();
        }

        let records = store.list("s1").unwrap();
        let names: Vec<String> = records
            .iter()
            .map(|(p, _)| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "checkpoint-0001.json",
                "checkpoint-0002.json",
                "checkpoint-0003.json"
            ]
        );
        let (_, latest) = store.latest("s1").unwrap().unwrap();
        assert_eq!(latest.prompt_index, 2);
    }

    #[test]
    fn test_apply_to_restores_session() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let mut session = running_session("s1");
        session.cycle_number = 2;
        session.prompt_index = 5;
        session.adapter_session = Some("backend-1".into());
        session.push_message(Role::User, "plan the API");
        session.push_message(Role::Assistant, "two endpoints");
        session.transition(SessionStatus::Consulting).unwrap();
        store
            .save(&session, CheckpointRequest::new(CheckpointKind::Consult, "design"))
            .unwrap();

        let mut resumed = Session::new("s1");
        let checkpoint = store.apply_to(&mut resumed).unwrap();
        assert_eq!(checkpoint.kind, CheckpointKind::Consult);
        assert_eq!(resumed.prompt_index, 5);
        assert_eq!(resumed.cycle_number, 2);
        assert_eq!(resumed.status(), SessionStatus::Consulting);
        assert_eq!(resumed.adapter_session.as_deref(), Some("backend-1"));
        assert_eq!(resumed.checkpoints.len(), 1);
        assert_eq!(resumed.messages.len(), 2);
        assert_eq!(resumed.last_response(), Some("two endpoints"));
    }

    #[test]
    fn test_apply_to_without_checkpoints() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let mut session = Session::new("none");
        assert!(matches!(
            store.apply_to(&mut session),
            Err(CheckpointError::NoCheckpoints(_))
        ));
        assert!(store.latest("none").unwrap().is_none());
    }

    #[test]
    fn test_malformed_checkpoint() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let session_dir = store.session_dir("bad");
        fs::create_dir_all(&session_dir).unwrap();
        fs::write(session_dir.join("checkpoint-0001.json"), "{not json").unwrap();
        assert!(matches!(
            store.list("bad"),
            Err(CheckpointError::Malformed { .. })
        ));
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let checkpoint = Checkpoint {
            id: "x".into(),
            name: "c".into(),
            timestamp: now,
            cycle_number: 1,
            prompt_index: 0,
            status: SessionStatus::Consulting,
            kind: CheckpointKind::Consult,
            message: None,
            expires_at: Some(now + chrono::Duration::seconds(5)),
            adapter_session: None,
            messages: Vec::new(),
        };
        assert!(!checkpoint.is_expired(now));
        assert!(checkpoint.is_expired(now + chrono::Duration::seconds(6)));
    }

    #[test]
    fn test_session_ids() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("sessions"));
        assert!(store.session_ids().unwrap().is_empty());
        store
            .save(&running_session("b"), CheckpointRequest::new(CheckpointKind::Manual, "x"))
            .unwrap();
        store
            .save(&running_session("a"), CheckpointRequest::new(CheckpointKind::Manual, "x"))
            .unwrap();
        assert_eq!(store.session_ids().unwrap(), vec!["a", "b"]);
    }
}
