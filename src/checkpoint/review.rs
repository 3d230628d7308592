//! Human-review gate.
//!
//! A pause or consult writes `review-<nonce>.md` next to the session's
//! checkpoints. While any marker exists the session will not run again;
//! deleting the file is how a reviewer signs off.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{CheckpointError, EngineError};

const MARKER_PREFIX: &str = "review-";
const MARKER_SUFFIX: &str = ".md";

pub struct ReviewGate {
    dir: PathBuf,
}

impl ReviewGate {
    pub fn new(session_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: session_dir.into(),
        }
    }

    /// Fresh per-invocation nonce for marker names.
    pub fn nonce() -> String {
        uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
    }

    pub fn marker_path(&self, nonce: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", MARKER_PREFIX, nonce, MARKER_SUFFIX))
    }

    /// Write a review marker describing what needs a human.
    pub fn write_marker(
        &self,
        nonce: &str,
        title: &str,
        body: &str,
        checkpoint: &Path,
    ) -> Result<PathBuf, CheckpointError> {
        fs::create_dir_all(&self.dir).map_err(|source| CheckpointError::WriteFailed {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.marker_path(nonce);
        let content = format!(
            "# Review: {}\n\n{}\n\nCheckpoint: `{}`\n\nDelete this file to let the session continue.\n",
            title,
            body.trim_end(),
            checkpoint.display()
        );
        fs::write(&path, content).map_err(|source| CheckpointError::WriteFailed {
            path: path.clone(),
            source,
        })?;
        tracing::info!(marker = %path.display(), "review marker written");
        Ok(path)
    }

    pub fn pending(&self) -> Result<Vec<PathBuf>, CheckpointError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir).map_err(|source| CheckpointError::ReadFailed {
            path: self.dir.clone(),
            source,
        })?;
        let mut markers: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .is_some_and(|n| n.starts_with(MARKER_PREFIX) && n.ends_with(MARKER_SUFFIX))
            })
            .map(|e| e.path())
            .collect();
        markers.sort();
        Ok(markers)
    }

    /// Remove every marker, returning how many were removed.
    pub fn clear(&self) -> Result<usize, CheckpointError> {
        let markers = self.pending()?;
        for marker in &markers {
            fs::remove_file(marker).map_err(|source| CheckpointError::WriteFailed {
                path: marker.clone(),
                source,
            })?;
        }
        Ok(markers.len())
    }

    /// Fail with [`EngineError::ReviewPending`] if any marker exists.
    pub fn ensure_clear(&self) -> Result<(), EngineError> {
        match self.pending()?.into_iter().next() {
            Some(path) => Err(EngineError::ReviewPending { path }),
            None => Ok(()),
        }
    }

    /// Block until all markers have been removed.
    pub async fn wait_until_clear(&self, poll: Duration) -> Result<(), EngineError> {
        let mut announced = false;
        loop {
            let pending = self.pending()?;
            if pending.is_empty() {
                return Ok(());
            }
            if !announced {
                tracing::info!(
                    count = pending.len(),
                    first = %pending[0].display(),
                    "waiting for review markers to be removed"
                );
                announced = true;
            }
            tokio::time::sleep(poll).await;
        }
    }
}
