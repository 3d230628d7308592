use anyhow::{Context, Result};
use git2::{Repository, Signature};
use std::path::{Path, PathBuf};

pub struct GitTracker {
    repo: Repository,
}

impl GitTracker {
    pub fn new(project_dir: &Path) -> Result<Self> {
        let repo = Repository::open(project_dir).context("Failed to open git repository")?;
        Ok(Self { repo })
    }

    /// Find the repository containing `path`, if any.
    pub fn discover(path: &Path) -> Option<Self> {
        Repository::discover(path).ok().map(|repo| Self { repo })
    }

    /// Root of the working tree (None for bare repositories).
    pub fn workdir(&self) -> Option<PathBuf> {
        self.repo.workdir().map(Path::to_path_buf)
    }

    /// Stage `paths` and commit them with `message`.
    ///
    /// Paths outside the working tree or missing on disk are skipped.
    /// Returns `None` when nothing changed relative to HEAD.
    pub fn commit_paths(&self, paths: &[PathBuf], message: &str) -> Result<Option<String>> {
        let Some(workdir) = self.workdir() else {
            return Ok(None);
        };
        let workdir = workdir.canonicalize().unwrap_or(workdir);

        let mut index = self.repo.index()?;
        let mut staged = 0;
        for path in paths {
            let absolute = path.canonicalize().unwrap_or_else(|_| path.clone());
            let Ok(relative) = absolute.strip_prefix(&workdir) else {
                tracing::debug!(path = %path.display(), "not inside repository, skipping");
                continue;
            };
            if !absolute.exists() {
                continue;
            }
            index
                .add_path(relative)
                .with_context(|| format!("Failed to stage {}", relative.display()))?;
            staged += 1;
        }
        if staged == 0 {
            return Ok(None);
        }
        index.write()?;

        let tree_id = index.write_tree()?;
        let parent = self.get_head_commit();
        if let Some(ref parent) = parent
            && parent.tree_id() == tree_id
        {
            return Ok(None);
        }
        let tree = self.repo.find_tree(tree_id)?;

        let sig = self
            .repo
            .signature()
            .or_else(|_| Signature::now("conductor", "conductor@localhost"))?;

        // Handle unborn branch (new repo with no commits yet)
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        let commit_id = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;

        Ok(Some(commit_id.to_string()))
    }

    /// Get the HEAD commit if it exists (returns None for unborn branches)
    fn get_head_commit(&self) -> Option<git2::Commit<'_>> {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
    }

    /// Get current HEAD SHA (returns None for unborn branches)
    pub fn head_sha(&self) -> Option<String> {
        self.get_head_commit().map(|c| c.id().to_string())
    }

    /// Message of the HEAD commit.
    pub fn head_message(&self) -> Option<String> {
        self.get_head_commit()
            .and_then(|c| c.message().map(|m| m.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Repository;
    use std::fs;
    use tempfile::tempdir;

    fn setup_repo() -> (GitTracker, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "test").unwrap();
        config.set_str("user.email", "test@test.com").unwrap();
        drop(config);
        let tracker = GitTracker::new(dir.path()).unwrap();
        (tracker, dir)
    }

    #[test]
    fn test_commit_paths_on_unborn_branch() {
        let (tracker, dir) = setup_repo();
        assert!(tracker.head_sha().is_none());

        let file = dir.path().join("SESSION.md");
        fs::write(&file, "# Session\n").unwrap();
        let sha = tracker
            .commit_paths(&[file], "checkpoint: first")
            .unwrap()
            .unwrap();
        assert_eq!(sha.len(), 40);
        assert_eq!(tracker.head_message().as_deref(), Some("checkpoint: first"));
    }

    #[test]
    fn test_commit_paths_nothing_changed_is_noop() {
        let (tracker, dir) = setup_repo();
        let file = dir.path().join("SESSION.md");
        fs::write(&file, "same\n").unwrap();
        let first = tracker
            .commit_paths(std::slice::from_ref(&file), "checkpoint: a")
            .unwrap();
        assert!(first.is_some());

        let second = tracker.commit_paths(&[file], "checkpoint: b").unwrap();
        assert!(second.is_none());
        assert_eq!(tracker.head_message().as_deref(), Some("checkpoint: a"));
    }

    #[test]
    fn test_commit_paths_only_stages_given_files() {
        let (tracker, dir) = setup_repo();
        let tracked = dir.path().join("out.md");
        fs::write(&tracked, "one\n").unwrap();
        fs::write(dir.path().join("other.txt"), "unrelated\n").unwrap();
        tracker.commit_paths(&[tracked], "checkpoint: x").unwrap();

        let repo = Repository::open(dir.path()).unwrap();
        let tree = repo.head().unwrap().peel_to_tree().unwrap();
        assert!(tree.get_name("out.md").is_some());
        assert!(tree.get_name("other.txt").is_none());
    }

    #[test]
    fn test_commit_paths_skips_missing_and_outside() {
        let (tracker, dir) = setup_repo();
        let outside = tempdir().unwrap();
        let outside_file = outside.path().join("x.md");
        fs::write(&outside_file, "x").unwrap();

        let result = tracker
            .commit_paths(
                &[dir.path().join("missing.md"), outside_file],
                "checkpoint: none",
            )
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_discover_outside_repo() {
        let dir = tempdir().unwrap();
        // tempdirs normally live outside any repository
        if Repository::discover(dir.path()).is_err() {
            assert!(GitTracker::discover(dir.path()).is_none());
        }
    }
}
