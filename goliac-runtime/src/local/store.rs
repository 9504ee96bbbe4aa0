//! Storage seam for the teams repository.
//!
//! The engine never touches git directly; it goes through
//! [`TeamsStore`], with the real implementation in
//! [`git`](super::git) and an in-memory one here for tests and
//! ephemeral tooling.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use secrecy::SecretString;

use crate::{Error, Result};

/// File access plus commit/push/tag over a teams repository checkout.
pub trait TeamsStore {
    /// Provide the access token for authenticated transports.
    ///
    /// Called once per pass because App tokens rotate; stores without
    /// a network transport ignore it.
    fn set_token(&mut self, _token: SecretString) {}

    /// Clone or update the checkout to the tip of `branch`.
    fn checkout(&mut self, branch: &str) -> Result<()>;

    /// All tracked files, as paths relative to the tree root.
    fn list_files(&self) -> Result<Vec<PathBuf>>;

    /// Read one file.
    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Create or overwrite one file.
    fn write(&mut self, path: &Path, data: &[u8]) -> Result<()>;

    /// Delete one file; deleting a missing file is not an error.
    fn remove(&mut self, path: &Path) -> Result<()>;

    /// Commit every pending change as the configured author and push
    /// to `branch`. Returns the new commit id, or `None` when the
    /// tree was unchanged and nothing was committed.
    fn commit_and_push(&mut self, branch: &str, message: &str) -> Result<Option<String>>;

    /// The commit id the checkout currently points at.
    fn head(&self) -> Result<String>;

    /// Force-move `tag` to `commit` and push it.
    fn tag(&mut self, tag: &str, commit: &str) -> Result<()>;
}

/// An in-memory [`TeamsStore`].
///
/// Commits are sequence numbers formatted as fake hashes; `checkout`
/// is a no-op. This is the test double for everything above the
/// storage seam, mirroring the way the engine can run against either
/// a real or an in-memory filesystem.
#[derive(Debug, Default)]
pub struct MemoryTeamsStore {
    files: BTreeMap<PathBuf, Vec<u8>>,
    tags: BTreeMap<String, String>,
    commits: Vec<(String, String)>,
    dirty: bool,
    sequence: u64,
}

impl MemoryTeamsStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file without going through a commit, for test setup.
    pub fn seed(&mut self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), data.into());
    }

    /// All `(commit id, message)` pairs committed so far.
    pub fn commits(&self) -> &[(String, String)] {
        &self.commits
    }

    /// Tags by name.
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }
}

impl TeamsStore for MemoryTeamsStore {
    fn checkout(&mut self, _branch: &str) -> Result<()> {
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<PathBuf>> {
        Ok(self.files.keys().cloned().collect())
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )))
    }

    fn write(&mut self, path: &Path, data: &[u8]) -> Result<()> {
        let previous = self.files.insert(path.to_path_buf(), data.to_vec());
        if previous.as_deref() != Some(data) {
            self.dirty = true;
        }
        Ok(())
    }

    fn remove(&mut self, path: &Path) -> Result<()> {
        if self.files.remove(path).is_some() {
            self.dirty = true;
        }
        Ok(())
    }

    fn commit_and_push(&mut self, _branch: &str, message: &str) -> Result<Option<String>> {
        if !self.dirty {
            return Ok(None);
        }
        self.dirty = false;
        self.sequence += 1;
        let sha = format!("{:040x}", self.sequence);
        self.commits.push((sha.clone(), message.to_string()));
        Ok(Some(sha))
    }

    fn head(&self) -> Result<String> {
        Ok(self
            .commits
            .last()
            .map(|(sha, _)| sha.clone())
            .unwrap_or_else(|| format!("{:040x}", 0)))
    }

    fn tag(&mut self, tag: &str, commit: &str) -> Result<()> {
        self.tags.insert(tag.to_string(), commit.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_is_skipped_when_clean() {
        let mut store = MemoryTeamsStore::new();
        assert_eq!(store.commit_and_push("main", "noop").unwrap(), None);

        store.write(Path::new("a.yaml"), b"x").unwrap();
        let sha = store.commit_and_push("main", "add a").unwrap().unwrap();
        assert_eq!(store.head().unwrap(), sha);

        // identical content does not dirty the tree
        store.write(Path::new("a.yaml"), b"x").unwrap();
        assert_eq!(store.commit_and_push("main", "noop").unwrap(), None);
    }

    #[test]
    fn tags_move() {
        let mut store = MemoryTeamsStore::new();
        store.write(Path::new("a"), b"1").unwrap();
        let sha = store.commit_and_push("main", "c1").unwrap().unwrap();
        store.tag("goliac", &sha).unwrap();
        assert_eq!(store.tags()["goliac"], sha);
    }
}
