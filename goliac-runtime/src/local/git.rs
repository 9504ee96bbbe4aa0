//! The git-backed [`TeamsStore`].
use std::path::{Path, PathBuf};

use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    Cred, FetchOptions, IndexAddOption, Oid, PushOptions, RemoteCallbacks, Repository, ResetType,
    Signature,
};
use secrecy::{ExposeSecret, SecretString};

use super::store::TeamsStore;
use crate::{Error, Result};

/// A [`TeamsStore`] backed by a real clone in a working directory.
///
/// HTTPS authentication uses `x-access-token` as the username and the
/// forge access token as the password; the token is injected per pass
/// because App tokens rotate.
pub struct GitTeamsStore {
    url: String,
    workdir: PathBuf,
    author_name: String,
    author_email: String,
    token: Option<SecretString>,
    repo: Option<Repository>,
}

impl GitTeamsStore {
    /// A store cloning `url` into `workdir` and authoring synthetic
    /// commits as `author_name <author_email>`.
    pub fn new(
        url: impl Into<String>,
        workdir: impl Into<PathBuf>,
        author_name: impl Into<String>,
        author_email: impl Into<String>,
    ) -> Self {
        GitTeamsStore {
            url: url.into(),
            workdir: workdir.into(),
            author_name: author_name.into(),
            author_email: author_email.into(),
            token: None,
            repo: None,
        }
    }

    fn callbacks(&self) -> RemoteCallbacks<'_> {
        let mut callbacks = RemoteCallbacks::new();
        let token = self.token.clone();
        callbacks.credentials(move |_url, _username, _allowed| match &token {
            Some(token) => Cred::userpass_plaintext("x-access-token", token.expose_secret()),
            None => Cred::default(),
        });
        callbacks
    }

    fn repo(&self) -> Result<&Repository> {
        self.repo.as_ref().ok_or(Error::NotCheckedOut)
    }

    fn push_refspec(&self, refspec: &str) -> Result<()> {
        let repo = self.repo()?;
        let mut remote = repo.find_remote("origin")?;
        let mut options = PushOptions::new();
        options.remote_callbacks(self.callbacks());
        remote.push(&[refspec], Some(&mut options))?;
        Ok(())
    }
}

impl TeamsStore for GitTeamsStore {
    fn set_token(&mut self, token: SecretString) {
        self.token = Some(token);
    }

    fn checkout(&mut self, branch: &str) -> Result<()> {
        if self.repo.is_none() {
            let existing = Repository::open(&self.workdir);
            let repo = match existing {
                Ok(repo) => repo,
                Err(_) => {
                    let mut fetch = FetchOptions::new();
                    fetch.remote_callbacks(self.callbacks());
                    let mut builder = RepoBuilder::new();
                    builder.branch(branch).fetch_options(fetch);
                    builder.clone(&self.url, &self.workdir)?
                }
            };
            self.repo = Some(repo);
        }

        let repo = self.repo()?;
        {
            let mut remote = repo.find_remote("origin")?;
            let mut fetch = FetchOptions::new();
            fetch.remote_callbacks(self.callbacks());
            remote.fetch(&[branch], Some(&mut fetch), None)?;
        }
        let oid = repo.refname_to_id(&format!("refs/remotes/origin/{branch}"))?;
        let commit = repo.find_commit(oid)?;
        repo.branch(branch, &commit, true)?;
        repo.set_head(&format!("refs/heads/{branch}"))?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        repo.reset(commit.as_object(), ResetType::Hard, Some(&mut checkout))?;
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<PathBuf>> {
        fn walk(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
            for entry in std::fs::read_dir(dir)? {
                let entry = entry?;
                let path = entry.path();
                if entry.file_name() == ".git" {
                    continue;
                }
                if path.is_dir() {
                    walk(root, &path, out)?;
                } else if let Ok(relative) = path.strip_prefix(root) {
                    out.push(relative.to_path_buf());
                }
            }
            Ok(())
        }

        self.repo()?;
        let mut files = Vec::new();
        walk(&self.workdir, &self.workdir, &mut files)?;
        files.sort();
        Ok(files)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.repo()?;
        Ok(std::fs::read(self.workdir.join(path))?)
    }

    fn write(&mut self, path: &Path, data: &[u8]) -> Result<()> {
        self.repo()?;
        let target = self.workdir.join(path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(target, data)?;
        Ok(())
    }

    fn remove(&mut self, path: &Path) -> Result<()> {
        self.repo()?;
        match std::fs::remove_file(self.workdir.join(path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn commit_and_push(&mut self, branch: &str, message: &str) -> Result<Option<String>> {
        let oid = {
            let repo = self.repo()?;
            let mut index = repo.index()?;
            index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
            index.update_all(["*"].iter(), None)?;
            index.write()?;
            let tree_id = index.write_tree()?;
            let head = repo.head()?.peel_to_commit()?;
            if head.tree_id() == tree_id {
                return Ok(None);
            }
            let signature = Signature::now(&self.author_name, &self.author_email)?;
            let tree = repo.find_tree(tree_id)?;
            repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &[&head])?
        };
        self.push_refspec(&format!("+refs/heads/{branch}:refs/heads/{branch}"))?;
        Ok(Some(oid.to_string()))
    }

    fn head(&self) -> Result<String> {
        Ok(self.repo()?.head()?.peel_to_commit()?.id().to_string())
    }

    fn tag(&mut self, tag: &str, commit: &str) -> Result<()> {
        {
            let repo = self.repo()?;
            let oid = Oid::from_str(commit)?;
            let object = repo.find_object(oid, None)?;
            repo.tag_lightweight(tag, &object, true)?;
        }
        self.push_refspec(&format!("+refs/tags/{tag}:refs/tags/{tag}"))?;
        Ok(())
    }
}
