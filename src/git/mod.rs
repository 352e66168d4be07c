//! Git backend for shelfdb
//!
//! A database root is a git repository. Every write the query runner makes
//! (an update, a delete, an index change, an import) is followed by one
//! commit, so `git log` is the audit trail of the collection.

use git2::{IndexAddOption, Repository as Git2Repo, Signature};
use std::path::Path;

use crate::error::{Error, Result};

const DEFAULT_NAME: &str = "shelfdb";
const DEFAULT_EMAIL: &str = "shelfdb@local";

/// Commit author, taken from the database config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Default for Author {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            email: DEFAULT_EMAIL.to_string(),
        }
    }
}

/// One entry of the commit log
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub hash: String,
    pub summary: String,
}

/// Git repository wrapper
pub struct Repository {
    inner: Git2Repo,
    author: Option<Author>,
}

impl Repository {
    /// Open the repository at a database root
    pub fn open(path: &Path) -> Result<Self> {
        let inner = Git2Repo::open(path).map_err(|e| {
            Error::unavailable(format!("{} is not a git repository: {}", path.display(), e.message()))
        })?;
        Ok(Self { inner, author: None })
    }

    /// Open an existing repository or initialize a new one with an empty
    /// initial commit
    pub fn open_or_init(path: &Path) -> Result<Self> {
        let inner = match Git2Repo::open(path) {
            Ok(repo) => repo,
            Err(_) => {
                let repo = Git2Repo::init(path)?;
                Self::create_initial_commit(&repo)?;
                tracing::info!("Initialized git repository at {}", path.display());
                repo
            }
        };

        Ok(Self { inner, author: None })
    }

    /// Use this author for commits instead of the git config identity
    pub fn with_author(mut self, author: Author) -> Self {
        self.author = Some(author);
        self
    }

    fn create_initial_commit(repo: &Git2Repo) -> Result<()> {
        let sig = Signature::now(DEFAULT_NAME, DEFAULT_EMAIL)?;
        let tree_id = repo.index()?.write_tree()?;
        let tree = repo.find_tree(tree_id)?;

        repo.commit(Some("HEAD"), &sig, &sig, "Initialize shelfdb database", &tree, &[])?;

        Ok(())
    }

    /// Stage every change (including removals) and commit it
    pub fn commit(&self, message: &str) -> Result<git2::Oid> {
        let sig = self.signature()?;
        let mut index = self.inner.index()?;

        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = self.inner.find_tree(tree_id)?;

        let parent = self.inner.head()?.peel_to_commit()?;

        let oid = self
            .inner
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?;

        tracing::info!("Committed {}: {}", short_hash(&oid.to_string()), message);

        Ok(oid)
    }

    /// Get the current HEAD commit hash
    pub fn head_hash(&self) -> Result<String> {
        let head = self.inner.head()?;
        let commit = head.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    /// Check if there are uncommitted changes
    pub fn has_changes(&self) -> Result<bool> {
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(true).include_ignored(false);
        let statuses = self.inner.statuses(Some(&mut opts))?;
        Ok(!statuses.is_empty())
    }

    /// Most recent commits, newest first
    pub fn recent_commits(&self, limit: usize) -> Result<Vec<CommitInfo>> {
        let mut walk = self.inner.revwalk()?;
        walk.push_head()?;

        let mut commits = Vec::new();
        for oid in walk.take(limit) {
            let commit = self.inner.find_commit(oid?)?;
            commits.push(CommitInfo {
                hash: commit.id().to_string(),
                summary: commit.summary().unwrap_or_default().to_string(),
            });
        }
        Ok(commits)
    }

    fn signature(&self) -> Result<Signature<'static>> {
        if let Some(author) = &self.author {
            return Ok(Signature::now(&author.name, &author.email)?);
        }
        self.inner
            .signature()
            .or_else(|_| Signature::now(DEFAULT_NAME, DEFAULT_EMAIL))
            .map_err(Into::into)
    }
}

/// First seven characters of a commit hash
pub fn short_hash(hash: &str) -> &str {
    hash.get(..7).unwrap_or(hash)
}
