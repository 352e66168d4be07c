//! shelfdb - a git-backed shelf of book records
//!
//! Records are markdown files with YAML frontmatter; the database root is a
//! git repository and every write is a commit. Queries, updates,
//! aggregations and index declarations go through [`QueryRunner`], which
//! works over any [`RecordStore`].
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      shelf (CLI)                             │
//! └──────────────┬───────────────────────────────────────────────┘
//!                │ shelfql (filters, changes, pipelines)
//!                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  QueryRunner<S: RecordStore>                                 │
//! │   filter validation · aggregation · index catalog · explain  │
//! └──────────────┬───────────────────────────────┬───────────────┘
//!                ▼                               ▼
//! ┌─────────────────────────────┐   ┌────────────────────────────┐
//! │ Collection (markdown files) │   │ MemoryStore (in process)   │
//! └──────────────┬──────────────┘   └────────────────────────────┘
//!                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Database: session lock · config · schemas · git history      │
//! │   /collections/{name}/*.md   /.shelf/{config,indexes,schemas}│
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod books;
pub mod config;
pub mod error;
pub mod git;
pub mod index;
pub mod query;
pub mod schema;
pub mod session;
pub mod storage;
pub mod validation;

pub use config::Config;
pub use error::{Error, Result};
pub use query::{DeleteOutcome, QueryRunner, UpdateOutcome};
pub use schema::Schema;
pub use storage::collection::Collection;
pub use storage::document::{Document, Fields, Value};
pub use storage::memory::MemoryStore;
pub use storage::RecordStore;

use std::path::PathBuf;

use schema::SchemaRegistry;
use session::Session;
use validation::validate_collection_name;

/// Metadata directory under a database root
pub const META_DIR: &str = ".shelf";

/// Directory holding one subdirectory per collection
pub const COLLECTIONS_DIR: &str = "collections";

const SESSION_LOCK_PATTERN: &str = ".shelf/session.lock";

/// An open database session
///
/// Only one session may be open on a root at a time. The session is
/// released by [`Database::close`] or, failing that, when the handle is
/// dropped.
pub struct Database {
    /// Root path of the database
    pub root: PathBuf,
    pub config: Config,
    git: git::Repository,
    schemas: SchemaRegistry,
    session: Session,
}

/// Summary printed by `shelf status`
#[derive(Debug, serde::Serialize)]
pub struct Status {
    pub root: PathBuf,
    pub collection: String,
    pub records: usize,
    pub indexes: Vec<String>,
    pub head: String,
    pub uncommitted_changes: bool,
    pub recent_commits: Vec<String>,
}

impl Database {
    /// Create a database at `root` (or complete a partial one), then open it
    ///
    /// Existing config and schema files are left alone.
    pub async fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let meta = root.join(META_DIR);

        for dir in [meta.join("schemas"), meta.join("indexes"), root.join(COLLECTIONS_DIR)] {
            std::fs::create_dir_all(&dir).map_err(|source| Error::FileWriteError { path: dir, source })?;
        }

        let repo = git::Repository::open_or_init(&root)?;

        Self::ignore_session_lock(&root)?;

        let config = if Config::path(&root).exists() {
            Config::load(&root)?
        } else {
            let config = Config::default();
            config.save(&root)?;
            config
        };

        let mut schemas = SchemaRegistry::load(&root)?;
        if schemas.get(&config.collection).is_none() {
            schemas.register(Schema::books(config.collection.clone()))?;
        }

        let repo = repo.with_author(config.author());
        if repo.has_changes()? {
            repo.commit("Initialize shelfdb layout")?;
        }

        tracing::info!("Initialized database at {}", root.display());
        Self::connect_with(root, config).await
    }

    /// Open an existing database with the configuration stored in it
    pub async fn connect(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        Self::check_root(&root)?;
        let config = Config::load(&root)?;
        Self::connect_with(root, config).await
    }

    /// Open an existing database with an explicit configuration
    pub async fn connect_with(root: impl Into<PathBuf>, config: Config) -> Result<Self> {
        let root = root.into();
        Self::check_root(&root)?;
        config.validate(&Config::path(&root))?;

        let git = git::Repository::open(&root)?.with_author(config.author());
        let schemas = SchemaRegistry::load(&root)?;
        let session = Session::acquire(&root.join(META_DIR))?;

        tracing::info!(
            "Opened database {} (collection '{}')",
            root.display(),
            config.collection
        );

        Ok(Self {
            root,
            config,
            git,
            schemas,
            session,
        })
    }

    /// Make sure `.gitignore` excludes the session lock, keeping existing entries
    fn ignore_session_lock(root: &std::path::Path) -> Result<()> {
        let path = root.join(".gitignore");
        let mut content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => return Err(Error::FileReadError { path, source }),
        };
        if content.lines().any(|line| line.trim() == SESSION_LOCK_PATTERN) {
            return Ok(());
        }

        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(SESSION_LOCK_PATTERN);
        content.push('\n');
        std::fs::write(&path, content).map_err(|source| Error::FileWriteError { path, source })
    }

    fn check_root(root: &std::path::Path) -> Result<()> {
        if !root.is_dir() {
            return Err(Error::unavailable(format!(
                "database root '{}' does not exist",
                root.display()
            )));
        }
        if !root.join(META_DIR).is_dir() {
            return Err(Error::unavailable(format!(
                "'{}' is not a shelf database (run `shelf init`)",
                root.display()
            )));
        }
        Ok(())
    }

    /// The configured collection
    pub fn collection(&self) -> Result<Collection> {
        self.collection_named(&self.config.collection)
    }

    pub fn collection_named(&self, name: &str) -> Result<Collection> {
        validate_collection_name(name)?;
        let collection = Collection::open(name, &self.root).with_session(self.session.handle());
        Ok(if self.config.commit_writes {
            collection.with_history(self.config.author())
        } else {
            collection
        })
    }

    /// Declared schema of a collection (untyped if none)
    pub fn schema(&self, name: &str) -> Schema {
        self.schemas.get_or_untyped(name)
    }

    /// A runner over a collection of this database, typed by its schema
    pub fn runner<'a>(&self, collection: &'a Collection) -> QueryRunner<'a, Collection> {
        QueryRunner::new(collection, self.schema(&collection.name))
    }

    pub async fn status(&self) -> Result<Status> {
        let collection = self.collection()?;
        let records = collection.scan().await?.len();
        let indexes = collection.indexes().await?.into_iter().map(|s| s.name).collect();
        let head = self.git.head_hash()?;
        let recent_commits = self
            .git
            .recent_commits(5)?
            .into_iter()
            .map(|c| format!("{} {}", git::short_hash(&c.hash), c.summary))
            .collect();

        Ok(Status {
            root: self.root.clone(),
            collection: collection.name,
            records,
            indexes,
            head,
            uncommitted_changes: self.git.has_changes()?,
            recent_commits,
        })
    }

    /// Release the session
    pub fn close(self) -> Result<()> {
        self.session.release()?;
        tracing::info!("Closed database {}", self.root.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_then_connect() {
        let tmp = TempDir::new().unwrap();
        let db = Database::init(tmp.path()).await.unwrap();
        assert!(tmp.path().join(META_DIR).join("session.lock").exists());
        assert_eq!(db.config.collection, "books");
        assert!(db.schema("books").field_type("price").is_some());
        db.close().unwrap();
        assert!(!tmp.path().join(META_DIR).join("session.lock").exists());

        let db = Database::connect(tmp.path()).await.unwrap();
        let status = db.status().await.unwrap();
        assert_eq!(status.records, 0);
        assert!(!status.uncommitted_changes);
    }

    #[tokio::test]
    async fn test_connect_refuses_second_session() {
        let tmp = TempDir::new().unwrap();
        let _db = Database::init(tmp.path()).await.unwrap();
        let second = Database::connect(tmp.path()).await;
        assert!(matches!(second, Err(Error::StoreUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_connect_missing_root() {
        let tmp = TempDir::new().unwrap();
        let result = Database::connect(tmp.path().join("nope")).await;
        assert!(matches!(result, Err(Error::StoreUnavailable { .. })));

        let result = Database::connect(tmp.path()).await;
        assert!(matches!(result, Err(Error::StoreUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_init_extends_existing_gitignore() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(".gitignore"), "target/").unwrap();

        let db = Database::init(tmp.path()).await.unwrap();
        let gitignore = std::fs::read_to_string(tmp.path().join(".gitignore")).unwrap();
        assert_eq!(gitignore, "target/\n.shelf/session.lock\n");
        assert!(!db.status().await.unwrap().uncommitted_changes);
        db.close().unwrap();

        Database::init(tmp.path()).await.unwrap();
        let again = std::fs::read_to_string(tmp.path().join(".gitignore")).unwrap();
        assert_eq!(again.matches(SESSION_LOCK_PATTERN).count(), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_session() {
        let tmp = TempDir::new().unwrap();
        {
            let _db = Database::init(tmp.path()).await.unwrap();
        }
        assert!(Database::connect(tmp.path()).await.is_ok());
    }
}
