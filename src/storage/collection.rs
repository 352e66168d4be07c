//! Collection - a directory of book records inside a database root
//!
//! Directory structure:
//! ```text
//! <root>/
//!   .shelf/
//!     indexes/books.yaml
//!   collections/
//!     books/
//!       animal-farm.md
//!       to-kill-a-mockingbird.md
//! ```
//!
//! Record ids are file stems, and scans walk the directory sorted by file
//! name, so store order is id order. New records need a valid identifier;
//! existing files are addressed by their stem as found on disk, so
//! hand-named files such as `Animal Farm.md` can still be updated and
//! removed.

use super::document::Document;
use super::RecordStore;
use crate::error::{Error, Result};
use crate::git;
use crate::index::IndexSpec;
use crate::session::SessionHandle;
use crate::validation::validate_document_id;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

/// A collection of book records stored as markdown files
#[derive(Debug, Clone)]
pub struct Collection {
    /// Name of the collection (directory name)
    pub name: String,
    /// Path to the collection directory
    pub path: PathBuf,
    /// Database root
    root: PathBuf,
    /// Commit author; `None` disables history commits
    history: Option<git::Author>,
    session: Option<SessionHandle>,
}

impl Collection {
    /// Open a collection under a database root
    pub fn open(name: impl Into<String>, root: &Path) -> Self {
        let name = name.into();
        let path = root.join(crate::COLLECTIONS_DIR).join(&name);
        Self {
            name,
            path,
            root: root.to_path_buf(),
            history: None,
            session: None,
        }
    }

    /// Commit every write to the database's git history as `author`
    pub fn with_history(mut self, author: git::Author) -> Self {
        self.history = Some(author);
        self
    }

    /// Tie the collection to a session; once released, every call fails
    pub fn with_session(mut self, session: SessionHandle) -> Self {
        self.session = Some(session);
        self
    }

    /// Create the collection directory if it doesn't exist
    pub async fn ensure_exists(&self) -> Result<()> {
        self.ping().await?;
        fs::create_dir_all(&self.path)
            .await
            .map_err(|source| Error::FileWriteError {
                path: self.path.clone(),
                source,
            })
    }

    fn catalog_path(&self) -> PathBuf {
        self.root
            .join(crate::META_DIR)
            .join("indexes")
            .join(format!("{}.yaml", self.name))
    }

    /// Path for a new record
    fn document_path(&self, id: &str) -> Result<PathBuf> {
        validate_document_id(id)?;
        Ok(self.path.join(format!("{}.md", id)))
    }

    /// Path of a record file already in the collection directory
    fn stored_path(&self, id: &str) -> Option<PathBuf> {
        let mut components = Path::new(id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => return None,
        }
        let path = self.path.join(format!("{}.md", id));
        path.is_file().then_some(path)
    }

    async fn write_document(&self, path: &Path, doc: &Document) -> Result<()> {
        let content = doc.render()?;
        fs::write(path, content)
            .await
            .map_err(|source| Error::FileWriteError {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Read a document from a path
    async fn read_document(&self, path: &Path) -> Result<Document> {
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::InvalidRecord {
                id: path.display().to_string(),
                message: "file name is not valid UTF-8".to_string(),
            })?;

        let content = fs::read_to_string(path)
            .await
            .map_err(|source| Error::FileReadError {
                path: path.to_path_buf(),
                source,
            })?;
        let mut doc = Document::parse(id, &content)?;

        doc.path = path
            .strip_prefix(&self.path)
            .unwrap_or(path)
            .to_path_buf();

        if let Ok(metadata) = path.metadata() {
            doc.meta.modified_at = metadata.modified().ok();
        }

        Ok(doc)
    }
}

impl RecordStore for Collection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<()> {
        if let Some(session) = &self.session {
            session.check()?;
        }
        if !self.root.is_dir() {
            return Err(Error::unavailable(format!(
                "database root '{}' does not exist",
                self.root.display()
            )));
        }
        if self.path.exists() && !self.path.is_dir() {
            return Err(Error::unavailable(format!(
                "collection path '{}' is not a directory",
                self.path.display()
            )));
        }
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<Document>> {
        self.ping().await?;

        let mut documents = Vec::new();
        if !self.path.exists() {
            return Ok(documents);
        }

        for entry in WalkDir::new(&self.path)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                Error::unavailable(format!("cannot read collection '{}': {}", self.name, e))
            })?;
            let path = entry.path();
            if !path.extension().map(|e| e == "md").unwrap_or(false) {
                continue;
            }
            match self.read_document(path).await {
                Ok(doc) => documents.push(doc),
                Err(e) => tracing::warn!("Skipping unreadable record {}: {}", path.display(), e),
            }
        }

        tracing::debug!("Scanned {} records from '{}'", documents.len(), self.name);
        Ok(documents)
    }

    async fn get(&self, id: &str) -> Result<Option<Document>> {
        self.ping().await?;
        match self.stored_path(id) {
            Some(path) => self.read_document(&path).await.map(Some),
            None => Ok(None),
        }
    }

    async fn insert(&self, doc: &Document) -> Result<()> {
        self.ensure_exists().await?;
        let path = self.document_path(&doc.id)?;

        if path.exists() {
            return Err(Error::DocumentAlreadyExists {
                collection: self.name.clone(),
                id: doc.id.clone(),
            });
        }

        self.write_document(&path, doc).await
    }

    async fn replace(&self, doc: &Document) -> Result<()> {
        self.ensure_exists().await?;
        let path = match self.stored_path(&doc.id) {
            Some(path) => path,
            None => self.document_path(&doc.id)?,
        };
        self.write_document(&path, doc).await
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        self.ping().await?;
        let Some(path) = self.stored_path(id) else {
            return Ok(false);
        };
        fs::remove_file(&path)
            .await
            .map_err(|source| Error::FileWriteError { path, source })?;
        Ok(true)
    }

    async fn indexes(&self) -> Result<Vec<IndexSpec>> {
        self.ping().await?;
        let path = self.catalog_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)
            .await
            .map_err(|source| Error::FileReadError { path, source })?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_yaml::from_str(&content)?)
    }

    async fn save_indexes(&self, indexes: &[IndexSpec]) -> Result<()> {
        self.ping().await?;
        let path = self.catalog_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| Error::FileWriteError {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let content = serde_yaml::to_string(indexes).map_err(|e| Error::YamlSerializeError {
            message: e.to_string(),
        })?;
        fs::write(&path, content)
            .await
            .map_err(|source| Error::FileWriteError { path, source })
    }

    async fn commit(&self, message: &str) -> Result<()> {
        let Some(author) = &self.history else {
            return Ok(());
        };
        let repo = git::Repository::open(&self.root)?.with_author(author.clone());
        if repo.has_changes()? {
            repo.commit(message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn book(id: &str, title: &str, price: f64) -> Document {
        let mut doc = Document::new(id);
        doc.set("title", title).set("price", price);
        doc
    }

    #[tokio::test]
    async fn test_collection_crud() {
        let tmp = TempDir::new().unwrap();
        let collection = Collection::open("books", tmp.path());

        let doc = book("the-hobbit", "The Hobbit", 14.99);
        collection.insert(&doc).await.unwrap();

        let fetched = collection.get("the-hobbit").await.unwrap().unwrap();
        assert_eq!(fetched.get("title").unwrap().as_str(), Some("The Hobbit"));

        let mut updated = fetched;
        updated.set("price", 9.99);
        collection.replace(&updated).await.unwrap();

        let refetched = collection.get("the-hobbit").await.unwrap().unwrap();
        assert_eq!(refetched.get("price").unwrap().as_f64(), Some(9.99));

        assert!(collection.remove("the-hobbit").await.unwrap());
        assert!(!collection.remove("the-hobbit").await.unwrap());
        assert!(collection.get("the-hobbit").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let tmp = TempDir::new().unwrap();
        let collection = Collection::open("books", tmp.path());
        let doc = book("dune", "Dune", 11.0);

        collection.insert(&doc).await.unwrap();
        let result = collection.insert(&doc).await;
        assert!(matches!(result, Err(Error::DocumentAlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_scan_is_id_ordered_and_skips_bad_files() {
        let tmp = TempDir::new().unwrap();
        let collection = Collection::open("books", tmp.path());

        for (id, title) in [("walden", "Walden"), ("beloved", "Beloved"), ("emma", "Emma")] {
            collection.insert(&book(id, title, 10.0)).await.unwrap();
        }
        std::fs::write(collection.path.join("broken.md"), "---\ntitle: [unclosed\n").unwrap();
        std::fs::write(collection.path.join("notes.txt"), "not a record").unwrap();

        let ids: Vec<_> = collection.scan().await.unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["beloved", "emma", "walden"]);
    }

    #[tokio::test]
    async fn test_missing_collection_is_empty() {
        let tmp = TempDir::new().unwrap();
        let collection = Collection::open("books", tmp.path());
        assert!(collection.scan().await.unwrap().is_empty());
        assert!(collection.indexes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_root_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("gone");
        let collection = Collection::open("books", &root);

        assert!(matches!(collection.scan().await, Err(Error::StoreUnavailable { .. })));
        assert!(matches!(collection.ping().await, Err(Error::StoreUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_index_catalog_persists() {
        let tmp = TempDir::new().unwrap();
        let collection = Collection::open("books", tmp.path());
        let spec = IndexSpec::new(vec![shelfql::IndexField::asc("title")]);

        collection.save_indexes(std::slice::from_ref(&spec)).await.unwrap();

        let reopened = Collection::open("books", tmp.path());
        assert_eq!(reopened.indexes().await.unwrap(), vec![spec]);
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let tmp = TempDir::new().unwrap();
        let collection = Collection::open("books", tmp.path());
        std::fs::write(tmp.path().join("secret.md"), "---\ntitle: Secret\n---\n").unwrap();

        assert!(collection.get("../secret").await.unwrap().is_none());
        assert!(!collection.remove("../../secret").await.unwrap());
        assert!(collection.insert(&book("../secret", "Secret", 1.0)).await.is_err());
        assert!(tmp.path().join("secret.md").exists());
    }

    #[tokio::test]
    async fn test_hand_named_files_are_writable() {
        let tmp = TempDir::new().unwrap();
        let collection = Collection::open("books", tmp.path());
        collection.ensure_exists().await.unwrap();
        std::fs::write(
            collection.path.join("Animal Farm.md"),
            "---\ntitle: Animal Farm\nprice: 8.5\n---\n",
        )
        .unwrap();
        std::fs::write(collection.path.join("_draft.md"), "---\ntitle: Draft\n---\n").unwrap();

        let docs = collection.scan().await.unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["Animal Farm", "_draft"]);

        let mut farm = docs[0].clone();
        farm.set("price", 9.5);
        collection.replace(&farm).await.unwrap();
        let reread = collection.get("Animal Farm").await.unwrap().unwrap();
        assert_eq!(reread.get("price").unwrap().as_f64(), Some(9.5));

        assert!(collection.remove("_draft").await.unwrap());
        assert!(!collection.path.join("_draft.md").exists());
    }
}
