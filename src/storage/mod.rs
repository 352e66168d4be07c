//! Storage layer for shelfdb
//!
//! The query runner talks to storage only through [`RecordStore`]. Two
//! stores ship with the crate: [`Collection`](collection::Collection), a
//! directory of markdown records inside a git-backed database, and
//! [`MemoryStore`](memory::MemoryStore), a volatile in-process store.

pub mod collection;
pub mod document;
pub mod frontmatter;
pub mod memory;

use crate::error::Result;
use crate::index::IndexSpec;
use document::Document;

/// A named collection of records plus its index catalog
///
/// Store order is the order `scan` returns records in; both built-in
/// stores order by record id.
#[allow(async_fn_in_trait)]
pub trait RecordStore {
    /// Collection name
    fn name(&self) -> &str;

    /// Fails with `StoreUnavailable` when the store cannot be reached
    async fn ping(&self) -> Result<()>;

    /// All records in store order
    async fn scan(&self) -> Result<Vec<Document>>;

    async fn get(&self, id: &str) -> Result<Option<Document>>;

    /// Add a new record; fails if the id is taken
    async fn insert(&self, doc: &Document) -> Result<()>;

    /// Overwrite a record
    async fn replace(&self, doc: &Document) -> Result<()>;

    /// Remove a record, returning whether it existed
    async fn remove(&self, id: &str) -> Result<bool>;

    /// Declared indexes, in creation order
    async fn indexes(&self) -> Result<Vec<IndexSpec>>;

    async fn save_indexes(&self, indexes: &[IndexSpec]) -> Result<()>;

    /// Record a history entry for the preceding writes
    async fn commit(&self, _message: &str) -> Result<()> {
        Ok(())
    }
}
