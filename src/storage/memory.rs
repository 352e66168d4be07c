//! Volatile in-process record store

use super::document::Document;
use super::RecordStore;
use crate::error::{Error, Result};
use crate::index::IndexSpec;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<String, Document>,
    indexes: Vec<IndexSpec>,
}

/// Records kept in a map keyed by id, so store order is id order
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    inner: Mutex<Inner>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner::default()),
            available: AtomicBool::new(true),
        }
    }

    pub fn from_documents(name: impl Into<String>, docs: impl IntoIterator<Item = Document>) -> Self {
        let store = Self::new(name);
        if let Ok(mut inner) = store.inner.lock() {
            for doc in docs {
                inner.records.insert(doc.id.clone(), doc);
            }
        }
        store
    }

    /// Simulate losing the store; every call after this fails
    pub fn disconnect(&self) {
        self.available.store(false, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_inner<T>(&self, f: impl FnOnce(&mut Inner) -> Result<T>) -> Result<T> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(Error::unavailable(format!("memory store '{}' is disconnected", self.name)));
        }
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| Error::unavailable(format!("memory store '{}' is poisoned", self.name)))?;
        f(&mut inner)
    }
}

impl RecordStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<()> {
        self.with_inner(|_| Ok(()))
    }

    async fn scan(&self) -> Result<Vec<Document>> {
        self.with_inner(|inner| Ok(inner.records.values().cloned().collect()))
    }

    async fn get(&self, id: &str) -> Result<Option<Document>> {
        self.with_inner(|inner| Ok(inner.records.get(id).cloned()))
    }

    async fn insert(&self, doc: &Document) -> Result<()> {
        self.with_inner(|inner| {
            if inner.records.contains_key(&doc.id) {
                return Err(Error::DocumentAlreadyExists {
                    collection: self.name.clone(),
                    id: doc.id.clone(),
                });
            }
            inner.records.insert(doc.id.clone(), doc.clone());
            Ok(())
        })
    }

    async fn replace(&self, doc: &Document) -> Result<()> {
        self.with_inner(|inner| {
            inner.records.insert(doc.id.clone(), doc.clone());
            Ok(())
        })
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        self.with_inner(|inner| Ok(inner.records.remove(id).is_some()))
    }

    async fn indexes(&self) -> Result<Vec<IndexSpec>> {
        self.with_inner(|inner| Ok(inner.indexes.clone()))
    }

    async fn save_indexes(&self, indexes: &[IndexSpec]) -> Result<()> {
        self.with_inner(|inner| {
            inner.indexes = indexes.to_vec();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_orders_by_id() {
        let store = MemoryStore::from_documents(
            "books",
            ["walden", "beloved", "emma"].into_iter().map(Document::new),
        );
        let ids: Vec<_> = store.scan().await.unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["beloved", "emma", "walden"]);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_disconnected_store_is_unavailable() {
        let store = MemoryStore::new("books");
        store.insert(&Document::new("dune")).await.unwrap();
        store.disconnect();

        assert!(matches!(store.scan().await, Err(Error::StoreUnavailable { .. })));
        assert!(matches!(store.remove("dune").await, Err(Error::StoreUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_insert_duplicate() {
        let store = MemoryStore::new("books");
        store.insert(&Document::new("dune")).await.unwrap();
        assert!(matches!(
            store.insert(&Document::new("dune")).await,
            Err(Error::DocumentAlreadyExists { .. })
        ));
    }
}
