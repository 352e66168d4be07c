//! Book records
//!
//! [`Book`] is the typed view of a record in the `books` collection. The
//! store keeps plain fields; conversion happens at the edges (import and
//! printing).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::storage::document::{Document, Fields, Value};
use crate::storage::RecordStore;
use crate::validation::slugify;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub published_year: i64,
    pub price: f64,
    pub in_stock: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
}

impl Book {
    pub fn new(title: &str, author: &str, genre: &str, published_year: i64, price: f64, in_stock: bool) -> Self {
        Self {
            title: title.to_string(),
            author: author.to_string(),
            genre: genre.to_string(),
            published_year,
            price,
            in_stock,
            pages: None,
            publisher: None,
        }
    }

    fn with_details(mut self, pages: i64, publisher: &str) -> Self {
        self.pages = Some(pages);
        self.publisher = Some(publisher.to_string());
        self
    }

    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("title".into(), Value::from(self.title.as_str()));
        fields.insert("author".into(), Value::from(self.author.as_str()));
        fields.insert("genre".into(), Value::from(self.genre.as_str()));
        fields.insert("published_year".into(), Value::Int(self.published_year));
        fields.insert("price".into(), Value::Float(self.price));
        fields.insert("in_stock".into(), Value::Bool(self.in_stock));
        if let Some(pages) = self.pages {
            fields.insert("pages".into(), Value::Int(pages));
        }
        if let Some(publisher) = &self.publisher {
            fields.insert("publisher".into(), Value::from(publisher.as_str()));
        }
        fields
    }

    pub fn to_document(&self, id: impl Into<String>) -> Document {
        let mut doc = Document::new(id);
        doc.fields = self.to_fields();
        doc
    }

    /// Read a book back out of a record; extra fields are ignored
    pub fn from_document(doc: &Document) -> Result<Self> {
        let json = Value::Object(doc.fields.clone()).to_json();
        serde_json::from_value(json).map_err(|e| Error::InvalidRecord {
            id: doc.id.clone(),
            message: e.to_string(),
        })
    }
}

/// The sample shelf loaded by `shelf init --seed`
pub fn sample_books() -> Vec<Book> {
    vec![
        Book::new("To Kill a Mockingbird", "Harper Lee", "Fiction", 1960, 12.99, true)
            .with_details(336, "J. B. Lippincott & Co."),
        Book::new("1984", "George Orwell", "Dystopian", 1949, 10.99, true)
            .with_details(328, "Secker & Warburg"),
        Book::new("The Great Gatsby", "F. Scott Fitzgerald", "Fiction", 1925, 9.99, true)
            .with_details(180, "Charles Scribner's Sons"),
        Book::new("Brave New World", "Aldous Huxley", "Dystopian", 1932, 11.50, false)
            .with_details(311, "Chatto & Windus"),
        Book::new("The Hobbit", "J.R.R. Tolkien", "Fantasy", 1937, 14.99, true)
            .with_details(310, "George Allen & Unwin"),
        Book::new("The Catcher in the Rye", "J.D. Salinger", "Fiction", 1951, 8.99, true)
            .with_details(224, "Little, Brown and Company"),
        Book::new("Pride and Prejudice", "Jane Austen", "Romance", 1813, 7.99, true)
            .with_details(432, "T. Egerton"),
        Book::new("The Lord of the Rings", "J.R.R. Tolkien", "Fantasy", 1954, 19.99, true)
            .with_details(1178, "Allen & Unwin"),
        Book::new("Animal Farm", "George Orwell", "Political Satire", 1945, 8.50, false)
            .with_details(112, "Secker & Warburg"),
        Book::new("The Alchemist", "Paulo Coelho", "Fiction", 1988, 10.99, true)
            .with_details(197, "HarperOne"),
        Book::new("Moby Dick", "Herman Melville", "Adventure", 1851, 12.50, false)
            .with_details(635, "Harper & Brothers"),
        Book::new("Wuthering Heights", "Emily Brontë", "Gothic Fiction", 1847, 9.99, true)
            .with_details(342, "Thomas Cautley Newby"),
    ]
}

/// Parse a JSON array of books
pub fn read_json(path: &Path) -> Result<Vec<Book>> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::FileReadError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Pick an id for a title that is not in `taken`: the slug, then `slug-2`, `slug-3`, ...
pub fn unique_id(title: &str, taken: &HashSet<String>) -> Result<String> {
    let base = slugify(title).ok_or_else(|| Error::InvalidRecord {
        id: title.to_string(),
        message: "title has no characters usable in an id".to_string(),
    })?;
    if !taken.contains(&base) {
        return Ok(base);
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken.contains(&candidate) {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Insert books into a store, assigning ids from their titles
///
/// Every record is checked against the schema before anything is written.
/// Returns the assigned ids in input order.
pub async fn import<S: RecordStore>(store: &S, schema: &Schema, books: &[Book]) -> Result<Vec<String>> {
    let mut taken: HashSet<String> = store.scan().await?.into_iter().map(|d| d.id).collect();

    let mut docs = Vec::with_capacity(books.len());
    for book in books {
        let id = unique_id(&book.title, &taken)?;
        let doc = book.to_document(id.clone());
        schema.validate(&doc).map_err(|e| Error::InvalidRecord {
            id: id.clone(),
            message: e.to_string(),
        })?;
        taken.insert(id);
        docs.push(doc);
    }

    for doc in &docs {
        store.insert(doc).await?;
    }

    if !docs.is_empty() {
        store
            .commit(&format!("IMPORT into {}: {} record(s)", store.name(), docs.len()))
            .await?;
    }

    tracing::info!("Imported {} record(s) into '{}'", docs.len(), store.name());
    Ok(docs.into_iter().map(|d| d.id).collect())
}
