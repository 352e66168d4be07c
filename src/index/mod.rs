//! Index catalog
//!
//! Indexes here are declarations: an ordered list of fields a collection
//! is expected to be queried or sorted by. They are persisted by the
//! record store and consulted by `explain`, which reports whether a filter
//! could be answered from one of them.
//!
//! Names follow the familiar `<field>_<dir>` convention, so an ascending
//! compound index on author and year is `author_1_published_year_1`.

pub mod explain;

use serde::{Deserialize, Serialize};
use shelfql::IndexField;
use std::fmt;

use crate::error::{Error, Result};
use crate::validation::validate_field_name;

/// A declared index as stored in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub fields: Vec<IndexField>,
}

/// Identity of a declared index: its name and key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexHandle {
    pub name: String,
    pub fields: Vec<IndexField>,
}

/// Returned by `create_index`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexOutcome {
    #[serde(flatten)]
    pub handle: IndexHandle,
    /// False when an identical index already existed
    pub created: bool,
}

impl IndexSpec {
    pub fn new(fields: Vec<IndexField>) -> Self {
        Self {
            name: index_name(&fields),
            fields,
        }
    }

    /// Leading field of the key
    pub fn leading_field(&self) -> Option<&str> {
        self.fields.first().map(|f| f.field.as_str())
    }

    pub fn key_pattern(&self) -> KeyPattern<'_> {
        KeyPattern(&self.fields)
    }

    pub fn handle(&self) -> IndexHandle {
        IndexHandle {
            name: self.name.clone(),
            fields: self.fields.clone(),
        }
    }
}

/// Derive an index name from its fields, e.g. `title_1` or `price_-1`
pub fn index_name(fields: &[IndexField]) -> String {
    fields
        .iter()
        .map(|f| format!("{}_{}", f.field, f.direction.as_index_value()))
        .collect::<Vec<_>>()
        .join("_")
}

/// Displays as `{ author: 1, published_year: 1 }`
pub struct KeyPattern<'a>(&'a [IndexField]);

impl fmt::Display for KeyPattern<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|field| format!("{}: {}", field.field, field.direction.as_index_value()))
            .collect();
        write!(f, "{{ {} }}", parts.join(", "))
    }
}

/// Add an index to a catalog
///
/// Reports whether the catalog changed. Re-declaring an identical index
/// is not an error and yields the same handle.
pub fn register(catalog: &mut Vec<IndexSpec>, fields: Vec<IndexField>) -> Result<IndexOutcome> {
    if fields.is_empty() {
        return Err(Error::invalid_query("an index needs at least one field"));
    }

    for (i, field) in fields.iter().enumerate() {
        validate_field_name(&field.field)
            .map_err(|e| Error::invalid_query(format!("index field: {}", e)))?;
        if fields[..i].iter().any(|f| f.field == field.field) {
            return Err(Error::invalid_query(format!(
                "field '{}' appears twice in the index key",
                field.field
            )));
        }
    }

    let spec = IndexSpec::new(fields);

    if let Some(existing) = catalog.iter().find(|s| s.name == spec.name) {
        if existing.fields != spec.fields {
            return Err(Error::invalid_query(format!(
                "an index named '{}' already exists with a different key {}",
                existing.name,
                existing.key_pattern()
            )));
        }
        return Ok(IndexOutcome {
            handle: existing.handle(),
            created: false,
        });
    }

    let outcome = IndexOutcome {
        handle: spec.handle(),
        created: true,
    };
    catalog.push(spec);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_names() {
        assert_eq!(index_name(&[IndexField::asc("title")]), "title_1");
        assert_eq!(
            index_name(&[IndexField::asc("author"), IndexField::asc("published_year")]),
            "author_1_published_year_1"
        );
        assert_eq!(index_name(&[IndexField::desc("price")]), "price_-1");
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut catalog = Vec::new();
        let first = register(&mut catalog, vec![IndexField::asc("title")]).unwrap();
        let second = register(&mut catalog, vec![IndexField::asc("title")]).unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.handle, second.handle);
        assert_eq!(first.handle.name, "title_1");
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_register_rejects_bad_keys() {
        let mut catalog = Vec::new();
        assert!(matches!(register(&mut catalog, vec![]), Err(Error::InvalidQuery { .. })));
        assert!(matches!(
            register(&mut catalog, vec![IndexField::asc("title"), IndexField::desc("title")]),
            Err(Error::InvalidQuery { .. })
        ));
        assert!(matches!(
            register(&mut catalog, vec![IndexField::asc("bad field")]),
            Err(Error::InvalidQuery { .. })
        ));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_register_name_collision() {
        let mut catalog = Vec::new();
        register(&mut catalog, vec![IndexField::asc("a"), IndexField::asc("b")]).unwrap();
        let clash = register(&mut catalog, vec![IndexField::asc("a_1_b")]);
        assert!(matches!(clash, Err(Error::InvalidQuery { .. })));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_key_pattern_display() {
        let spec = IndexSpec::new(vec![IndexField::asc("author"), IndexField::desc("published_year")]);
        assert_eq!(spec.key_pattern().to_string(), "{ author: 1, published_year: -1 }");
        assert_eq!(spec.leading_field(), Some("author"));
    }
}
