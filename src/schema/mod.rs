//! Schema definitions for shelfdb collections
//!
//! A schema declares field types. The store itself never enforces shape on
//! reads; schemas are used to reject queries that cannot make sense (a
//! range over a text field, an average of titles) and to check records on
//! import.
//!
//! Schemas are stored in `.shelf/schemas/{collection}.yaml`

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::storage::document::{Document, Value};

/// A field type in the schema
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    Array,
    Object,
}

impl Default for FieldType {
    fn default() -> Self {
        Self::String
    }
}

impl FieldType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Int | FieldType::Float)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }

    /// Whether a stored value fits this type. Ints are accepted for floats.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Int, Value::Int(_)) => true,
            (FieldType::Float, v) => v.is_numeric(),
            (FieldType::Bool, Value::Bool(_)) => true,
            (FieldType::Array, Value::Array(_)) => true,
            (FieldType::Object, Value::Object(_)) => true,
            _ => false,
        }
    }
}

/// Definition of a single field
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldDef {
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldDef {
    pub fn required(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: true,
            description: None,
        }
    }

    pub fn optional(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            description: None,
        }
    }
}

/// Schema for a collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    /// Collection name
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDef>,
}

impl Schema {
    /// Create an empty schema; every field is untyped
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: BTreeMap::new(),
        }
    }

    /// Add a field definition
    pub fn field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    /// The book record layout
    pub fn books(name: impl Into<String>) -> Self {
        let mut schema = Self::new(name)
            .field("title", FieldDef::required(FieldType::String))
            .field("author", FieldDef::required(FieldType::String))
            .field("genre", FieldDef::required(FieldType::String))
            .field("published_year", FieldDef::required(FieldType::Int))
            .field("price", FieldDef::required(FieldType::Float))
            .field("in_stock", FieldDef::required(FieldType::Bool))
            .field("pages", FieldDef::optional(FieldType::Int))
            .field("publisher", FieldDef::optional(FieldType::String));
        schema.description = Some("Books on the shelf".to_string());
        schema
    }

    /// Declared type of a field, if any
    pub fn field_type(&self, name: &str) -> Option<&FieldType> {
        self.fields.get(name).map(|def| &def.field_type)
    }

    /// Check a record against this schema
    pub fn validate(&self, doc: &Document) -> std::result::Result<(), ValidationError> {
        for (field_name, field_def) in &self.fields {
            match doc.fields.get(field_name) {
                None if field_def.required => {
                    return Err(ValidationError::MissingRequired(field_name.clone()));
                }
                Some(value) if !field_def.field_type.accepts(value) => {
                    return Err(ValidationError::TypeMismatch {
                        field: field_name.clone(),
                        expected: field_def.field_type.as_str().to_string(),
                        actual: value.type_name().to_string(),
                    });
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// Why a record does not fit its schema
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingRequired(String),
    #[error("Invalid type for field {field}: expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },
}

/// Registry of all schemas in the database
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Schema>,
    path: PathBuf,
}

impl SchemaRegistry {
    /// Load schemas from the database directory
    pub fn load(db_path: &Path) -> Result<Self> {
        let schema_path = db_path.join(crate::META_DIR).join("schemas");
        let mut registry = Self {
            schemas: HashMap::new(),
            path: schema_path.clone(),
        };

        if schema_path.exists() {
            let entries = std::fs::read_dir(&schema_path).map_err(|source| Error::FileReadError {
                path: schema_path.clone(),
                source,
            })?;
            for entry in entries {
                let path = entry
                    .map_err(|source| Error::FileReadError {
                        path: schema_path.clone(),
                        source,
                    })?
                    .path();
                if path.extension().map(|e| e == "yaml").unwrap_or(false) {
                    let content = std::fs::read_to_string(&path)
                        .map_err(|source| Error::FileReadError { path: path.clone(), source })?;
                    let schema: Schema = serde_yaml::from_str(&content)?;
                    registry.schemas.insert(schema.name.clone(), schema);
                }
            }
        }

        tracing::debug!("Loaded {} schema(s) from {}", registry.schemas.len(), schema_path.display());
        Ok(registry)
    }

    /// Get a schema by collection name
    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    /// Schema for a collection, or an untyped one if none is declared
    pub fn get_or_untyped(&self, name: &str) -> Schema {
        self.get(name).cloned().unwrap_or_else(|| Schema::new(name))
    }

    /// Register a schema and write it to disk
    pub fn register(&mut self, schema: Schema) -> Result<()> {
        std::fs::create_dir_all(&self.path).map_err(|source| Error::FileWriteError {
            path: self.path.clone(),
            source,
        })?;
        let file_path = self.path.join(format!("{}.yaml", schema.name));
        let content = serde_yaml::to_string(&schema).map_err(|e| Error::YamlSerializeError {
            message: e.to_string(),
        })?;
        std::fs::write(&file_path, content).map_err(|source| Error::FileWriteError {
            path: file_path,
            source,
        })?;

        self.schemas.insert(schema.name.clone(), schema);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_books_schema_validation() {
        let schema = Schema::books("books");

        let mut doc = Document::new("dune");
        doc.set("title", "Dune")
            .set("author", "Frank Herbert")
            .set("genre", "Science Fiction")
            .set("published_year", 1965i64)
            .set("price", 10i64)
            .set("in_stock", true);
        assert!(schema.validate(&doc).is_ok());

        doc.set("published_year", "1965");
        assert!(matches!(schema.validate(&doc), Err(ValidationError::TypeMismatch { .. })));

        let empty = Document::new("nothing");
        assert!(matches!(schema.validate(&empty), Err(ValidationError::MissingRequired(_))));
    }

    #[test]
    fn test_registry_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let mut registry = SchemaRegistry::load(tmp.path()).unwrap();
        assert!(registry.get("books").is_none());

        registry.register(Schema::books("books")).unwrap();

        let reloaded = SchemaRegistry::load(tmp.path()).unwrap();
        let schema = reloaded.get("books").unwrap();
        assert_eq!(schema.field_type("price"), Some(&FieldType::Float));
        assert!(schema.field_type("title").map(|t| !t.is_numeric()).unwrap_or(false));
        assert!(reloaded.get_or_untyped("magazines").fields.is_empty());
    }
}
