//! Document representation
//!
//! A Document is one record: a markdown file whose YAML frontmatter holds
//! the record's fields. Book records keep an empty body, but a body written
//! by hand is preserved across updates.

use serde::{Deserialize, Serialize};
use shelfql::{Literal, ID_FIELD};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A record in the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Identity (the file name without the .md extension)
    pub id: String,

    /// Path relative to the collection root
    pub path: PathBuf,

    /// Frontmatter fields
    pub fields: Fields,

    /// Markdown body content
    pub body: String,

    #[serde(skip)]
    pub meta: DocumentMeta,
}

/// Field values that can be stored in frontmatter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric value as a float (ints are widened)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Rank used to order values of different types
    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    /// Total order used by sorts and min/max:
    /// null < bool < number < string < array < object.
    /// Ints and floats compare numerically.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        let rank = self.type_rank().cmp(&other.type_rank());
        if rank != Ordering::Equal {
            return rank;
        }

        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                a.total_cmp(&b)
            }
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let cmp = x.total_cmp(y);
                    if cmp != Ordering::Equal {
                        return cmp;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => Ordering::Equal,
        }
    }

    /// Equality where `Int(15)` and `Float(15.0)` are the same value
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_numeric() && b.is_numeric() => a.total_cmp(b) == Ordering::Equal,
            (a, b) => a == b,
        }
    }

    /// Check if this value matches a LIKE pattern (`%` any run, `_` one char)
    pub fn matches_pattern(&self, pattern: &str) -> bool {
        match self {
            Value::String(s) => like_regex(pattern)
                .map(|r| r.is_match(s))
                .unwrap_or(false),
            _ => false,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(arr) => serde_json::Value::Array(arr.iter().map(Value::to_json).collect()),
            Value::Object(obj) => serde_json::Value::Object(
                obj.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .or_else(|| n.as_f64().map(Value::Float))
                .unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(arr) => Value::Array(arr.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(obj) => Value::Object(
                obj.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect(),
            ),
        }
    }
}

/// Compile a LIKE pattern into an anchored regex
pub(crate) fn like_regex(pattern: &str) -> Result<regex::Regex, regex::Error> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str("(?s)^");
    for c in pattern.chars() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            other => re.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    re.push('$');
    regex::Regex::new(&re)
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<&Literal> for Value {
    fn from(lit: &Literal) -> Self {
        match lit {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::String(s) => Value::String(s.clone()),
            Literal::Array(arr) => Value::Array(arr.iter().map(Value::from).collect()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Field name to value, ordered by name
pub type Fields = BTreeMap<String, Value>;

/// Metadata about a document (not persisted in the file)
#[derive(Debug, Clone, Default)]
pub struct DocumentMeta {
    /// File modification time
    pub modified_at: Option<std::time::SystemTime>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            path: PathBuf::from(format!("{}.md", &id)),
            id,
            fields: Fields::new(),
            body: String::new(),
            meta: DocumentMeta::default(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Field lookup that also resolves `_id` and dotted paths into objects
    pub fn lookup(&self, key: &str) -> Option<Value> {
        if key == ID_FIELD {
            return Some(Value::String(self.id.clone()));
        }
        if let Some(v) = self.fields.get(key) {
            return Some(v.clone());
        }

        let mut parts = key.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            match current {
                Value::Object(obj) => current = obj.get(part)?,
                _ => return None,
            }
        }
        Some(current.clone())
    }

    /// Fields plus the identity under `_id`
    pub fn to_record(&self) -> Fields {
        let mut out = self.fields.clone();
        out.insert(ID_FIELD.to_string(), Value::String(self.id.clone()));
        out
    }

    /// Parse a document from markdown content
    pub fn parse(id: impl Into<String>, content: &str) -> crate::Result<Self> {
        let id = id.into();
        let (fields, body) = super::frontmatter::parse(content)?;

        Ok(Self {
            path: PathBuf::from(format!("{}.md", &id)),
            id,
            fields,
            body,
            meta: DocumentMeta::default(),
        })
    }

    /// Render document back to markdown
    pub fn render(&self) -> crate::Result<String> {
        super::frontmatter::render(&self.fields, &self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_creation() {
        let mut doc = Document::new("nineteen-eighty-four");
        doc.set("title", "1984")
            .set("published_year", 1949i64)
            .set("in_stock", true);

        assert_eq!(doc.id, "nineteen-eighty-four");
        assert_eq!(doc.get("title"), Some(&Value::String("1984".into())));
        assert_eq!(doc.lookup("_id"), Some(Value::String("nineteen-eighty-four".into())));
    }

    #[test]
    fn test_roundtrip() {
        let mut doc = Document::new("dune");
        doc.set("title", "Dune").set("price", 11.5);
        doc.body = "Notes on the edition.".into();

        let rendered = doc.render().unwrap();
        let parsed = Document::parse("dune", &rendered).unwrap();

        assert_eq!(parsed.fields, doc.fields);
        assert_eq!(parsed.body.trim(), doc.body.trim());
    }

    #[test]
    fn test_mixed_numeric_ordering() {
        assert_eq!(Value::Int(10).total_cmp(&Value::Float(10.5)), Ordering::Less);
        assert!(Value::Int(15).loosely_equals(&Value::Float(15.0)));
        assert_eq!(Value::Null.total_cmp(&Value::Bool(false)), Ordering::Less);
        assert_eq!(Value::Int(3).total_cmp(&Value::String("3".into())), Ordering::Less);
    }

    #[test]
    fn test_like_pattern_escapes_regex() {
        let v = Value::String("Who? (A Story)".into());
        assert!(v.matches_pattern("Who? (%)"));
        assert!(!Value::String("Whom".into()).matches_pattern("Who?"));
        assert!(Value::String("The Hobbit".into()).matches_pattern("The H_bbit"));
    }

    #[test]
    fn test_dotted_lookup() {
        let mut doc = Document::new("x");
        let mut publisher = BTreeMap::new();
        publisher.insert("city".to_string(), Value::from("London"));
        doc.set("publisher", Value::Object(publisher));
        assert_eq!(doc.lookup("publisher.city"), Some(Value::from("London")));
        assert_eq!(doc.lookup("publisher.country"), None);
    }
}
