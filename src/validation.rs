//! Input validation for shelfdb
//!
//! Collection names and record ids become path components, so they are
//! restricted to a filesystem-safe alphabet. Field names in queries get a
//! looser check.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid identifier '{0}': {1}")]
    InvalidIdentifier(String, &'static str),

    #[error("Identifier '{0}' is too long (max {1} characters)")]
    TooLong(String, usize),

    #[error("Identifier cannot be empty")]
    Empty,

    #[error("Reserved name: '{0}'")]
    Reserved(String),
}

/// Maximum length for identifiers
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

/// Longest slug generated from a title
const MAX_SLUG_LENGTH: usize = 80;

/// Names that are unsafe as file or directory names on some platforms
const RESERVED_NAMES: &[&str] = &[
    ".", "..", "con", "prn", "aux", "nul",
    "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8", "com9",
    "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Validate a collection name
///
/// Rules:
/// - 1-255 characters
/// - only alphanumeric, underscore, and hyphen
/// - cannot start with a hyphen or underscore
/// - not a reserved device name (case-insensitive)
pub fn validate_collection_name(name: &str) -> Result<(), ValidationError> {
    validate_identifier(name)
}

/// Validate a record id (same rules as collection names)
pub fn validate_document_id(id: &str) -> Result<(), ValidationError> {
    validate_identifier(id)
}

/// Validate a field name used in a query
///
/// Field names may start with an underscore (`_id`) and may contain dots
/// to reach into nested objects, but no empty segments.
pub fn validate_field_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Empty);
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::TooLong(name.to_string(), MAX_IDENTIFIER_LENGTH));
    }

    if name.split('.').any(str::is_empty) {
        return Err(ValidationError::InvalidIdentifier(
            name.to_string(),
            "contains an empty path segment",
        ));
    }

    if !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.') {
        return Err(ValidationError::InvalidIdentifier(
            name.to_string(),
            "contains invalid characters (only alphanumeric, underscore, and dot allowed)",
        ));
    }

    Ok(())
}

fn validate_identifier(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Empty);
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::TooLong(name.to_string(), MAX_IDENTIFIER_LENGTH));
    }

    for (i, c) in name.chars().enumerate() {
        if !c.is_ascii_alphanumeric() && c != '_' && c != '-' {
            return Err(ValidationError::InvalidIdentifier(
                name.to_string(),
                "contains invalid characters (only alphanumeric, underscore, and hyphen allowed)",
            ));
        }
        if i == 0 && (c == '-' || c == '_') {
            return Err(ValidationError::InvalidIdentifier(
                name.to_string(),
                "cannot start with hyphen or underscore",
            ));
        }
    }

    if RESERVED_NAMES.contains(&name.to_lowercase().as_str()) {
        return Err(ValidationError::Reserved(name.to_string()));
    }

    Ok(())
}

/// Turn a title into a record id: lowercase ASCII words joined by hyphens
///
/// Returns None if nothing usable is left (e.g. a title made of symbols).
pub fn slugify(title: &str) -> Option<String> {
    let mut slug = String::with_capacity(title.len());

    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
        if slug.len() >= MAX_SLUG_LENGTH {
            break;
        }
    }

    let slug = slug.trim_end_matches('-').to_string();

    if slug.is_empty() || validate_identifier(&slug).is_err() {
        None
    } else {
        Some(slug)
    }
}
