//! Error types for shelfdb
//!
//! The query runner surfaces two recoverable kinds to its callers:
//! `StoreUnavailable` and `InvalidQuery`. Everything else is a store or
//! record problem.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for shelfdb operations
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Runner contract
    // ==========================================================================
    #[error("Record store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("Invalid query: {message}")]
    InvalidQuery { message: String },

    // ==========================================================================
    // Record Errors
    // ==========================================================================
    #[error("Record '{id}' already exists in collection '{collection}'")]
    DocumentAlreadyExists { collection: String, id: String },

    #[error("Invalid record '{id}': {message}")]
    InvalidRecord { id: String, message: String },

    // ==========================================================================
    // Validation Errors
    // ==========================================================================
    #[error("Invalid {kind} '{value}': {reason}")]
    InvalidIdentifier {
        kind: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Reserved name '{name}' cannot be used")]
    ReservedName { name: String },

    #[error("Invalid configuration in '{path}': {message}")]
    InvalidConfig { path: PathBuf, message: String },

    // ==========================================================================
    // Query text
    // ==========================================================================
    #[error("Query parse error: {0}")]
    ParseError(#[from] shelfql::ParseError),

    // ==========================================================================
    // Git Errors
    // ==========================================================================
    #[error("Git operation failed: {message}")]
    GitError {
        message: String,
        #[source]
        source: Option<git2::Error>,
    },

    // ==========================================================================
    // IO Errors
    // ==========================================================================
    #[error("Failed to read file '{path}': {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ==========================================================================
    // Serialization Errors
    // ==========================================================================
    #[error("Failed to parse YAML: {message}")]
    YamlParseError { message: String },

    #[error("Failed to serialize to YAML: {message}")]
    YamlSerializeError { message: String },

    #[error("Failed to parse JSON: {message}")]
    JsonParseError { message: String },
}

/// Result type alias for shelfdb operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Error::InvalidQuery {
            message: message.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Error::StoreUnavailable {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Conversions from external error types
// =============================================================================

impl From<git2::Error> for Error {
    fn from(err: git2::Error) -> Self {
        Error::GitError {
            message: err.message().to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::YamlParseError {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonParseError {
            message: err.to_string(),
        }
    }
}

impl From<crate::validation::ValidationError> for Error {
    fn from(err: crate::validation::ValidationError) -> Self {
        match err {
            crate::validation::ValidationError::InvalidIdentifier(value, reason) => {
                Error::InvalidIdentifier {
                    kind: "identifier",
                    value,
                    reason,
                }
            }
            crate::validation::ValidationError::TooLong(value, _max) => Error::InvalidIdentifier {
                kind: "identifier",
                value,
                reason: "exceeds maximum length",
            },
            crate::validation::ValidationError::Empty => Error::InvalidIdentifier {
                kind: "identifier",
                value: String::new(),
                reason: "cannot be empty",
            },
            crate::validation::ValidationError::Reserved(name) => Error::ReservedName { name },
        }
    }
}

// =============================================================================
// Error Display Helpers
// =============================================================================

impl Error {
    /// Returns a user-friendly suggestion for fixing the error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::StoreUnavailable { .. } => {
                Some("Check the --database path, run `shelf init`, or remove a stale .shelf/session.lock")
            }
            Error::InvalidQuery { .. } | Error::ParseError(_) => {
                Some("Compare fields with literals of their own type, e.g. published_year > 2000")
            }
            Error::DocumentAlreadyExists { .. } => {
                Some("Update the existing record instead of importing it again")
            }
            Error::InvalidIdentifier { .. } => {
                Some("Use only letters, numbers, underscores, and hyphens")
            }
            _ => None,
        }
    }

    /// Returns true if the caller can fix the input and try again
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable { .. }
                | Error::InvalidQuery { .. }
                | Error::ParseError(_)
                | Error::InvalidIdentifier { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::unavailable("database root '/tmp/x' does not exist");
        assert_eq!(
            err.to_string(),
            "Record store unavailable: database root '/tmp/x' does not exist"
        );
    }

    #[test]
    fn test_error_suggestion() {
        let err = Error::invalid_query("field 'title' is not numeric");
        assert!(err.suggestion().is_some());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_parse_error_converts() {
        let parse_err = shelfql::parse_filter("price >").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::ParseError(_)));
    }
}
