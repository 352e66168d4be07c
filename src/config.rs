//! Database configuration
//!
//! Read from `.shelf/config.yaml`. A missing file means defaults; missing
//! keys take their default values. Environment variables override the file:
//!
//! | Variable              | Field            |
//! |-----------------------|------------------|
//! | `SHELF_COLLECTION`    | `collection`     |
//! | `SHELF_AUTHOR_NAME`   | `author_name`    |
//! | `SHELF_AUTHOR_EMAIL`  | `author_email`   |
//! | `SHELF_COMMIT_WRITES` | `commit_writes`  |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::git::Author;
use crate::validation::validate_collection_name;

const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Collection the CLI works on
    pub collection: String,
    /// Commit every write to git
    pub commit_writes: bool,
    pub author_name: String,
    pub author_email: String,
    /// Page size used by `shelf page` when `--size` is not given
    pub default_page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        let author = Author::default();
        Self {
            collection: "books".to_string(),
            commit_writes: true,
            author_name: author.name,
            author_email: author.email,
            default_page_size: 5,
        }
    }
}

impl Config {
    pub fn path(root: &Path) -> PathBuf {
        root.join(crate::META_DIR).join(CONFIG_FILE)
    }

    /// Load the config of a database root, falling back to defaults
    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::path(root);
        let config = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => Config::default(),
            Ok(content) => serde_yaml::from_str(&content).map_err(|e| Error::InvalidConfig {
                path: path.clone(),
                message: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(source) => return Err(Error::FileReadError { path, source }),
        };

        let config = config.with_env_overrides();
        config.validate(&path)?;
        Ok(config)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = Self::path(root);
        let content = serde_yaml::to_string(self).map_err(|e| Error::YamlSerializeError {
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|source| Error::FileWriteError { path, source })
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(collection) = std::env::var("SHELF_COLLECTION") {
            self.collection = collection;
        }
        if let Ok(name) = std::env::var("SHELF_AUTHOR_NAME") {
            self.author_name = name;
        }
        if let Ok(email) = std::env::var("SHELF_AUTHOR_EMAIL") {
            self.author_email = email;
        }
        if let Ok(flag) = std::env::var("SHELF_COMMIT_WRITES") {
            if let Ok(commit) = flag.parse::<bool>() {
                self.commit_writes = commit;
            }
        }
        self
    }

    pub fn validate(&self, path: &Path) -> Result<()> {
        validate_collection_name(&self.collection).map_err(|e| Error::InvalidConfig {
            path: path.to_path_buf(),
            message: format!("collection: {}", e),
        })?;
        if self.default_page_size == 0 {
            return Err(Error::InvalidConfig {
                path: path.to_path_buf(),
                message: "default_page_size must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn author(&self) -> Author {
        Author {
            name: self.author_name.clone(),
            email: self.author_email.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load(tmp.path()).unwrap();
        assert_eq!(config.default_page_size, 5);
        assert!(config.commit_writes);
    }

    #[test]
    fn test_partial_file_and_roundtrip() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join(crate::META_DIR)).unwrap();
        std::fs::write(Config::path(tmp.path()), "default_page_size: 3\ncommit_writes: false\n").unwrap();

        let config = Config::load(tmp.path()).unwrap();
        assert_eq!(config.default_page_size, 3);
        assert!(!config.commit_writes);
        assert_eq!(config.author_name, "shelfdb");

        config.save(tmp.path()).unwrap();
        assert_eq!(Config::load(tmp.path()).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join(crate::META_DIR)).unwrap();
        std::fs::write(Config::path(tmp.path()), "default_page_size: 0\n").unwrap();
        assert!(matches!(Config::load(tmp.path()), Err(Error::InvalidConfig { .. })));

        std::fs::write(Config::path(tmp.path()), "collection: ../etc\n").unwrap();
        assert!(matches!(Config::load(tmp.path()), Err(Error::InvalidConfig { .. })));
    }
}
