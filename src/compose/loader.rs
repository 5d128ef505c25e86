//! Compose document loader.
//!
//! This module handles reading compose files from disk, the `.env` file
//! that supplies defaults such as `COMPOSE_FILE`, and merging several
//! documents given on the command line into one.

use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ComposeError, ConfigError, Result};

use super::merge::DocumentMerger;

/// Compose file used when neither `-f` nor `COMPOSE_FILE` is given.
pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yml";

/// An ordered, key-preserving compose document.
pub type Document = Mapping;

/// Loader for compose documents.
#[derive(Debug, Default)]
pub struct ComposeLoader {
    /// Merger used when several documents are combined.
    merger: DocumentMerger,
}

impl ComposeLoader {
    /// Creates a new loader with the strict document merger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            merger: DocumentMerger::new(),
        }
    }

    /// Loads a compose document from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Document> {
        let path = path.as_ref();
        debug!("Loading compose file: {}", path.display());

        if !path.is_file() {
            return Err(ComposeError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ComposeError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        Self::parse_yaml(&content, Some(path))
    }

    /// Parses a compose document from a YAML string.
    ///
    /// An empty document yields an empty mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or its root is not a mapping.
    pub fn parse_yaml(content: &str, source: Option<&Path>) -> Result<Document> {
        let location = || source.map(|p| p.display().to_string());

        let value: Value = serde_yaml::from_str(content).map_err(|e| {
            ComposeError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: location(),
            })
        })?;

        match value {
            Value::Mapping(mapping) => Ok(mapping),
            Value::Null => Ok(Mapping::new()),
            _ => Err(ComposeError::Config(ConfigError::ParseError {
                message: String::from("Compose document root must be a mapping"),
                location: location(),
            })),
        }
    }

    /// Loads every file and merges them left to right.
    ///
    /// The first document seeds the merge; each later one is overlaid on the
    /// accumulated result.
    ///
    /// # Errors
    ///
    /// Returns an error if any file fails to load or two files conflict.
    pub fn load_all(&self, paths: &[PathBuf]) -> Result<Document> {
        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            info!("Loading compose file: {}", path.display());
            documents.push(self.load_file(path)?);
        }
        self.merger.merge_all(documents)
    }

    /// Loads the `.env` file from `dir` if present.
    ///
    /// Variables already present in the process environment are not
    /// overridden.
    ///
    /// # Errors
    ///
    /// Returns an error if the `.env` file exists but cannot be loaded.
    pub fn load_dotenv(dir: impl AsRef<Path>) -> Result<()> {
        let env_path = dir.as_ref().join(".env");

        if env_path.is_file() {
            debug!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                ComposeError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Returns the directory relative paths in the compose files resolve against.
///
/// This is the absolute parent directory of the first compose file.
///
/// # Errors
///
/// Returns an error if no file is given or the path cannot be made absolute.
pub fn compose_base_dir(files: &[PathBuf]) -> Result<PathBuf> {
    let first = files
        .first()
        .ok_or_else(|| ComposeError::internal("No compose file given"))?;
    let absolute = std::path::absolute(first)?;
    Ok(absolute
        .parent()
        .map_or_else(|| PathBuf::from("/"), Path::to_path_buf))
}
