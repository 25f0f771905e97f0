//! Error types and result types for every svckit component.
//!
//! Each concern carries its own error enum so that call sites can match on the
//! conditions they care about:
//!
//! - [`DocumentStoreError`] / [`DocumentStoreResult`] for the document store layer
//! - [`CacheError`] / [`CacheResult`] for cache backends and helpers
//! - [`ConfigError`] / [`ConfigResult`] for the config loader
//! - [`LogError`] for logging initialisation

use std::{path::PathBuf, time::Duration};

use bson::error::Error as BsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between document formats.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// A point lookup matched nothing. The argument is the collection name.
    #[error("No matching document in collection {0}")]
    NoMatchingDocument(String),
    /// `delete` was called on a handle without a filter.
    #[error("Refusing to delete every document in collection {0} without a filter")]
    UnfilteredDelete(String),
    /// The document violates schema constraints or has invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// The backend cannot evaluate the requested filter, stage or projection.
    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),
    /// The operation did not complete within its fixed deadline.
    #[error("{operation} on {collection} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        collection: String,
        after: Duration,
    },
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DocumentStoreError {
    /// Returns `true` for the "no matching document" condition of point lookups.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocumentStoreError::NoMatchingDocument(_))
    }

    /// Returns `true` when a write was rejected because the identifier already exists.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, DocumentStoreError::DocumentAlreadyExists(..))
    }
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

/// Treats a duplicate-key rejection as a successful save.
///
/// Useful for idempotent inserts where a concurrent writer may have stored the
/// same document first.
pub fn saved_or_duplicate<T>(result: &DocumentStoreResult<T>) -> bool {
    match result {
        Ok(_) => true,
        Err(err) => err.is_duplicate_key(),
    }
}

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

/// Errors raised by cache backends and the cache helpers.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Error during client construction or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// An error reported by the cache server or client library.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors raised while loading or binding configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A config directory or file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A config file is not valid TOML.
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// The node exists but does not contain the requested key.
    #[error("Config key {key} not found under node {node}")]
    KeyNotFound { node: String, key: String },
    /// The value exists but does not fit the requested type.
    #[error("Config value {node}.{key} is invalid: {message}")]
    Decode {
        node: String,
        key: String,
        message: String,
    },
}

impl ConfigError {
    /// Returns `true` for the "key absent under an existing node" condition.
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, ConfigError::KeyNotFound { .. })
    }
}

/// A specialized `Result` type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while installing the log subscriber.
#[derive(Error, Debug)]
pub enum LogError {
    /// The rolling log file could not be created.
    #[error("Failed to open log files: {0}")]
    Appender(String),
    /// A global subscriber is already installed.
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_counts_as_saved() {
        let ok: DocumentStoreResult<()> = Ok(());
        let dup: DocumentStoreResult<()> = Err(DocumentStoreError::DocumentAlreadyExists(
            "abc".into(),
            "users".into(),
        ));
        let other: DocumentStoreResult<()> = Err(DocumentStoreError::Backend("down".into()));

        assert!(saved_or_duplicate(&ok));
        assert!(saved_or_duplicate(&dup));
        assert!(!saved_or_duplicate(&other));
    }

    #[test]
    fn not_found_is_distinct_from_other_failures() {
        assert!(DocumentStoreError::NoMatchingDocument("users".into()).is_not_found());
        assert!(!DocumentStoreError::Backend("users".into()).is_not_found());
        assert!(!DocumentStoreError::UnfilteredDelete("users".into()).is_not_found());
    }
}
