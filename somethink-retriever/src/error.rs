//! Error types for the catalog

use crate::retrieval::indexing_state::IndexingState;

/// Result type used across the catalog.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors surfaced by the Store, Indexer and Searcher.
///
/// Lookups of a missing id or path are not errors: they return `None` or
/// `false`. [`CatalogError::NotFound`] is reserved for operations that need an
/// existing record to proceed.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Empty or malformed input (blank path, sentinel topic id, ...)
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// No record for the given key
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// Transaction or query failure in the SQLite store
    #[error("Store error: {source}")]
    Store {
        #[from]
        source: sqlx::Error,
    },

    /// `start` was called while a run was active
    #[error("An indexing run is already in progress (state: {state})")]
    ConcurrentRunRejected { state: IndexingState },

    /// Configuration could not be parsed or is inconsistent
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// File system access failure
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON encoding of stored lists failed
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    /// Topic provider failure outside the search path
    #[error("Topic provider error: {source}")]
    Provider {
        #[from]
        source: somethink_topics::ProviderError,
    },
}

impl CatalogError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(kind: &'static str, key: S) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<toml::de::Error> for CatalogError {
    fn from(e: toml::de::Error) -> Self {
        Self::config(e.to_string())
    }
}
