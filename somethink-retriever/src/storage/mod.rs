//! Storage layer for the SomeThink catalog
//!
//! This module defines the catalog's record types and the trait seams the
//! Indexer and Searcher depend on. It separates the storage concerns from the
//! crawl and ranking logic.
//!
//! ## Key Components
//!
//! - **FileStore**: file records, their full-text shadow entries and metadata
//! - **TopicStore**: topic records produced by clustering runs
//! - **CatalogStore**: unified interface adding stats, reset and health checks
//! - **Data Types**: [`NewFile`], [`FileRecord`], [`Topic`], [`TopicPlacement`],
//!   [`StoreStats`]
//!
//! ## Architecture
//!
//! ```text
//! FileStore ──┐
//!             ├─ CatalogStore ── SqliteStore (concrete implementation)
//! TopicStore ─┘
//! ```
//!
//! ## Consistency
//!
//! Every mutating operation runs inside one transaction behind a single
//! writer. A file row and its shadow full-text entry are always written and
//! removed together, so readers never observe one without the other.

use crate::error::{CatalogError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod sqlite_store;

pub use somethink_topics::{OUTLIER_TOPIC_ID, TopicId};

/// Database ID of a file record. Stable across content updates.
pub type FileId = i64;

/// Coarse media category of a file.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Document,
    Image,
    Audio,
    Video,
    #[default]
    Unknown,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Document => "document",
            FileType::Image => "image",
            FileType::Audio => "audio",
            FileType::Video => "video",
            FileType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "document" => Ok(FileType::Document),
            "image" => Ok(FileType::Image),
            "audio" => Ok(FileType::Audio),
            "video" => Ok(FileType::Video),
            "unknown" => Ok(FileType::Unknown),
            _ => Err(format!("Invalid file type: '{s}'")),
        }
    }
}

/// Fields written by an upsert. Topic and embedding fields are owned by the
/// clustering pass and are never touched here.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFile {
    pub path: String,
    pub filename: String,
    /// Lowercase, including the leading dot (`.txt`), empty if none
    pub extension: String,
    pub file_type: FileType,
    pub size: u64,
    pub modified_time: DateTime<Utc>,
    pub created_time: DateTime<Utc>,
    pub content_text: String,
}

impl NewFile {
    /// Reject blank paths and paths SQLite or the file system cannot represent.
    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(CatalogError::validation("file path must not be empty"));
        }
        if self.path.contains('\0') {
            return Err(CatalogError::validation(format!(
                "file path contains a NUL byte: {:?}",
                self.path
            )));
        }
        Ok(())
    }
}

/// A file as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub path: String,
    pub filename: String,
    pub extension: String,
    pub file_type: FileType,
    pub size: u64,
    pub modified_time: DateTime<Utc>,
    pub created_time: DateTime<Utc>,
    pub content_text: String,
    pub topic_id: Option<TopicId>,
    /// Opaque embedding reference written by the clustering pass
    pub embedding_ref: Option<String>,
    /// When the record was first inserted
    pub indexed_time: DateTime<Utc>,
}

/// A topic produced by a clustering run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    pub name: String,
    pub keywords: Vec<String>,
    /// Paths of documents that best represent the topic
    pub representative_docs: Vec<String>,
    pub created_time: DateTime<Utc>,
}

impl Topic {
    pub fn new(id: TopicId, name: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            id,
            name: name.into(),
            keywords,
            representative_docs: Vec::new(),
            created_time: Utc::now(),
        }
    }

    pub fn with_representative_docs(mut self, docs: Vec<String>) -> Self {
        self.representative_docs = docs;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.id == OUTLIER_TOPIC_ID {
            return Err(CatalogError::validation(format!(
                "topic id {OUTLIER_TOPIC_ID} is reserved for outliers"
            )));
        }
        Ok(())
    }
}

/// One document's result from a clustering run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPlacement {
    pub file_id: FileId,
    /// `None` or [`OUTLIER_TOPIC_ID`] leaves the document unclassified
    pub topic_id: Option<TopicId>,
    pub embedding_ref: Option<String>,
}

/// Aggregate counts over the catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_files: usize,
    pub total_topics: usize,
    pub files_by_type: BTreeMap<FileType, usize>,
    pub classified_files: usize,
}

/// File records and their shadow full-text entries.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Insert a record, or update the mutable fields of the record with the
    /// same path. The id of an existing record is preserved.
    async fn upsert_file(&self, file: &NewFile) -> Result<FileId>;

    async fn get_file(&self, id: FileId) -> Result<Option<FileRecord>>;

    async fn get_file_by_path(&self, path: &str) -> Result<Option<FileRecord>>;

    /// Full-text search over filename and content.
    ///
    /// Ordered by the engine's relevance (best first), then by id ascending.
    async fn search_text(&self, term: &str, limit: usize) -> Result<Vec<FileRecord>>;

    /// Record a clustering result. `Some(OUTLIER_TOPIC_ID)` is stored as no
    /// topic. Returns `false` if the file does not exist.
    async fn set_topic(
        &self,
        file_id: FileId,
        topic_id: Option<TopicId>,
        embedding_ref: Option<&str>,
    ) -> Result<bool>;

    async fn list_all(&self) -> Result<Vec<FileRecord>>;

    async fn list_without_topic(&self) -> Result<Vec<FileRecord>>;

    async fn list_by_topic(&self, topic_id: TopicId, limit: usize) -> Result<Vec<FileRecord>>;

    /// Remove the record, its shadow entry and its metadata. Returns `false`
    /// if there was nothing to delete.
    async fn delete_file(&self, id: FileId) -> Result<bool>;

    async fn delete_file_by_path(&self, path: &str) -> Result<bool>;

    /// Set one metadata attribute. Returns `false` if the file does not exist.
    async fn set_metadata(&self, file_id: FileId, key: &str, value: &str) -> Result<bool>;

    async fn get_metadata(&self, file_id: FileId) -> Result<BTreeMap<String, String>>;
}

/// Topic records.
#[async_trait]
pub trait TopicStore: Send + Sync {
    async fn upsert_topic(&self, topic: &Topic) -> Result<()>;

    async fn get_topic(&self, id: TopicId) -> Result<Option<Topic>>;

    async fn list_topics(&self) -> Result<Vec<Topic>>;

    /// Drop every topic and topic assignment, then insert `topics`.
    async fn replace_topics(&self, topics: &[Topic]) -> Result<()>;

    /// Swap in a whole clustering result: the topic set and every placement
    /// are written in one transaction. A placement naming a topic outside
    /// `topics` fails the call and the previous topics and assignments remain.
    async fn apply_topic_model(
        &self,
        topics: &[Topic],
        placements: &[TopicPlacement],
    ) -> Result<()>;
}

/// The complete catalog.
#[async_trait]
pub trait CatalogStore: FileStore + TopicStore {
    async fn stats(&self) -> Result<StoreStats>;

    /// Delete every file, topic and metadata record. Irreversible.
    async fn clear_all(&self) -> Result<()>;

    /// Cheap round trip proving the store can serve requests.
    async fn health_check(&self) -> Result<()>;
}
