//! Catalog configuration
//!
//! Values are passed explicitly into constructors. Locating the file is the
//! caller's concern; the CLI takes `--config <path>`.

use crate::error::{CatalogError, Result};
use serde::{Deserialize, Serialize};
use somethink_topics::TopicConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings shared by the Indexer, the Searcher and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// SQLite database file; `None` lets the CLI pick its default
    pub database_path: Option<PathBuf>,
    /// Roots crawled by a full run
    pub index_paths: Vec<PathBuf>,
    /// Glob patterns matched against single path segments
    pub exclude_patterns: Vec<String>,
    /// Default number of search results
    pub max_results: usize,
    /// Interactive front ends wait this long after the last keystroke
    pub search_debounce_ms: u64,
    /// Capacity of the indexer's event channel
    pub event_capacity: usize,
    /// Upper bound on text read from a single file
    pub max_extract_bytes: usize,
    pub topics: TopicConfig,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            index_paths: Vec::new(),
            exclude_patterns: vec![
                ".git".to_string(),
                "node_modules".to_string(),
                "__pycache__".to_string(),
                ".DS_Store".to_string(),
            ],
            max_results: 50,
            search_debounce_ms: 300,
            event_capacity: 1024,
            max_extract_bytes: 8 * 1024 * 1024,
            topics: TopicConfig::default(),
        }
    }
}

impl CatalogConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&text)
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn with_index_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.index_paths = paths;
        self
    }

    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.exclude_patterns = patterns;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_topics(mut self, topics: TopicConfig) -> Self {
        self.topics = topics;
        self
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(CatalogError::config("event_capacity must be at least 1"));
        }
        for pattern in &self.exclude_patterns {
            glob::Pattern::new(pattern).map_err(|e| {
                CatalogError::config(format!("invalid exclude pattern '{pattern}': {e}"))
            })?;
        }
        self.topics.validate()?;
        Ok(())
    }
}
