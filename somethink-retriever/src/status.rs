//! Status reporting for the catalog
//!
//! [`IndexStatus`] is the snapshot returned by
//! [`Indexer::status`](crate::retrieval::indexing_engine::Indexer::status): the
//! indexer state, the report of the last finished run, aggregate store counts
//! and a connectivity check. [`IndexStatus::with_provider`] adds what the topic
//! provider currently holds.

use serde::{Deserialize, Serialize};
use somethink_topics::{ModelInfo, TopicProvider};

use crate::retrieval::indexing_engine::RunReport;
use crate::retrieval::indexing_state::IndexingState;
use crate::storage::{CatalogStore, StoreStats};

/// Snapshot of the indexer and the catalog behind it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStatus {
    /// Current lifecycle state
    pub state: IndexingState,
    /// Report of the most recent finished run, if any
    pub last_run: Option<RunReport>,
    /// Aggregate counts; zeroed when the store is unreachable
    pub stats: StoreStats,
    pub health: IndexHealth,
    /// Topic provider summary, when one was attached
    pub model: Option<ModelInfo>,
}

impl IndexStatus {
    pub async fn with_provider(mut self, provider: &dyn TopicProvider) -> Self {
        self.model = Some(provider.model_info().await);
        self
    }
}

/// Store health check information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexHealth {
    /// Database connectivity status
    pub database_connected: bool,
    /// Database connectivity error message (if any)
    pub database_error: Option<String>,
    pub overall_status: HealthStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Critical,
}

impl IndexHealth {
    pub async fn check(store: &dyn CatalogStore) -> Self {
        match store.health_check().await {
            Ok(()) => Self {
                database_connected: true,
                database_error: None,
                overall_status: HealthStatus::Healthy,
            },
            Err(e) => Self {
                database_connected: false,
                database_error: Some(e.to_string()),
                overall_status: HealthStatus::Critical,
            },
        }
    }
}

impl std::fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "State: {}", self.state)?;
        match &self.last_run {
            Some(run) => writeln!(
                f,
                "Last run: {} ({}/{} files processed)",
                run.outcome, run.succeeded, run.total
            )?,
            None => writeln!(f, "Last run: never")?,
        }
        writeln!(
            f,
            "Files: {} ({} classified), topics: {}",
            self.stats.total_files, self.stats.classified_files, self.stats.total_topics
        )?;
        for (file_type, count) in &self.stats.files_by_type {
            writeln!(f, "  {file_type}: {count}")?;
        }
        if let Some(model) = &self.model {
            writeln!(
                f,
                "Topic provider: {} ({} topics, {} documents)",
                model.provider, model.topics, model.documents
            )?;
        }
        match &self.health.database_error {
            Some(error) => write!(f, "Database: unreachable ({error})"),
            None => write!(f, "Database: connected"),
        }
    }
}
