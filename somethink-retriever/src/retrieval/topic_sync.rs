//! Synchronizes topic clustering results into the catalog.
//!
//! A rebuild gathers every record with text, asks the provider to cluster
//! them, then replaces the stored topic set and writes one assignment per
//! document in a single store transaction. Outliers end up without a topic but keep their embedding
//! reference, which [`restore_provider`] hands back to the provider on the next
//! start so similarity search works without reclustering.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use somethink_topics::{CorpusDocument, StoredEmbedding, TopicConfig, TopicProvider};
use tracing::{info, warn};

use crate::error::Result;
use crate::storage::{CatalogStore, FileId, OUTLIER_TOPIC_ID, Topic, TopicPlacement};

/// Outcome of [`rebuild_topics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSyncReport {
    /// Documents handed to the provider
    pub documents: usize,
    pub topics: usize,
    pub classified: usize,
    pub outliers: usize,
    /// True when clustering did not run (provider unavailable or corpus too small)
    pub skipped: bool,
}

pub async fn rebuild_topics(
    store: &dyn CatalogStore,
    provider: &dyn TopicProvider,
    config: &TopicConfig,
) -> Result<TopicSyncReport> {
    if !provider.is_available() {
        info!(
            "Topic provider {} is disabled, skipping clustering",
            provider.provider_name()
        );
        return Ok(TopicSyncReport {
            skipped: true,
            ..Default::default()
        });
    }

    let records = store.list_all().await?;
    let paths: HashMap<FileId, String> = records
        .iter()
        .map(|record| (record.id, record.path.clone()))
        .collect();
    let corpus: Vec<CorpusDocument> = records
        .into_iter()
        .filter(|record| !record.content_text.trim().is_empty())
        .map(|record| CorpusDocument {
            file_id: record.id,
            text: record.content_text,
        })
        .collect();

    if corpus.len() < config.min_documents {
        info!(
            "Only {} documents with text, need {} to cluster",
            corpus.len(),
            config.min_documents
        );
        return Ok(TopicSyncReport {
            documents: corpus.len(),
            skipped: true,
            ..Default::default()
        });
    }

    let output = provider.discover_topics(&corpus).await?;

    let created_time = Utc::now();
    let topics: Vec<Topic> = output
        .topics
        .into_iter()
        .filter(|topic| {
            if topic.id == OUTLIER_TOPIC_ID {
                warn!("Provider reported the outlier id as a topic, ignoring it");
                return false;
            }
            true
        })
        .map(|topic| Topic {
            id: topic.id,
            name: topic.name,
            keywords: topic.keywords,
            representative_docs: topic
                .representative_docs
                .iter()
                .filter_map(|id| paths.get(id).cloned())
                .collect(),
            created_time,
        })
        .collect();

    let known: HashSet<_> = topics.iter().map(|topic| topic.id).collect();
    let mut report = TopicSyncReport {
        documents: corpus.len(),
        topics: topics.len(),
        ..Default::default()
    };
    let placements: Vec<TopicPlacement> = output
        .assignments
        .into_iter()
        .map(|assignment| {
            let topic_id = if known.contains(&assignment.topic_id) {
                report.classified += 1;
                Some(assignment.topic_id)
            } else {
                if !assignment.is_outlier() {
                    warn!(
                        "Document {} assigned to unknown topic {}, storing as outlier",
                        assignment.file_id, assignment.topic_id
                    );
                }
                report.outliers += 1;
                None
            };
            TopicPlacement {
                file_id: assignment.file_id,
                topic_id,
                embedding_ref: assignment.embedding_ref,
            }
        })
        .collect();
    store.apply_topic_model(&topics, &placements).await?;

    info!(
        "Topic rebuild: {} topics, {} classified, {} outliers",
        report.topics, report.classified, report.outliers
    );
    Ok(report)
}

/// Loads stored embedding references into the provider.
pub async fn restore_provider(
    store: &dyn CatalogStore,
    provider: &dyn TopicProvider,
) -> Result<usize> {
    if !provider.is_available() {
        return Ok(0);
    }

    let embeddings: Vec<StoredEmbedding> = store
        .list_all()
        .await?
        .into_iter()
        .filter_map(|record| {
            record.embedding_ref.map(|embedding_ref| StoredEmbedding {
                file_id: record.id,
                embedding_ref,
                topic_id: record.topic_id,
            })
        })
        .collect();
    if embeddings.is_empty() {
        return Ok(0);
    }

    let restored = provider.restore(&embeddings).await?;
    info!(
        "Restored {} of {} stored embeddings into {}",
        restored,
        embeddings.len(),
        provider.provider_name()
    );
    Ok(restored)
}
