//! Topic provider trait and the no-op provider

use crate::config::{ProviderKind, TopicConfig};
use crate::error::Result;
use crate::hash_embed::HashEmbedProvider;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Catalog row id of a document.
pub type DocumentId = i64;

/// Topic identifier as produced by a clustering run.
pub type TopicId = i64;

/// Reserved topic id meaning "outlier / not assigned to any cluster".
///
/// Never persisted as a topic record.
pub const OUTLIER_TOPIC_ID: TopicId = -1;

/// One document of the corpus handed to a clustering run.
#[derive(Debug, Clone)]
pub struct CorpusDocument {
    pub file_id: DocumentId,
    pub text: String,
}

/// A cluster discovered over the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredTopic {
    pub id: TopicId,
    pub name: String,
    pub keywords: Vec<String>,
    pub representative_docs: Vec<DocumentId>,
}

/// Per-document result of a clustering run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicAssignment {
    pub file_id: DocumentId,
    /// [`OUTLIER_TOPIC_ID`] when the document joined no cluster
    pub topic_id: TopicId,
    /// Opaque serialized embedding, if the provider produces one
    pub embedding_ref: Option<String>,
}

impl TopicAssignment {
    pub fn is_outlier(&self) -> bool {
        self.topic_id == OUTLIER_TOPIC_ID
    }
}

/// Output of [`TopicProvider::discover_topics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicModelOutput {
    pub topics: Vec<DiscoveredTopic>,
    pub assignments: Vec<TopicAssignment>,
}

/// A document similar to a query, with similarity in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarDocument {
    pub file_id: DocumentId,
    pub similarity: f32,
}

/// A previously computed embedding reference, used to warm a provider.
#[derive(Debug, Clone)]
pub struct StoredEmbedding {
    pub file_id: DocumentId,
    pub embedding_ref: String,
    /// Topic the document was assigned to, `None` for outliers
    pub topic_id: Option<TopicId>,
}

/// What a provider currently holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub provider: String,
    pub available: bool,
    /// Topics known to the provider
    pub topics: usize,
    /// Documents available to similarity lookups
    pub documents: usize,
}

/// Source of topics and of the semantic search signal.
///
/// Consumers depend only on this trait. The no-op implementation stands in
/// when semantic search is disabled, so callers never branch on "is there a
/// provider".
#[async_trait]
pub trait TopicProvider: Send + Sync {
    /// Cluster the whole corpus.
    async fn discover_topics(&self, corpus: &[CorpusDocument]) -> Result<TopicModelOutput>;

    /// Rank previously clustered documents by similarity to `query`.
    async fn find_similar(&self, query: &str, top_n: usize) -> Result<Vec<SimilarDocument>>;

    /// The topic whose cluster is closest to `query`, or `None` when the query
    /// falls outside every cluster.
    async fn find_topic(&self, _query: &str) -> Result<Option<TopicId>> {
        Ok(None)
    }

    /// Reload embeddings produced by an earlier run.
    async fn restore(&self, _embeddings: &[StoredEmbedding]) -> Result<usize> {
        Ok(0)
    }

    async fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: self.provider_name().to_string(),
            available: self.is_available(),
            topics: 0,
            documents: 0,
        }
    }

    /// Whether this provider contributes a semantic signal at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Name used in logs and status output
    fn provider_name(&self) -> &str;
}

/// Provider that never produces topics or similar documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTopicProvider;

#[async_trait]
impl TopicProvider for NoopTopicProvider {
    async fn discover_topics(&self, _corpus: &[CorpusDocument]) -> Result<TopicModelOutput> {
        Ok(TopicModelOutput::default())
    }

    async fn find_similar(&self, _query: &str, _top_n: usize) -> Result<Vec<SimilarDocument>> {
        Ok(Vec::new())
    }

    fn is_available(&self) -> bool {
        false
    }

    fn provider_name(&self) -> &str {
        "none"
    }
}

/// Build the provider selected by `config`.
pub fn create_provider(config: &TopicConfig) -> Result<Arc<dyn TopicProvider>> {
    config.validate()?;
    let provider: Arc<dyn TopicProvider> = match config.provider {
        ProviderKind::None => Arc::new(NoopTopicProvider),
        ProviderKind::HashEmbed => Arc::new(HashEmbedProvider::new(config.clone())?),
    };
    tracing::info!("Using topic provider: {}", provider.provider_name());
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_provider_is_empty() {
        let provider = NoopTopicProvider;
        let corpus = vec![CorpusDocument {
            file_id: 1,
            text: "alpha beta".to_string(),
        }];

        let output = provider.discover_topics(&corpus).await.unwrap();
        assert!(output.topics.is_empty());
        assert!(output.assignments.is_empty());
        assert!(provider.find_similar("alpha", 10).await.unwrap().is_empty());
        assert_eq!(provider.find_topic("alpha").await.unwrap(), None);
        assert!(!provider.is_available());

        let info = provider.model_info().await;
        assert_eq!(info.provider, "none");
        assert!(!info.available);
        assert_eq!((info.topics, info.documents), (0, 0));
    }

    #[test]
    fn test_create_provider_selection() {
        let noop = create_provider(&TopicConfig::default()).unwrap();
        assert_eq!(noop.provider_name(), "none");

        let hash = create_provider(&TopicConfig::hash_embed()).unwrap();
        assert_eq!(hash.provider_name(), "hash-embed");
        assert!(hash.is_available());

        let invalid = TopicConfig::hash_embed().with_dimension(0);
        assert!(create_provider(&invalid).is_err());
    }

    #[test]
    fn test_outlier_assignment() {
        let assignment = TopicAssignment {
            file_id: 7,
            topic_id: OUTLIER_TOPIC_ID,
            embedding_ref: None,
        };
        assert!(assignment.is_outlier());
    }
}
