//! Configuration for topic providers

use crate::error::{ProviderError, Result};
use serde::{Deserialize, Serialize};

/// Which provider backs the semantic signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// No semantic signal; every query returns an empty candidate set
    #[default]
    None,
    /// Deterministic feature-hashing embeddings with greedy clustering
    HashEmbed,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::None => write!(f, "none"),
            ProviderKind::HashEmbed => write!(f, "hash-embed"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" | "noop" | "off" => Ok(ProviderKind::None),
            "hash-embed" | "hash_embed" | "hash" => Ok(ProviderKind::HashEmbed),
            _ => Err(ProviderError::invalid_config(format!(
                "unknown provider '{s}', expected one of: none, hash-embed"
            ))),
        }
    }
}

/// Settings shared by all topic providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    /// Provider selection
    pub provider: ProviderKind,
    /// Dimension of the hashed embedding vectors
    pub dimension: usize,
    /// Minimum cosine similarity for a document to join an existing cluster
    pub similarity_threshold: f32,
    /// Clusters with fewer members are reported as outliers
    pub min_cluster_size: usize,
    /// Corpora smaller than this are not clustered at all
    pub min_documents: usize,
    /// Number of keywords kept per topic
    pub top_keywords: usize,
    /// Number of representative documents kept per topic
    pub representative_docs: usize,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::None,
            dimension: 256,
            similarity_threshold: 0.3,
            min_cluster_size: 3,
            min_documents: 10,
            top_keywords: 10,
            representative_docs: 3,
        }
    }
}

impl TopicConfig {
    /// Default settings with the hash-embedding provider selected.
    pub fn hash_embed() -> Self {
        Self {
            provider: ProviderKind::HashEmbed,
            ..Self::default()
        }
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_min_cluster_size(mut self, size: usize) -> Self {
        self.min_cluster_size = size;
        self
    }

    pub fn with_min_documents(mut self, count: usize) -> Self {
        self.min_documents = count;
        self
    }

    /// Reject settings no provider can work with.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(ProviderError::invalid_config("dimension must be positive"));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ProviderError::invalid_config(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.min_cluster_size == 0 {
            return Err(ProviderError::invalid_config(
                "min_cluster_size must be at least 1",
            ));
        }
        Ok(())
    }
}
