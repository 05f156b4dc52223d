//! # somethink-topics
//!
//! The topic/embedding provider boundary of the SomeThink catalog. The catalog
//! consumes two capabilities through the [`TopicProvider`] trait:
//!
//! - **Batch clustering** over the whole corpus, returning topics (id, name,
//!   keywords, representative documents) and one assignment per document, where
//!   [`OUTLIER_TOPIC_ID`] marks documents that joined no cluster
//! - **Similarity lookup** (`find_similar`) returning document ids with a
//!   similarity already bounded to `[0, 1]`, and `find_topic` mapping a query
//!   to its closest topic
//!
//! ## Providers
//!
//! - [`NoopTopicProvider`]: never produces topics or candidates; used when the
//!   semantic signal is switched off
//! - [`HashEmbedProvider`]: deterministic feature-hashing embeddings with a
//!   greedy clustering pass, no model download required
//!
//! [`create_provider`] builds the one selected in [`TopicConfig`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use somethink_topics::{create_provider, CorpusDocument, TopicConfig};
//!
//! # async fn example() -> somethink_topics::Result<()> {
//! let provider = create_provider(&TopicConfig::hash_embed())?;
//! let corpus = vec![CorpusDocument { file_id: 1, text: "rust borrow checker".into() }];
//! let output = provider.discover_topics(&corpus).await?;
//! let similar = provider.find_similar("borrow checker", 5).await?;
//! println!("{} topics, {} similar", output.topics.len(), similar.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod hash_embed;
pub mod provider;

pub use config::{ProviderKind, TopicConfig};
pub use error::{ProviderError, Result};
pub use hash_embed::HashEmbedProvider;
pub use provider::{
    CorpusDocument, DiscoveredTopic, DocumentId, ModelInfo, NoopTopicProvider, OUTLIER_TOPIC_ID,
    SimilarDocument, StoredEmbedding, TopicAssignment, TopicId, TopicModelOutput, TopicProvider,
    create_provider,
};
