//! Error types for topic providers

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Failure raised by a topic/embedding provider.
///
/// Callers in the search path treat any of these as "no semantic signal for
/// this query" rather than a hard failure; the topic synchronisation pass
/// propagates them to whoever requested the rebuild.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Provider configuration is invalid
    #[error("Invalid provider configuration: {message}")]
    InvalidConfig { message: String },

    /// The provider does not support the requested operation
    #[error("Operation not supported by provider '{provider}': {operation}")]
    Unsupported {
        provider: String,
        operation: &'static str,
    },

    /// A stored embedding reference could not be decoded
    #[error("Malformed embedding reference for document {file_id}: {reason}")]
    MalformedEmbedding { file_id: i64, reason: String },

    /// Error while computing embeddings or clusters
    #[error("Embedding generation failed: {source}")]
    EmbeddingGeneration {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Async task join errors
    #[error("Async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Generic errors from other libraries
    #[error("External error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl ProviderError {
    /// Wrap any error raised while generating embeddings.
    pub fn embedding_gen<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::EmbeddingGeneration {
            source: Box::new(source),
        }
    }

    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
