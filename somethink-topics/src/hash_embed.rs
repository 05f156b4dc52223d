//! Deterministic hash-embedding provider.
//!
//! Documents are embedded by FNV-1a feature hashing of their lowercase word
//! tokens into a fixed-size, L2-normalised vector. Clustering is a single greedy
//! pass: each document joins the most similar existing cluster when the cosine
//! similarity to that cluster's centroid reaches `similarity_threshold`,
//! otherwise it opens a new one. Clusters smaller than `min_cluster_size` are
//! dissolved into outliers. The surviving centroids are kept so that a query can
//! be mapped to its closest topic.
//!
//! No model is downloaded or trained, so results are reproducible across runs
//! and machines. Embedding references are hex-encoded little-endian f16 vectors.

use crate::config::TopicConfig;
use crate::error::{ProviderError, Result};
use crate::provider::{
    CorpusDocument, DiscoveredTopic, DocumentId, ModelInfo, OUTLIER_TOPIC_ID, SimilarDocument,
    StoredEmbedding, TopicAssignment, TopicId, TopicModelOutput, TopicProvider,
};
use async_trait::async_trait;
use fnv::FnvHasher;
use half::f16;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hasher;
use tokio::sync::RwLock;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "in",
    "is", "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "were", "will",
    "with",
];

/// Feature-hashing embedder and greedy clusterer.
#[derive(Debug)]
pub struct HashEmbedProvider {
    config: TopicConfig,
    index: RwLock<Vec<(DocumentId, Vec<f32>)>>,
    centroids: RwLock<Vec<(TopicId, Vec<f32>)>>,
}

impl HashEmbedProvider {
    /// Fails with [`ProviderError::InvalidConfig`] when `config` does not validate.
    pub fn new(config: TopicConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            index: RwLock::new(Vec::new()),
            centroids: RwLock::new(Vec::new()),
        })
    }

    /// Embed `text` into an L2-normalised vector of `config.dimension` floats.
    ///
    /// Text without any usable token maps to the zero vector.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        embed_tokens(&tokenize(text), self.config.dimension)
    }

    /// Number of documents currently available to [`TopicProvider::find_similar`].
    pub async fn indexed_documents(&self) -> usize {
        self.index.read().await.len()
    }
}

#[async_trait]
impl TopicProvider for HashEmbedProvider {
    async fn discover_topics(&self, corpus: &[CorpusDocument]) -> Result<TopicModelOutput> {
        let config = self.config.clone();
        let corpus = corpus.to_vec();
        tracing::info!("Clustering {} documents", corpus.len());

        let (output, embeddings, centroids) =
            tokio::task::spawn_blocking(move || cluster_corpus(&config, &corpus)).await?;

        *self.index.write().await = embeddings;
        *self.centroids.write().await = centroids;
        tracing::info!(
            "Discovered {} topics, {} outliers",
            output.topics.len(),
            output.assignments.iter().filter(|a| a.is_outlier()).count()
        );
        Ok(output)
    }

    async fn find_similar(&self, query: &str, top_n: usize) -> Result<Vec<SimilarDocument>> {
        if top_n == 0 {
            return Ok(Vec::new());
        }
        let query_embedding = self.embed(query);
        if is_zero(&query_embedding) {
            return Ok(Vec::new());
        }

        let index = self.index.read().await;
        let mut results: Vec<SimilarDocument> = index
            .iter()
            .map(|(file_id, embedding)| SimilarDocument {
                file_id: *file_id,
                similarity: cosine(&query_embedding, embedding).clamp(0.0, 1.0),
            })
            .filter(|doc| doc.similarity > 0.0)
            .collect();

        results.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then(a.file_id.cmp(&b.file_id))
        });
        results.truncate(top_n);
        Ok(results)
    }

    async fn find_topic(&self, query: &str) -> Result<Option<TopicId>> {
        let query_embedding = self.embed(query);
        if is_zero(&query_embedding) {
            return Ok(None);
        }

        let centroids = self.centroids.read().await;
        let best = centroids
            .iter()
            .map(|(topic_id, centroid)| (*topic_id, cosine(&query_embedding, centroid)))
            .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)));

        Ok(best
            .filter(|(_, similarity)| *similarity >= self.config.similarity_threshold)
            .map(|(topic_id, _)| topic_id))
    }

    async fn restore(&self, embeddings: &[StoredEmbedding]) -> Result<usize> {
        let mut restored = Vec::with_capacity(embeddings.len());
        let mut sums: BTreeMap<TopicId, Vec<f32>> = BTreeMap::new();
        for stored in embeddings {
            match decode_embedding(stored.file_id, &stored.embedding_ref) {
                Ok(vector) if vector.len() == self.config.dimension => {
                    if let Some(topic_id) = stored.topic_id.filter(|id| *id != OUTLIER_TOPIC_ID) {
                        let sum = sums
                            .entry(topic_id)
                            .or_insert_with(|| vec![0.0; self.config.dimension]);
                        for (s, v) in sum.iter_mut().zip(&vector) {
                            *s += v;
                        }
                    }
                    restored.push((stored.file_id, vector));
                }
                Ok(vector) => tracing::warn!(
                    "Skipping embedding for document {}: dimension {} != {}",
                    stored.file_id,
                    vector.len(),
                    self.config.dimension
                ),
                Err(e) => tracing::warn!("Skipping embedding: {}", e),
            }
        }

        let count = restored.len();
        *self.index.write().await = restored;
        *self.centroids.write().await = sums.into_iter().collect();
        tracing::debug!("Restored {} embeddings", count);
        Ok(count)
    }

    async fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: self.provider_name().to_string(),
            available: true,
            topics: self.centroids.read().await.len(),
            documents: self.index.read().await.len(),
        }
    }

    fn provider_name(&self) -> &str {
        "hash-embed"
    }
}

struct Cluster {
    centroid: Vec<f32>,
    members: Vec<usize>,
}

type ClusterResult = (
    TopicModelOutput,
    Vec<(DocumentId, Vec<f32>)>,
    Vec<(TopicId, Vec<f32>)>,
);

fn cluster_corpus(config: &TopicConfig, corpus: &[CorpusDocument]) -> ClusterResult {
    let tokens: Vec<Vec<String>> = corpus.iter().map(|doc| tokenize(&doc.text)).collect();
    let embeddings: Vec<Vec<f32>> = tokens
        .iter()
        .map(|t| embed_tokens(t, config.dimension))
        .collect();

    let mut clusters: Vec<Cluster> = Vec::new();
    for (doc_index, embedding) in embeddings.iter().enumerate() {
        if is_zero(embedding) {
            continue;
        }

        let best = clusters
            .iter()
            .enumerate()
            .map(|(i, cluster)| (i, cosine(&cluster.centroid, embedding)))
            .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)));

        match best {
            Some((i, similarity)) if similarity >= config.similarity_threshold => {
                let cluster = &mut clusters[i];
                for (c, v) in cluster.centroid.iter_mut().zip(embedding) {
                    *c += v;
                }
                cluster.members.push(doc_index);
            }
            _ => clusters.push(Cluster {
                centroid: embedding.clone(),
                members: vec![doc_index],
            }),
        }
    }

    let mut topic_of = vec![OUTLIER_TOPIC_ID; corpus.len()];
    let mut topics = Vec::new();
    let mut centroids = Vec::new();
    for cluster in clusters
        .into_iter()
        .filter(|c| c.members.len() >= config.min_cluster_size)
    {
        let topic_id = topics.len() as i64;
        for &member in &cluster.members {
            topic_of[member] = topic_id;
        }

        let keywords = top_keywords(
            cluster.members.iter().map(|&m| tokens[m].as_slice()),
            config.top_keywords,
        );
        let name = if keywords.is_empty() {
            format!("Topic_{topic_id}")
        } else {
            keywords
                .iter()
                .take(3)
                .cloned()
                .collect::<Vec<_>>()
                .join("_")
        };

        let mut ranked: Vec<(usize, f32)> = cluster
            .members
            .iter()
            .map(|&m| (m, cosine(&cluster.centroid, &embeddings[m])))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        let representative_docs = ranked
            .into_iter()
            .take(config.representative_docs)
            .map(|(m, _)| corpus[m].file_id)
            .collect();

        topics.push(DiscoveredTopic {
            id: topic_id,
            name,
            keywords,
            representative_docs,
        });
        centroids.push((topic_id, cluster.centroid));
    }

    let assignments = corpus
        .iter()
        .zip(&embeddings)
        .zip(topic_of)
        .map(|((doc, embedding), topic_id)| TopicAssignment {
            file_id: doc.file_id,
            topic_id,
            embedding_ref: Some(encode_embedding(embedding)),
        })
        .collect();

    let index = corpus
        .iter()
        .map(|doc| doc.file_id)
        .zip(embeddings)
        .collect();

    (
        TopicModelOutput {
            topics,
            assignments,
        },
        index,
        centroids,
    )
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

fn embed_tokens(tokens: &[String], dimension: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dimension];
    for token in tokens {
        let mut hasher = FnvHasher::default();
        hasher.write(token.as_bytes());
        let hash = hasher.finish();
        let slot = (hash % dimension as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        vector[slot] += sign;
    }

    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}

fn top_keywords<'a>(documents: impl Iterator<Item = &'a [String]>, limit: usize) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for tokens in documents {
        for token in tokens {
            *counts.entry(token.as_str()).or_default() += 1;
        }
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(limit)
        .map(|(token, _)| token.to_string())
        .collect()
}

fn is_zero(vector: &[f32]) -> bool {
    vector.iter().all(|&x| x == 0.0)
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Serialize an embedding as hex-encoded f16 values.
pub fn encode_embedding(vector: &[f32]) -> String {
    let halves: Vec<f16> = vector.iter().copied().map(f16::from_f32).collect();
    hex::encode(bytemuck::cast_slice::<f16, u8>(&halves))
}

/// Inverse of [`encode_embedding`].
pub fn decode_embedding(file_id: DocumentId, encoded: &str) -> Result<Vec<f32>> {
    let bytes = hex::decode(encoded).map_err(|e| ProviderError::MalformedEmbedding {
        file_id,
        reason: e.to_string(),
    })?;
    if bytes.len() % 2 != 0 {
        return Err(ProviderError::MalformedEmbedding {
            file_id,
            reason: format!("odd byte length {}", bytes.len()),
        });
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| f16::from_le_bytes([pair[0], pair[1]]).to_f32())
        .collect())
}
