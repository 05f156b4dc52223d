//! Ranked search over the catalog.
//!
//! Two candidate sets are fused by path:
//!
//! - **lexical**: full-text matches from the store, scored by
//!   [`lexical_score`]
//! - **semantic**: similar documents from the topic provider, scored by the
//!   provider's similarity
//!
//! ```text
//! score = 0.4 * clamp(lexical) + w * clamp(semantic) + 0.1 * metadata
//! ```
//!
//! `w` is 0.5 when the semantic signal is requested and the provider is
//! available, otherwise 0. A non-finite signal counts as 0. The metadata signal is always 0 for now, so a score
//! never exceeds 0.9. Results are sorted by score descending, ties by id
//! ascending.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use somethink_topics::TopicProvider;
use tracing::{debug, warn};

use crate::error::Result;
use crate::storage::{CatalogStore, FileRecord};

pub const LEXICAL_WEIGHT: f64 = 0.4;
pub const SEMANTIC_WEIGHT: f64 = 0.5;
pub const METADATA_WEIGHT: f64 = 0.1;

/// A ranked result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub record: FileRecord,
    /// Fused relevance in `[0, 1]`
    pub score: f64,
}

/// Lexical relevance of a record to `query`, in `[0, 1]`.
///
/// Half comes from the query appearing in the filename, half from how often it
/// appears in the content relative to the content's word count.
pub fn lexical_score(query: &str, record: &FileRecord) -> f64 {
    let query = query.to_lowercase();
    if query.is_empty() {
        return 0.0;
    }

    let mut score = 0.0;
    if record.filename.to_lowercase().contains(&query) {
        score += 0.5;
    }

    if !record.content_text.is_empty() {
        let content = record.content_text.to_lowercase();
        let occurrences = content.matches(query.as_str()).count();
        let words = record.content_text.split_whitespace().count().max(1);
        score += (occurrences as f64 / words as f64 * 100.0).min(0.5);
    }
    score
}

#[derive(Debug)]
struct Candidate {
    record: FileRecord,
    lexical: f64,
    semantic: f64,
}

/// Query front end over a store and an optional topic provider.
#[derive(Clone)]
pub struct Searcher {
    store: Arc<dyn CatalogStore>,
    provider: Option<Arc<dyn TopicProvider>>,
}

impl std::fmt::Debug for Searcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Searcher")
            .field(
                "provider",
                &self.provider.as_ref().map(|p| p.provider_name().to_string()),
            )
            .finish_non_exhaustive()
    }
}

impl Searcher {
    pub fn new(store: Arc<dyn CatalogStore>, provider: Option<Arc<dyn TopicProvider>>) -> Self {
        Self { store, provider }
    }

    /// Whether a semantic signal can currently be produced.
    pub fn semantic_available(&self) -> bool {
        self.provider.as_ref().is_some_and(|p| p.is_available())
    }

    /// Ranked search. A blank query or `max_results == 0` yields no results
    /// without touching either signal.
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        use_semantic: bool,
    ) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() || max_results == 0 {
            return Ok(Vec::new());
        }
        let pool_size = max_results.saturating_mul(2);

        let mut candidates: HashMap<String, Candidate> = HashMap::new();
        for record in self.store.search_text(query, pool_size).await? {
            let lexical = lexical_score(query, &record);
            candidates.insert(
                record.path.clone(),
                Candidate {
                    record,
                    lexical,
                    semantic: 0.0,
                },
            );
        }
        let lexical_count = candidates.len();

        let semantic_weight = if use_semantic && self.semantic_available() {
            SEMANTIC_WEIGHT
        } else {
            0.0
        };
        if semantic_weight > 0.0 {
            for (record, similarity) in self.semantic_candidates(query, pool_size).await? {
                candidates
                    .entry(record.path.clone())
                    .or_insert(Candidate {
                        record,
                        lexical: 0.0,
                        semantic: 0.0,
                    })
                    .semantic = similarity;
            }
        }

        let mut hits: Vec<SearchHit> = candidates
            .into_values()
            .map(|c| SearchHit {
                score: LEXICAL_WEIGHT * unit_signal(c.lexical)
                    + semantic_weight * unit_signal(c.semantic)
                    + METADATA_WEIGHT * 0.0,
                record: c.record,
            })
            .collect();

        hits.sort_by(compare_hits);
        hits.truncate(max_results);

        debug!(
            "Query {:?}: {} lexical candidates, {} results",
            query,
            lexical_count,
            hits.len()
        );
        Ok(hits)
    }

    /// Provider matches resolved to records. A provider failure degrades to no
    /// semantic candidates.
    async fn semantic_candidates(
        &self,
        query: &str,
        top_n: usize,
    ) -> Result<Vec<(FileRecord, f64)>> {
        let Some(provider) = &self.provider else {
            return Ok(Vec::new());
        };

        let similar = match provider.find_similar(query, top_n).await {
            Ok(similar) => similar,
            Err(e) => {
                warn!(
                    "Semantic search via {} failed, using lexical results only: {}",
                    provider.provider_name(),
                    e
                );
                return Ok(Vec::new());
            }
        };

        let mut resolved = Vec::with_capacity(similar.len());
        for doc in similar {
            match self.store.get_file(doc.file_id).await? {
                Some(record) => resolved.push((record, f64::from(doc.similarity))),
                None => debug!("Provider returned unknown file id {}", doc.file_id),
            }
        }
        Ok(resolved)
    }
}

/// Clamp a signal into `[0, 1]`, mapping NaN and infinities to 0.
fn unit_signal(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Ordering used for hits, exposed for callers merging result pages.
pub fn compare_hits(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.record.id.cmp(&b.record.id))
}
