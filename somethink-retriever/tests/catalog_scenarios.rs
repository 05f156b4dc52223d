//! End-to-end scenarios for the catalog
//!
//! These tests drive the public API only:
//! - Searching an empty and a single-record catalog
//! - Runs over a mix of valid and missing roots
//! - Rejection of overlapping runs
//! - Upsert identity and path uniqueness
//! - Score bounds and monotonicity of the fused ranking

use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use somethink_retriever::{
    config::CatalogConfig,
    error::CatalogError,
    retrieval::{
        extractor::PlainTextExtractor,
        indexing_engine::{Indexer, IndexingEvent, RunOutcome},
        searcher::{LEXICAL_WEIGHT, Searcher, lexical_score},
    },
    storage::{
        CatalogStore, FileId, FileStore, FileType, NewFile, sqlite_store::SqliteStore,
    },
};
use somethink_topics::{
    CorpusDocument, NoopTopicProvider, SimilarDocument, TopicModelOutput, TopicProvider,
};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::tempdir;

fn new_file(path: &str, content: &str) -> NewFile {
    let filename = path.rsplit('/').next().unwrap_or(path).to_string();
    NewFile {
        path: path.to_string(),
        filename,
        extension: ".txt".to_string(),
        file_type: FileType::Document,
        size: content.len() as u64,
        modified_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        created_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        content_text: content.to_string(),
    }
}

fn indexer(store: Arc<SqliteStore>) -> Result<Indexer> {
    Ok(Indexer::new(
        store,
        Arc::new(PlainTextExtractor::default()),
        &CatalogConfig::default(),
    )?)
}

/// Gives every known document the same similarity.
struct UniformProvider {
    ids: Vec<FileId>,
    similarity: f32,
}

#[async_trait]
impl TopicProvider for UniformProvider {
    async fn discover_topics(
        &self,
        _corpus: &[CorpusDocument],
    ) -> somethink_topics::Result<TopicModelOutput> {
        Ok(TopicModelOutput::default())
    }

    async fn find_similar(
        &self,
        _query: &str,
        top_n: usize,
    ) -> somethink_topics::Result<Vec<SimilarDocument>> {
        Ok(self
            .ids
            .iter()
            .take(top_n)
            .map(|&file_id| SimilarDocument {
                file_id,
                similarity: self.similarity,
            })
            .collect())
    }

    fn provider_name(&self) -> &str {
        "uniform"
    }
}

#[tokio::test]
async fn test_empty_catalog_returns_nothing() -> Result<()> {
    let store = Arc::new(SqliteStore::open_memory().await?);
    let searcher = Searcher::new(store, Some(Arc::new(NoopTopicProvider)));

    assert!(searcher.search("anything", 10, true).await?.is_empty());
    assert!(searcher.search("anything", 10, false).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_content_frequency_scores_single_record() -> Result<()> {
    let store = Arc::new(SqliteStore::open_memory().await?);
    let id = store
        .upsert_file(&new_file("/a/doc.txt", "alpha beta beta"))
        .await?;
    let searcher = Searcher::new(store, None);

    let hits = searcher.search("beta", 10, false).await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.id, id);
    assert!(hits[0].score > 0.0);
    // no filename bonus, frequency bonus capped at 0.5
    assert!((hits[0].score - LEXICAL_WEIGHT * 0.5).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn test_missing_root_does_not_fail_run() -> Result<()> {
    let dir = tempdir()?;
    let valid = dir.path().join("valid");
    std::fs::create_dir(&valid)?;
    std::fs::write(valid.join("one.txt"), "first")?;
    std::fs::write(valid.join("two.md"), "second")?;
    std::fs::write(valid.join("photo.png"), [0u8; 8])?;

    let store = Arc::new(SqliteStore::open_memory().await?);
    let indexer = indexer(store.clone())?;
    indexer.start(vec![dir.path().join("missing"), valid])?;

    let report = indexer.wait_for_completion().await.expect("run report");
    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(report.total, 3);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed_roots, 1);
    assert!(report.error.is_none());
    assert_eq!(store.stats().await?.total_files, 3);
    Ok(())
}

#[tokio::test]
async fn test_rapid_starts_complete_once() -> Result<()> {
    let dir = tempdir()?;
    std::fs::write(dir.path().join("a.txt"), "alpha")?;

    let store = Arc::new(SqliteStore::open_memory().await?);
    let indexer = indexer(store)?;
    let events = indexer.events();

    indexer.start(vec![dir.path().to_path_buf()])?;
    let second = indexer.start(vec![dir.path().to_path_buf()]);
    assert!(matches!(
        second,
        Err(CatalogError::ConcurrentRunRejected { .. })
    ));

    indexer.wait_for_completion().await;
    let completed = events
        .drain()
        .filter(|event| matches!(event, IndexingEvent::Completed(_)))
        .count();
    assert_eq!(completed, 1);
    Ok(())
}

#[tokio::test]
async fn test_upsert_is_idempotent() -> Result<()> {
    let store = SqliteStore::open_memory().await?;
    let file = new_file("/docs/report.txt", "quarterly numbers");

    let first = store.upsert_file(&file).await?;
    let second = store.upsert_file(&file).await?;
    assert_eq!(first, second);
    assert_eq!(store.list_all().await?.len(), 1);

    let changed = NewFile {
        content_text: "annual summary".to_string(),
        ..file.clone()
    };
    assert_eq!(store.upsert_file(&changed).await?, first);
    assert!(store.search_text("quarterly", 10).await?.is_empty());
    let hits = store.search_text("annual", 10).await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, first);
    Ok(())
}

#[tokio::test]
async fn test_paths_stay_unique_under_concurrent_upserts() -> Result<()> {
    let dir = tempdir()?;
    let store = Arc::new(SqliteStore::open(&dir.path().join("catalog.db")).await?);

    let mut tasks = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let path = format!("/shared/{}.txt", i % 4);
            store.upsert_file(&new_file(&path, &format!("v{i}"))).await
        }));
    }
    for task in tasks {
        task.await??;
    }

    let records = store.list_all().await?;
    assert_eq!(records.len(), 4);
    let paths: HashSet<_> = records.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_disabled_semantic_matches_lexical_formula() -> Result<()> {
    let store = Arc::new(SqliteStore::open_memory().await?);
    let long = format!("alpha {}", "filler ".repeat(500));
    let mut ids = Vec::new();
    for (path, content) in [
        ("/n/alpha.txt", "alpha"),
        ("/n/b.txt", "alpha alpha beta gamma delta"),
        ("/n/c.txt", long.as_str()),
    ] {
        ids.push(store.upsert_file(&new_file(path, content)).await?);
    }

    let provider = Arc::new(UniformProvider {
        ids: ids.clone(),
        similarity: 0.8,
    });
    let with_provider = Searcher::new(store.clone(), Some(provider));
    let without_provider = Searcher::new(store.clone(), None);

    let a = with_provider.search("alpha", 10, false).await?;
    let b = without_provider.search("alpha", 10, false).await?;
    assert_eq!(a, b);
    for hit in &a {
        let expected = LEXICAL_WEIGHT * lexical_score("alpha", &hit.record).min(1.0);
        assert!((hit.score - expected).abs() < 1e-9);
    }
    Ok(())
}

#[tokio::test]
async fn test_fused_scores_are_bounded_and_monotone() -> Result<()> {
    let store = Arc::new(SqliteStore::open_memory().await?);
    let strong = store
        .upsert_file(&new_file("/m/alpha_notes.txt", "alpha alpha"))
        .await?;
    let weak = store
        .upsert_file(&new_file("/m/misc.txt", &format!("alpha {}", "x ".repeat(1000))))
        .await?;

    // provider claims out-of-range similarity; fusion must clamp it
    let provider = Arc::new(UniformProvider {
        ids: vec![strong, weak],
        similarity: 1.5,
    });
    let searcher = Searcher::new(store, Some(provider));
    let hits = searcher.search("alpha", 10, true).await?;

    assert_eq!(hits.len(), 2);
    for hit in &hits {
        assert!((0.0..=1.0).contains(&hit.score), "score {}", hit.score);
    }
    // equal semantic contribution, higher lexical score ranks first
    assert_eq!(hits[0].record.id, strong);
    assert!(hits[0].score >= hits[1].score);
    Ok(())
}
