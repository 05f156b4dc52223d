//! Incremental indexer that keeps the catalog in step with the file system.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle ──start()──▶ Scanning ──▶ Upserting ──▶ Done ──┐
//!   ▲                   │                              │
//!   │                   └────────────▶ Failed ─────────┤
//!   └──────────────────────────────────────────────────┘
//! ```
//!
//! [`Indexer::start`] wins the `Idle -> Scanning` transition with a
//! compare-and-swap or returns [`CatalogError::ConcurrentRunRejected`]. The run
//! itself executes on the Tokio runtime; `start` returns immediately.
//!
//! ## Per-file work
//!
//! A candidate whose stored `modified_time` is at least its current
//! modification time is skipped without extraction or write. Otherwise the
//! extractor produces text (a failure stores empty text) and the record is
//! upserted. A failure on one file is logged and the run moves on.
//!
//! A run only fails when the store is unreachable or when every configured
//! root failed to open.
//!
//! ## Events
//!
//! Progress and completion are published on a bounded [`flume`] channel
//! obtained from [`Indexer::events`]. When the channel is full a progress event
//! is dropped, while the completion event evicts the oldest queued event so that
//! every run publishes exactly one [`IndexingEvent::Completed`].
//!
//! ## Usage
//!
//! ```no_run
//! use somethink_retriever::config::CatalogConfig;
//! use somethink_retriever::retrieval::extractor::PlainTextExtractor;
//! use somethink_retriever::retrieval::indexing_engine::Indexer;
//! use somethink_retriever::storage::sqlite_store::SqliteStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> somethink_retriever::error::Result<()> {
//! let config = CatalogConfig::default();
//! let store = Arc::new(SqliteStore::open(std::path::Path::new("catalog.db")).await?);
//! let indexer = Indexer::new(store, Arc::new(PlainTextExtractor::default()), &config)?;
//!
//! indexer.start(vec!["/home/me/Documents".into()])?;
//! if let Some(report) = indexer.wait_for_completion().await {
//!     println!("{}/{} files processed", report.succeeded, report.total);
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::extractor::ContentExtractor;
use super::file_scanner::{FileCandidate, FileScanner};
use super::indexing_state::{AtomicIndexingState, IndexingState};
use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};
use crate::status::{IndexHealth, IndexStatus};
use crate::storage::{CatalogStore, FileId, NewFile};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Done,
    Failed,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Done => write!(f, "done"),
            RunOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// Summary of one indexing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Candidates handled without error, unchanged ones included
    pub succeeded: usize,
    /// Candidates found by the scan
    pub total: usize,
    /// Roots that could not be opened
    pub failed_roots: usize,
    /// Reason for a failed run
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Done
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexingEvent {
    Progress {
        current: usize,
        total: usize,
        message: String,
    },
    Completed(RunReport),
}

/// Result of [`Indexer::update_single`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The record was written
    Indexed(FileId),
    /// The stored record is already current
    Unchanged,
    /// The file no longer exists and its record was deleted
    Removed,
    /// Unsupported type, not a regular file, or missing with no record
    Skipped,
}

struct IndexerInner {
    store: Arc<dyn CatalogStore>,
    extractor: Arc<dyn ContentExtractor>,
    scanner: FileScanner,
    state: AtomicIndexingState,
    state_tx: watch::Sender<IndexingState>,
    last_run: watch::Sender<Option<RunReport>>,
    events_tx: flume::Sender<IndexingEvent>,
    events_rx: flume::Receiver<IndexingEvent>,
}

/// Crawls roots and writes file records into the catalog. Cheap to clone.
#[derive(Clone)]
pub struct Indexer {
    inner: Arc<IndexerInner>,
}

impl fmt::Debug for Indexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Indexer")
            .field("state", &self.inner.state.load())
            .field("scanner", &self.inner.scanner)
            .finish_non_exhaustive()
    }
}

impl Indexer {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        extractor: Arc<dyn ContentExtractor>,
        config: &CatalogConfig,
    ) -> Result<Self> {
        let scanner = FileScanner::new(&config.exclude_patterns)?;
        let (events_tx, events_rx) = flume::bounded(config.event_capacity.max(1));
        let (state_tx, _) = watch::channel(IndexingState::Idle);
        let (last_run, _) = watch::channel(None);

        Ok(Self {
            inner: Arc::new(IndexerInner {
                store,
                extractor,
                scanner,
                state: AtomicIndexingState::default(),
                state_tx,
                last_run,
                events_tx,
                events_rx,
            }),
        })
    }

    /// Begin a run over `roots` on the current Tokio runtime.
    ///
    /// Returns as soon as the run is spawned. Fails with
    /// [`CatalogError::ConcurrentRunRejected`] unless the indexer is idle.
    pub fn start(&self, roots: Vec<PathBuf>) -> Result<()> {
        self.inner
            .state
            .transition(IndexingState::Idle, IndexingState::Scanning)
            .map_err(|state| CatalogError::ConcurrentRunRejected { state })?;
        self.inner.state_tx.send_replace(IndexingState::Scanning);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.run(roots).await });
        Ok(())
    }

    pub fn state(&self) -> IndexingState {
        self.inner.state.load()
    }

    /// Receiver for progress and completion events.
    ///
    /// All receivers share one queue, so each event reaches one of them.
    pub fn events(&self) -> flume::Receiver<IndexingEvent> {
        self.inner.events_rx.clone()
    }

    /// Subscribe to state changes.
    pub fn watch_state(&self) -> watch::Receiver<IndexingState> {
        self.inner.state_tx.subscribe()
    }

    /// Wait until no run is active and return the latest report.
    ///
    /// Returns immediately when the indexer is already idle.
    pub async fn wait_for_completion(&self) -> Option<RunReport> {
        let mut state = self.inner.state_tx.subscribe();
        // the sender lives in `inner`, so this only fails if we are dropped
        let _ = state.wait_for(|s| *s == IndexingState::Idle).await;
        self.last_run()
    }

    pub fn last_run(&self) -> Option<RunReport> {
        self.inner.last_run.borrow().clone()
    }

    /// Re-index one file outside of a run.
    ///
    /// Applies the same freshness rule as a run. A file that no longer exists
    /// has its record removed.
    pub async fn update_single(&self, path: &Path) -> Result<UpdateOutcome> {
        let path = std::path::absolute(path)?;
        match FileCandidate::from_path(&path) {
            Ok(Some(candidate)) => self.inner.index_candidate(&candidate).await,
            Ok(None) => Ok(UpdateOutcome::Skipped),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let Some(key) = path.to_str() else {
                    return Ok(UpdateOutcome::Skipped);
                };
                if self.inner.store.delete_file_by_path(key).await? {
                    info!("Removed vanished file {}", key);
                    Ok(UpdateOutcome::Removed)
                } else {
                    Ok(UpdateOutcome::Skipped)
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the record for `path`, whether or not the file still exists.
    pub async fn remove(&self, path: &Path) -> Result<bool> {
        let path = std::path::absolute(path)?;
        let key = path
            .to_str()
            .ok_or_else(|| CatalogError::validation(format!("non UTF-8 path {}", path.display())))?;
        self.inner.store.delete_file_by_path(key).await
    }

    pub async fn status(&self) -> IndexStatus {
        let health = IndexHealth::check(self.inner.store.as_ref()).await;
        let stats = match self.inner.store.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Failed to read catalog stats: {}", e);
                Default::default()
            }
        };

        IndexStatus {
            state: self.state(),
            last_run: self.last_run(),
            stats,
            health,
            model: None,
        }
    }
}

impl IndexerInner {
    async fn run(&self, roots: Vec<PathBuf>) {
        let started_at = Utc::now();
        info!("Starting indexing run over {} roots", roots.len());

        let (outcome, succeeded, total, failed_roots, error) = self.execute(&roots).await;
        let report = RunReport {
            outcome,
            succeeded,
            total,
            failed_roots,
            error,
            started_at,
            finished_at: Utc::now(),
        };

        match &report.error {
            Some(reason) => error!("Indexing run failed: {}", reason),
            None => info!(
                "Indexing run finished: {}/{} files processed",
                report.succeeded, report.total
            ),
        }

        let terminal = match report.outcome {
            RunOutcome::Done => IndexingState::Done,
            RunOutcome::Failed => IndexingState::Failed,
        };
        self.last_run.send_replace(Some(report.clone()));
        self.set_state(terminal);
        // queued before idle so that waiters always find it
        self.publish(IndexingEvent::Completed(report));
        self.set_state(IndexingState::Idle);
    }

    async fn execute(
        &self,
        roots: &[PathBuf],
    ) -> (RunOutcome, usize, usize, usize, Option<String>) {
        let scan = self.scanner.scan(roots).await;
        let total = scan.candidates.len();

        if !roots.is_empty() && scan.failed_roots == roots.len() {
            return (
                RunOutcome::Failed,
                0,
                total,
                scan.failed_roots,
                Some(format!("none of the {} roots could be opened", roots.len())),
            );
        }
        if let Err(e) = self.store.health_check().await {
            return (
                RunOutcome::Failed,
                0,
                total,
                scan.failed_roots,
                Some(format!("catalog store unavailable: {e}")),
            );
        }

        self.set_state(IndexingState::Upserting);
        let mut succeeded = 0;
        for (index, candidate) in scan.candidates.iter().enumerate() {
            match self.index_candidate(candidate).await {
                Ok(outcome) => {
                    debug!("{}: {:?}", candidate.path.display(), outcome);
                    succeeded += 1;
                }
                Err(e) => warn!("Failed to index {}: {}", candidate.path.display(), e),
            }
            self.publish(IndexingEvent::Progress {
                current: index + 1,
                total,
                message: candidate.filename.clone(),
            });
        }

        (RunOutcome::Done, succeeded, total, scan.failed_roots, None)
    }

    async fn index_candidate(&self, candidate: &FileCandidate) -> Result<UpdateOutcome> {
        let path = candidate.path_str().ok_or_else(|| {
            CatalogError::validation(format!("non UTF-8 path {}", candidate.path.display()))
        })?;

        if let Some(existing) = self.store.get_file_by_path(path).await? {
            if existing.modified_time >= candidate.modified {
                return Ok(UpdateOutcome::Unchanged);
            }
        }

        let content_text = match self.extractor.extract(candidate).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Extraction failed, storing empty text: {}", e);
                String::new()
            }
        };

        let id = self
            .store
            .upsert_file(&NewFile {
                path: path.to_string(),
                filename: candidate.filename.clone(),
                extension: candidate.extension.clone(),
                file_type: candidate.file_type,
                size: candidate.size,
                modified_time: candidate.modified,
                created_time: candidate.created,
                content_text,
            })
            .await?;
        Ok(UpdateOutcome::Indexed(id))
    }

    /// Watchers see the change before `start` can win the next transition,
    /// so a late `Idle` never overwrites a new run's `Scanning`.
    fn set_state(&self, state: IndexingState) {
        self.state_tx.send_replace(state);
        self.state.store(state);
    }

    fn publish(&self, event: IndexingEvent) {
        let mut event = event;
        loop {
            match self.events_tx.try_send(event) {
                Ok(()) => return,
                Err(flume::TrySendError::Full(rejected)) => {
                    if matches!(rejected, IndexingEvent::Progress { .. }) {
                        return;
                    }
                    // make room for the completion event
                    let _ = self.events_rx.try_recv();
                    event = rejected;
                }
                Err(flume::TrySendError::Disconnected(_)) => return,
            }
        }
    }
}
