//! somethink-retriever: a searchable catalog of local files
//!
//! This crate keeps a SQLite catalog of the documents, images, audio and video
//! files under a set of roots, and answers free-text queries with a ranked list
//! that fuses a full-text signal with an optional semantic signal from a
//! [`somethink_topics::TopicProvider`].
//!
//! ## Key Modules
//!
//! - **[`storage`]**: catalog records, storage traits and the SQLite store with
//!   its FTS5 shadow index
//! - **[`retrieval`]**: file scanning, content extraction, the incremental
//!   [`Indexer`](retrieval::indexing_engine::Indexer), the
//!   [`Searcher`](retrieval::searcher::Searcher) and topic synchronisation
//! - **[`config`]**: [`CatalogConfig`](config::CatalogConfig) loaded from TOML
//! - **[`status`]**: indexer and store status snapshots
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use somethink_retriever::{
//!     config::CatalogConfig,
//!     retrieval::{extractor::PlainTextExtractor, indexing_engine::Indexer, searcher::Searcher},
//!     storage::sqlite_store::SqliteStore,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> somethink_retriever::error::Result<()> {
//! let config = CatalogConfig::default();
//! let store = Arc::new(SqliteStore::open(std::path::Path::new("catalog.db")).await?);
//!
//! let indexer = Indexer::new(store.clone(), Arc::new(PlainTextExtractor::default()), &config)?;
//! indexer.start(vec!["/home/me/Documents".into()])?;
//! indexer.wait_for_completion().await;
//!
//! let searcher = Searcher::new(store, None);
//! for hit in searcher.search("tax return", 10, false).await? {
//!     println!("{:.2} {}", hit.score, hit.record.path);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! FileScanner → ContentExtractor → Indexer ──upsert──▶ SqliteStore (files + files_fts)
//!                                                          │
//! TopicProvider ◀── topic_sync ──set_topic─────────────────┤
//!       │                                                  │
//!       └──find_similar──▶ Searcher ◀──search_text─────────┘
//! ```

pub mod config;
pub mod error;
pub mod retrieval;
pub mod status;
pub mod storage;
