//! SQLite implementation of the catalog storage traits
//!
//! One database holds the `files`, `topics` and `metadata` tables plus the FTS5
//! table `files_fts(filename, content_text)`, whose `rowid` mirrors `files.id`.
//!
//! ## Write path
//!
//! All writes take the store's writer lock and run in a single transaction.
//! An upsert writes the file row, drops the old shadow entry and inserts the
//! new one before committing; a delete removes the shadow entry, the metadata
//! and the row together.
//!
//! ## Full-text queries
//!
//! User text is never handed to FTS5 verbatim. [`fts_match_expression`] keeps
//! the whitespace separated tokens that contain at least one alphanumeric
//! character, quotes each one and marks it as a prefix, so `rust bor` becomes
//! `"rust"* "bor"*` (implicit AND). Results are ordered by `bm25` and then by
//! id ascending.
//!
//! ## Usage
//!
//! ```no_run
//! use somethink_retriever::storage::{FileStore, sqlite_store::SqliteStore};
//!
//! # async fn example() -> somethink_retriever::error::Result<()> {
//! let store = SqliteStore::open(std::path::Path::new("catalog.db")).await?;
//! for record in store.search_text("quarterly report", 10).await? {
//!     println!("{}", record.path);
//! }
//! # Ok(())
//! # }
//! ```

use super::{
    CatalogStore, FileId, FileRecord, FileStore, FileType, NewFile, OUTLIER_TOPIC_ID, StoreStats,
    Topic, TopicId, TopicPlacement, TopicStore,
};
use crate::error::{CatalogError, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// SQLite-backed catalog. See module docs for the write and query model.
#[derive(Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
    /// Serializes every write transaction
    writer: Mutex<()>,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens (or creates) a persistent catalog at `db_path`.
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(db_path)
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal)
                    .busy_timeout(Duration::from_secs(5))
                    .foreign_keys(true)
                    .create_if_missing(true),
            )
            .await?;

        info!("Opened catalog database at {}", db_path.display());
        Self::new_with_pool(pool, Some(db_path.to_path_buf())).await
    }

    /// Opens an in-memory catalog for tests.
    ///
    /// Each SQLite memory connection is its own database, so the pool holds
    /// exactly one connection and never recycles it.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true))
            .await?;
        Self::new_with_pool(pool, None).await
    }

    async fn new_with_pool(pool: SqlitePool, db_path: Option<PathBuf>) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self {
            pool,
            writer: Mutex::new(()),
            db_path,
        })
    }

    /// Location of the database file, `None` when in memory.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS topics (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                keywords TEXT NOT NULL DEFAULT '[]',
                representative_docs TEXT NOT NULL DEFAULT '[]',
                created_time TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT UNIQUE NOT NULL,
                filename TEXT NOT NULL,
                extension TEXT NOT NULL DEFAULT '',
                file_type TEXT NOT NULL,
                size INTEGER NOT NULL,
                modified_time TIMESTAMP NOT NULL,
                created_time TIMESTAMP NOT NULL,
                content_text TEXT NOT NULL DEFAULT '',
                topic_id INTEGER REFERENCES topics(id) ON DELETE SET NULL,
                embedding_ref TEXT,
                indexed_time TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metadata (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                CONSTRAINT unique_metadata_key UNIQUE(file_id, key)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE IF NOT EXISTS files_fts USING fts5(
                filename,
                content_text,
                tokenize = 'unicode61 remove_diacritics 2'
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_topic ON files(topic_id)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_type ON files(file_type)")
            .execute(pool)
            .await?;

        Ok(())
    }

    fn row_to_file(row: &SqliteRow) -> Result<FileRecord> {
        let file_type: String = row.try_get("file_type")?;
        let size: i64 = row.try_get("size")?;
        Ok(FileRecord {
            id: row.try_get("id")?,
            path: row.try_get("path")?,
            filename: row.try_get("filename")?,
            extension: row.try_get("extension")?,
            file_type: file_type.parse().unwrap_or(FileType::Unknown),
            size: u64::try_from(size).unwrap_or(0),
            modified_time: row.try_get("modified_time")?,
            created_time: row.try_get("created_time")?,
            content_text: row.try_get("content_text")?,
            topic_id: row.try_get("topic_id")?,
            embedding_ref: row.try_get("embedding_ref")?,
            indexed_time: row.try_get("indexed_time")?,
        })
    }

    fn row_to_topic(row: &SqliteRow) -> Result<Topic> {
        let keywords: String = row.try_get("keywords")?;
        let representative_docs: String = row.try_get("representative_docs")?;
        Ok(Topic {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            keywords: serde_json::from_str(&keywords)?,
            representative_docs: serde_json::from_str(&representative_docs)?,
            created_time: row.try_get("created_time")?,
        })
    }

    /// Removes the shadow entry, the metadata and the row of one file.
    async fn delete_rows(conn: &mut SqliteConnection, id: FileId) -> Result<bool> {
        sqlx::query("DELETE FROM files_fts WHERE rowid = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM metadata WHERE file_id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        let result = sqlx::query("DELETE FROM files WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_topic(conn: &mut SqliteConnection, topic: &Topic) -> Result<()> {
        topic.validate()?;
        sqlx::query(
            r#"
            INSERT INTO topics (id, name, keywords, representative_docs, created_time)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                keywords = excluded.keywords,
                representative_docs = excluded.representative_docs,
                created_time = excluded.created_time
            "#,
        )
        .bind(topic.id)
        .bind(&topic.name)
        .bind(serde_json::to_string(&topic.keywords)?)
        .bind(serde_json::to_string(&topic.representative_docs)?)
        .bind(topic.created_time)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

/// Turns free user text into a safe FTS5 MATCH expression.
///
/// Returns `None` when no token survives, in which case nothing can match.
pub fn fts_match_expression(term: &str) -> Option<String> {
    let tokens: Vec<String> = term
        .split_whitespace()
        .filter(|token| token.chars().any(char::is_alphanumeric))
        .map(|token| format!("\"{}\"*", token.replace('"', "\"\"")))
        .collect();

    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl FileStore for SqliteStore {
    async fn upsert_file(&self, file: &NewFile) -> Result<FileId> {
        file.validate()?;

        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;

        // topic_id, embedding_ref and indexed_time survive the update
        let id: FileId = sqlx::query_scalar(
            r#"
            INSERT INTO files (
                path, filename, extension, file_type, size,
                modified_time, created_time, content_text, indexed_time
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(path) DO UPDATE SET
                filename = excluded.filename,
                extension = excluded.extension,
                file_type = excluded.file_type,
                size = excluded.size,
                modified_time = excluded.modified_time,
                created_time = excluded.created_time,
                content_text = excluded.content_text
            RETURNING id
            "#,
        )
        .bind(&file.path)
        .bind(&file.filename)
        .bind(&file.extension)
        .bind(file.file_type.as_str())
        .bind(i64::try_from(file.size).unwrap_or(i64::MAX))
        .bind(file.modified_time)
        .bind(file.created_time)
        .bind(&file.content_text)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM files_fts WHERE rowid = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO files_fts (rowid, filename, content_text) VALUES (?1, ?2, ?3)")
            .bind(id)
            .bind(&file.filename)
            .bind(&file.content_text)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!("Upserted {} as file {}", file.path, id);
        Ok(id)
    }

    async fn get_file(&self, id: FileId) -> Result<Option<FileRecord>> {
        let row = sqlx::query("SELECT * FROM files WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_file).transpose()
    }

    async fn get_file_by_path(&self, path: &str) -> Result<Option<FileRecord>> {
        let row = sqlx::query("SELECT * FROM files WHERE path = ?1")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_file).transpose()
    }

    async fn search_text(&self, term: &str, limit: usize) -> Result<Vec<FileRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let Some(expression) = fts_match_expression(term) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT f.*
            FROM files_fts
            JOIN files f ON f.id = files_fts.rowid
            WHERE files_fts MATCH ?1
            ORDER BY bm25(files_fts), f.id ASC
            LIMIT ?2
            "#,
        )
        .bind(&expression)
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;

        debug!(
            "Full-text query {:?} matched {} records",
            expression,
            rows.len()
        );
        rows.iter().map(Self::row_to_file).collect()
    }

    async fn set_topic(
        &self,
        file_id: FileId,
        topic_id: Option<TopicId>,
        embedding_ref: Option<&str>,
    ) -> Result<bool> {
        let topic_id = topic_id.filter(|id| *id != OUTLIER_TOPIC_ID);

        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("UPDATE files SET topic_id = ?1, embedding_ref = ?2 WHERE id = ?3")
            .bind(topic_id)
            .bind(embedding_ref)
            .bind(file_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_all(&self) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query("SELECT * FROM files ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_file).collect()
    }

    async fn list_without_topic(&self) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query("SELECT * FROM files WHERE topic_id IS NULL ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_file).collect()
    }

    async fn list_by_topic(&self, topic_id: TopicId, limit: usize) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query("SELECT * FROM files WHERE topic_id = ?1 ORDER BY id LIMIT ?2")
            .bind(topic_id)
            .bind(limit_param(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_file).collect()
    }

    async fn delete_file(&self, id: FileId) -> Result<bool> {
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        let deleted = Self::delete_rows(&mut tx, id).await?;
        tx.commit().await?;

        if deleted {
            debug!("Deleted file {}", id);
        }
        Ok(deleted)
    }

    async fn delete_file_by_path(&self, path: &str) -> Result<bool> {
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;

        let id: Option<FileId> = sqlx::query_scalar("SELECT id FROM files WHERE path = ?1")
            .bind(path)
            .fetch_optional(&mut *tx)
            .await?;
        let deleted = match id {
            Some(id) => Self::delete_rows(&mut tx, id).await?,
            None => false,
        };
        tx.commit().await?;

        if deleted {
            debug!("Deleted {}", path);
        }
        Ok(deleted)
    }

    async fn set_metadata(&self, file_id: FileId, key: &str, value: &str) -> Result<bool> {
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;

        let exists: Option<FileId> = sqlx::query_scalar("SELECT id FROM files WHERE id = ?1")
            .bind(file_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO metadata (file_id, key, value) VALUES (?1, ?2, ?3)
            ON CONFLICT(file_id, key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(file_id)
        .bind(key)
        .bind(value)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn get_metadata(&self, file_id: FileId) -> Result<BTreeMap<String, String>> {
        let rows = sqlx::query("SELECT key, value FROM metadata WHERE file_id = ?1")
            .bind(file_id)
            .fetch_all(&self.pool)
            .await?;

        let mut metadata = BTreeMap::new();
        for row in rows {
            metadata.insert(row.try_get("key")?, row.try_get("value")?);
        }
        Ok(metadata)
    }
}

#[async_trait]
impl TopicStore for SqliteStore {
    async fn upsert_topic(&self, topic: &Topic) -> Result<()> {
        topic.validate()?;

        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        Self::insert_topic(&mut tx, topic).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_topic(&self, id: TopicId) -> Result<Option<Topic>> {
        let row = sqlx::query("SELECT * FROM topics WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_topic).transpose()
    }

    async fn list_topics(&self) -> Result<Vec<Topic>> {
        let rows = sqlx::query("SELECT * FROM topics ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_topic).collect()
    }

    async fn replace_topics(&self, topics: &[Topic]) -> Result<()> {
        self.apply_topic_model(topics, &[]).await
    }

    async fn apply_topic_model(
        &self,
        topics: &[Topic],
        placements: &[TopicPlacement],
    ) -> Result<()> {
        for topic in topics {
            topic.validate()?;
        }
        let known: HashSet<TopicId> = topics.iter().map(|topic| topic.id).collect();

        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE files SET topic_id = NULL WHERE topic_id IS NOT NULL")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM topics").execute(&mut *tx).await?;
        for topic in topics {
            Self::insert_topic(&mut tx, topic).await?;
        }

        // an early return drops `tx`, which rolls the whole swap back
        for placement in placements {
            let topic_id = placement.topic_id.filter(|id| *id != OUTLIER_TOPIC_ID);
            if let Some(id) = topic_id {
                if !known.contains(&id) {
                    return Err(CatalogError::not_found("topic", id.to_string()));
                }
            }
            sqlx::query("UPDATE files SET topic_id = ?1, embedding_ref = ?2 WHERE id = ?3")
                .bind(topic_id)
                .bind(placement.embedding_ref.as_deref())
                .bind(placement.file_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!(
            "Replaced topic set with {} topics and {} placements",
            topics.len(),
            placements.len()
        );
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn stats(&self) -> Result<StoreStats> {
        // one read transaction so the counts agree with each other
        let mut tx = self.pool.begin().await?;

        let total_files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&mut *tx)
            .await?;
        let total_topics: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM topics")
            .fetch_one(&mut *tx)
            .await?;
        let classified_files: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE topic_id IS NOT NULL")
                .fetch_one(&mut *tx)
                .await?;
        let rows = sqlx::query("SELECT file_type, COUNT(*) AS count FROM files GROUP BY file_type")
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        let mut files_by_type = BTreeMap::new();
        for row in rows {
            let file_type: String = row.try_get("file_type")?;
            let count: i64 = row.try_get("count")?;
            *files_by_type
                .entry(file_type.parse().unwrap_or(FileType::Unknown))
                .or_insert(0) += count as usize;
        }

        Ok(StoreStats {
            total_files: total_files as usize,
            total_topics: total_topics as usize,
            files_by_type,
            classified_files: classified_files as usize,
        })
    }

    async fn clear_all(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM files_fts").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM metadata").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM files").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM topics").execute(&mut *tx).await?;
        tx.commit().await?;

        info!("Cleared all catalog records");
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn document(path: &str, content: &str) -> NewFile {
        let filename = path.rsplit('/').next().unwrap_or(path).to_string();
        NewFile {
            path: path.to_string(),
            filename,
            extension: ".txt".to_string(),
            file_type: FileType::Document,
            size: content.len() as u64,
            modified_time: at(1_700_000_000),
            created_time: at(1_700_000_000),
            content_text: content.to_string(),
        }
    }

    #[test]
    fn test_fts_match_expression() {
        assert_eq!(fts_match_expression("rust"), Some("\"rust\"*".to_string()));
        assert_eq!(
            fts_match_expression("  rust   borrow "),
            Some("\"rust\"* \"borrow\"*".to_string())
        );
        // operators and punctuation are quoted, never interpreted
        assert_eq!(
            fts_match_expression("a\"b OR NOT"),
            Some("\"a\"\"b\"* \"OR\"* \"NOT\"*".to_string())
        );
        assert_eq!(fts_match_expression("*** ( )"), None);
        assert_eq!(fts_match_expression("   "), None);
    }

    #[tokio::test]
    async fn test_upsert_preserves_identity_and_classification() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory().await?;
        let id = store.upsert_file(&document("/docs/a.txt", "first draft")).await?;

        store
            .upsert_topic(&Topic::new(7, "drafts", vec!["draft".into()]))
            .await?;
        assert!(store.set_topic(id, Some(7), Some("ref-a")).await?);
        let before = store.get_file(id).await?.unwrap();

        let mut updated = document("/docs/a.txt", "final version");
        updated.modified_time = at(1_700_000_500);
        let second = store.upsert_file(&updated).await?;
        assert_eq!(second, id);

        let after = store.get_file(id).await?.unwrap();
        assert_eq!(after.content_text, "final version");
        assert_eq!(after.modified_time, at(1_700_000_500));
        assert_eq!(after.topic_id, Some(7));
        assert_eq!(after.embedding_ref.as_deref(), Some("ref-a"));
        assert_eq!(after.indexed_time, before.indexed_time);

        assert_eq!(store.list_all().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_shadow_index_follows_updates() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory().await?;
        store.upsert_file(&document("/docs/a.txt", "alpha content")).await?;
        assert_eq!(store.search_text("alpha", 10).await?.len(), 1);

        store.upsert_file(&document("/docs/a.txt", "beta content")).await?;
        assert!(store.search_text("alpha", 10).await?.is_empty());
        assert_eq!(store.search_text("beta", 10).await?.len(), 1);

        assert!(store.delete_file_by_path("/docs/a.txt").await?);
        assert!(store.search_text("beta", 10).await?.is_empty());
        assert!(!store.delete_file_by_path("/docs/a.txt").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_search_matches_filename_and_prefix() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory().await?;
        store
            .upsert_file(&document("/notes/invoice_march.txt", "nothing here"))
            .await?;
        store
            .upsert_file(&document("/notes/other.txt", "the invoices are late"))
            .await?;

        let hits = store.search_text("invoice", 10).await?;
        assert_eq!(hits.len(), 2);

        let hits = store.search_text("inv late", 10).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "/notes/other.txt");

        assert!(store.search_text("invoice", 0).await?.is_empty());
        assert!(store.search_text("\"\" ()", 10).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_search_ties_break_by_id() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory().await?;
        // identical filename length and content give identical bm25 scores
        let c = store.upsert_file(&document("/c/x.txt", "same words")).await?;
        let a = store.upsert_file(&document("/a/x.txt", "same words")).await?;
        let b = store.upsert_file(&document("/b/x.txt", "same words")).await?;

        let ids: Vec<FileId> = store
            .search_text("same", 10)
            .await?
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![c, a, b]);

        let limited = store.search_text("same", 2).await?;
        assert_eq!(limited.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_validation_and_missing_lookups() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory().await?;
        assert!(store.upsert_file(&document("", "x")).await.is_err());
        assert!(store.upsert_file(&document("/a\0b", "x")).await.is_err());

        assert!(store.get_file(42).await?.is_none());
        assert!(store.get_file_by_path("/nope").await?.is_none());
        assert!(!store.delete_file(42).await?);
        assert!(!store.set_topic(42, None, None).await?);
        assert!(!store.set_metadata(42, "k", "v").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_outlier_and_topic_listing() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory().await?;
        let a = store.upsert_file(&document("/a.txt", "one")).await?;
        let b = store.upsert_file(&document("/b.txt", "two")).await?;
        let c = store.upsert_file(&document("/c.txt", "three")).await?;

        store
            .upsert_topic(&Topic::new(0, "numbers", vec!["one".into(), "two".into()]))
            .await?;
        assert!(
            store
                .upsert_topic(&Topic::new(OUTLIER_TOPIC_ID, "noise", vec![]))
                .await
                .is_err()
        );

        store.set_topic(a, Some(0), None).await?;
        store.set_topic(b, Some(0), None).await?;
        store.set_topic(c, Some(OUTLIER_TOPIC_ID), Some("emb")).await?;

        let outlier = store.get_file(c).await?.unwrap();
        assert_eq!(outlier.topic_id, None);
        assert_eq!(outlier.embedding_ref.as_deref(), Some("emb"));

        let ids: Vec<FileId> = store
            .list_by_topic(0, 10)
            .await?
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(store.list_by_topic(0, 1).await?.len(), 1);
        assert_eq!(store.list_without_topic().await?.len(), 1);

        let stats = store.stats().await?;
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.total_topics, 1);
        assert_eq!(stats.classified_files, 2);
        assert_eq!(stats.files_by_type.get(&FileType::Document), Some(&3));
        Ok(())
    }

    #[tokio::test]
    async fn test_apply_topic_model_swaps_topics_and_placements() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory().await?;
        let a = store.upsert_file(&document("/a.txt", "one")).await?;
        let b = store.upsert_file(&document("/b.txt", "two")).await?;
        store.upsert_topic(&Topic::new(5, "old", vec![])).await?;
        store.set_topic(a, Some(5), Some("old-a")).await?;

        let topics = [Topic::new(0, "new", vec!["one".into()])];
        let placements = [
            TopicPlacement {
                file_id: a,
                topic_id: Some(0),
                embedding_ref: Some("emb-a".into()),
            },
            TopicPlacement {
                file_id: b,
                topic_id: Some(OUTLIER_TOPIC_ID),
                embedding_ref: Some("emb-b".into()),
            },
        ];
        store.apply_topic_model(&topics, &placements).await?;

        assert!(store.get_topic(5).await?.is_none());
        let a_record = store.get_file(a).await?.unwrap();
        assert_eq!(a_record.topic_id, Some(0));
        assert_eq!(a_record.embedding_ref.as_deref(), Some("emb-a"));
        let b_record = store.get_file(b).await?.unwrap();
        assert_eq!(b_record.topic_id, None);
        assert_eq!(b_record.embedding_ref.as_deref(), Some("emb-b"));
        assert_eq!(store.stats().await?.classified_files, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_placement_keeps_previous_model() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory().await?;
        let a = store.upsert_file(&document("/a.txt", "one")).await?;
        let b = store.upsert_file(&document("/b.txt", "two")).await?;
        store.upsert_topic(&Topic::new(5, "old", vec![])).await?;
        store.set_topic(a, Some(5), Some("old-a")).await?;
        store.set_topic(b, Some(5), Some("old-b")).await?;

        let topics = [Topic::new(0, "new", vec![])];
        let placements = [
            TopicPlacement {
                file_id: a,
                topic_id: Some(0),
                embedding_ref: Some("emb-a".into()),
            },
            TopicPlacement {
                file_id: b,
                topic_id: Some(42),
                embedding_ref: None,
            },
        ];
        let result = store.apply_topic_model(&topics, &placements).await;
        assert!(matches!(result, Err(CatalogError::NotFound { .. })));

        let remaining: Vec<TopicId> = store.list_topics().await?.iter().map(|t| t.id).collect();
        assert_eq!(remaining, vec![5]);
        for (id, embedding) in [(a, "old-a"), (b, "old-b")] {
            let record = store.get_file(id).await?.unwrap();
            assert_eq!(record.topic_id, Some(5));
            assert_eq!(record.embedding_ref.as_deref(), Some(embedding));
        }
        assert_eq!(store.stats().await?.classified_files, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_replace_topics_clears_assignments() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory().await?;
        let a = store.upsert_file(&document("/a.txt", "one")).await?;
        store.upsert_topic(&Topic::new(3, "old", vec![])).await?;
        store.set_topic(a, Some(3), Some("emb")).await?;

        let fresh = Topic::new(0, "new", vec!["one".into()])
            .with_representative_docs(vec!["/a.txt".into()]);
        store.replace_topics(std::slice::from_ref(&fresh)).await?;

        assert!(store.get_topic(3).await?.is_none());
        let stored = store.get_topic(0).await?.unwrap();
        assert_eq!(stored.keywords, vec!["one".to_string()]);
        assert_eq!(stored.representative_docs, vec!["/a.txt".to_string()]);

        let record = store.get_file(a).await?.unwrap();
        assert_eq!(record.topic_id, None);
        assert_eq!(record.embedding_ref.as_deref(), Some("emb"));
        Ok(())
    }

    #[tokio::test]
    async fn test_metadata_cascades_on_delete() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory().await?;
        let id = store.upsert_file(&document("/a.txt", "one")).await?;

        assert!(store.set_metadata(id, "author", "kim").await?);
        assert!(store.set_metadata(id, "author", "lee").await?);
        assert_eq!(
            store.get_metadata(id).await?.get("author").map(String::as_str),
            Some("lee")
        );

        assert!(store.delete_file(id).await?);
        assert!(store.get_metadata(id).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_all() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory().await?;
        store.upsert_file(&document("/a.txt", "alpha")).await?;
        store.upsert_topic(&Topic::new(1, "t", vec![])).await?;
        store.clear_all().await?;

        assert_eq!(store.stats().await?, StoreStats::default());
        assert!(store.search_text("alpha", 10).await?.is_empty());
        store.health_check().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_persistent_database_reopens() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let db_path = dir.path().join("nested").join("catalog.db");

        let id = {
            let store = SqliteStore::open(&db_path).await?;
            let id = store.upsert_file(&document("/a.txt", "persisted")).await?;
            store.close().await;
            id
        };

        let store = SqliteStore::open(&db_path).await?;
        assert_eq!(store.db_path(), Some(db_path.as_path()));
        let hits = store.search_text("persisted", 5).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
        Ok(())
    }
}
