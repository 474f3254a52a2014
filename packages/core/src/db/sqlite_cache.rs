//! libsql-backed Local Cache
//!
//! Stores page mirrors and queued operations in an embedded SQLite-compatible
//! database file. Each logical store has its own table and its own schema
//! version in `store_versions`, so stores evolve independently:
//!
//! - `pages` - page mirrors; disposable, rebuilt when its version changes
//! - `pending_operations` - queued mutations, ordered by timestamp then `seq`
//! - `failed_operations` - operations that will not be retried automatically
//!
//! Every libsql failure surfaces as [`CacheError::StorageUnavailable`].

use crate::db::{CacheError, LocalCache};
use crate::models::{CachedPage, FailedOperation, QueuedOperation};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Builder, Connection, Database};
use std::path::PathBuf;
use std::sync::Arc;

const PAGES_STORE: &str = "pages";
const PENDING_STORE: &str = "pending_operations";
const FAILED_STORE: &str = "failed_operations";

/// Current schema version of each store
const STORE_VERSIONS: [(&str, i64); 3] = [(PAGES_STORE, 1), (PENDING_STORE, 1), (FAILED_STORE, 1)];

fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    // fixed width so text ordering matches time ordering
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// [`LocalCache`] persisted with libsql
#[derive(Debug, Clone)]
pub struct SqliteCache {
    db: Arc<Database>,
    db_path: PathBuf,
}

impl SqliteCache {
    /// Open (or create) the cache database at `db_path` and initialise its stores
    pub async fn open(db_path: PathBuf) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CacheError::storage_unavailable(format!(
                        "Failed to create cache directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let db = Builder::new_local(&db_path).build().await.map_err(|e| {
            CacheError::storage_unavailable(format!(
                "Failed to open cache at {}: {}",
                db_path.display(),
                e
            ))
        })?;

        let cache = Self {
            db: Arc::new(db),
            db_path,
        };
        cache.initialize_schema().await?;

        tracing::debug!(path = %cache.db_path.display(), "Local cache opened");
        Ok(cache)
    }

    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Connection with a busy timeout so concurrent writers wait instead of failing
    async fn connect(&self) -> Result<Connection, CacheError> {
        let conn = self.db.connect()?;
        Self::execute_pragma(&conn, "PRAGMA busy_timeout = 5000").await?;
        Ok(conn)
    }

    /// PRAGMA statements return rows, so they go through `query`
    async fn execute_pragma(conn: &Connection, pragma: &str) -> Result<(), CacheError> {
        let mut rows = conn.query(pragma, ()).await.map_err(|e| {
            CacheError::storage_unavailable(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        while rows.next().await?.is_some() {}
        Ok(())
    }

    async fn initialize_schema(&self) -> Result<(), CacheError> {
        let conn = self.connect().await?;
        Self::execute_pragma(&conn, "PRAGMA journal_mode = WAL").await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS store_versions (
                store TEXT PRIMARY KEY,
                version INTEGER NOT NULL
            )",
            (),
        )
        .await?;

        for (store, version) in STORE_VERSIONS {
            match Self::stored_version(&conn, store).await? {
                Some(found) if found == version => {}
                Some(found) if store == PAGES_STORE => {
                    tracing::info!(store, found, version, "Rebuilding page mirror store");
                    conn.execute("DROP TABLE IF EXISTS pages", ()).await?;
                }
                Some(found) => {
                    return Err(CacheError::storage_unavailable(format!(
                        "Store '{}' has unsupported schema version {} (expected {})",
                        store, found, version
                    )));
                }
                None => {}
            }
            Self::create_store(&conn, store).await?;
            conn.execute(
                "INSERT OR REPLACE INTO store_versions (store, version) VALUES (?, ?)",
                (store, version),
            )
            .await?;
        }

        Ok(())
    }

    async fn stored_version(conn: &Connection, store: &str) -> Result<Option<i64>, CacheError> {
        let mut rows = conn
            .query("SELECT version FROM store_versions WHERE store = ?", [store])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<i64>(0)?)),
            None => Ok(None),
        }
    }

    async fn create_store(conn: &Connection, store: &str) -> Result<(), CacheError> {
        match store {
            PAGES_STORE => {
                conn.execute(
                    "CREATE TABLE IF NOT EXISTS pages (
                        id TEXT PRIMARY KEY,
                        workspace_id TEXT NOT NULL,
                        updated_at TEXT NOT NULL,
                        data TEXT NOT NULL
                    )",
                    (),
                )
                .await?;
                conn.execute(
                    "CREATE INDEX IF NOT EXISTS idx_pages_workspace ON pages(workspace_id, updated_at)",
                    (),
                )
                .await?;
            }
            PENDING_STORE => {
                conn.execute(
                    "CREATE TABLE IF NOT EXISTS pending_operations (
                        seq INTEGER PRIMARY KEY AUTOINCREMENT,
                        id TEXT NOT NULL UNIQUE,
                        kind TEXT NOT NULL,
                        timestamp TEXT NOT NULL,
                        retry_count INTEGER NOT NULL DEFAULT 0,
                        page_id TEXT,
                        block_id TEXT,
                        data TEXT NOT NULL
                    )",
                    (),
                )
                .await?;
            }
            FAILED_STORE => {
                conn.execute(
                    "CREATE TABLE IF NOT EXISTS failed_operations (
                        id TEXT PRIMARY KEY,
                        kind TEXT NOT NULL,
                        failed_at TEXT NOT NULL,
                        error TEXT NOT NULL,
                        data TEXT NOT NULL
                    )",
                    (),
                )
                .await?;
            }
            other => {
                return Err(CacheError::storage_unavailable(format!(
                    "Unknown store '{}'",
                    other
                )))
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LocalCache for SqliteCache {
    async fn save_page(&self, page: &CachedPage) -> Result<(), CacheError> {
        let conn = self.connect().await?;
        let data = serde_json::to_string(page)?;
        conn.execute(
            "INSERT OR REPLACE INTO pages (id, workspace_id, updated_at, data) VALUES (?, ?, ?, ?)",
            (
                page.id(),
                page.workspace_id(),
                format_timestamp(&page.page.updated_at),
                data,
            ),
        )
        .await?;
        Ok(())
    }

    async fn get_page(&self, page_id: &str) -> Result<Option<CachedPage>, CacheError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query("SELECT data FROM pages WHERE id = ?", [page_id])
            .await?;
        match rows.next().await? {
            Some(row) => {
                let data: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn list_pages_by_workspace(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<CachedPage>, CacheError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT data FROM pages WHERE workspace_id = ? ORDER BY updated_at DESC, id ASC",
                [workspace_id],
            )
            .await?;

        let mut pages = Vec::new();
        while let Some(row) = rows.next().await? {
            let data: String = row.get(0)?;
            pages.push(serde_json::from_str(&data)?);
        }
        Ok(pages)
    }

    async fn delete_page(&self, page_id: &str) -> Result<(), CacheError> {
        let conn = self.connect().await?;
        conn.execute("DELETE FROM pages WHERE id = ?", [page_id])
            .await?;
        Ok(())
    }

    async fn enqueue_operation(&self, operation: &QueuedOperation) -> Result<(), CacheError> {
        let conn = self.connect().await?;
        let data = serde_json::to_string(operation)?;
        conn.execute(
            "INSERT INTO pending_operations (id, kind, timestamp, retry_count, page_id, block_id, data)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                operation.id.as_str(),
                operation.kind().as_str(),
                format_timestamp(&operation.timestamp),
                operation.retry_count as i64,
                operation.page_id(),
                operation.block_id(),
                data,
            ),
        )
        .await?;
        Ok(())
    }

    async fn list_pending_operations(&self) -> Result<Vec<QueuedOperation>, CacheError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT data, retry_count FROM pending_operations ORDER BY timestamp ASC, seq ASC",
                (),
            )
            .await?;

        let mut operations = Vec::new();
        while let Some(row) = rows.next().await? {
            let data: String = row.get(0)?;
            let retry_count: i64 = row.get(1)?;
            let mut operation: QueuedOperation = serde_json::from_str(&data)?;
            // the column is authoritative, the JSON copy is written once
            operation.retry_count = retry_count.max(0) as u32;
            operations.push(operation);
        }
        Ok(operations)
    }

    async fn increment_retry(&self, operation_id: &str) -> Result<u32, CacheError> {
        let conn = self.connect().await?;
        let updated = conn
            .execute(
                "UPDATE pending_operations SET retry_count = retry_count + 1 WHERE id = ?",
                [operation_id],
            )
            .await?;
        if updated == 0 {
            return Err(CacheError::NotFound(operation_id.to_string()));
        }

        let mut rows = conn
            .query(
                "SELECT retry_count FROM pending_operations WHERE id = ?",
                [operation_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)?.max(0) as u32),
            None => Err(CacheError::NotFound(operation_id.to_string())),
        }
    }

    async fn remove_operation(&self, operation_id: &str) -> Result<(), CacheError> {
        let conn = self.connect().await?;
        conn.execute(
            "DELETE FROM pending_operations WHERE id = ?",
            [operation_id],
        )
        .await?;
        Ok(())
    }

    async fn move_to_failed(&self, failed: &FailedOperation) -> Result<(), CacheError> {
        let conn = self.connect().await?;
        let data = serde_json::to_string(failed)?;

        let tx = conn.transaction().await?;
        tx.execute(
            "INSERT OR REPLACE INTO failed_operations (id, kind, failed_at, error, data)
             VALUES (?, ?, ?, ?, ?)",
            (
                failed.id(),
                failed.operation.kind().as_str(),
                format_timestamp(&failed.failed_at),
                failed.error.as_str(),
                data,
            ),
        )
        .await?;
        tx.execute(
            "DELETE FROM pending_operations WHERE id = ?",
            [failed.id()],
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_failed_operations(&self) -> Result<Vec<FailedOperation>, CacheError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT data FROM failed_operations ORDER BY failed_at ASC, id ASC",
                (),
            )
            .await?;

        let mut failed = Vec::new();
        while let Some(row) = rows.next().await? {
            let data: String = row.get(0)?;
            failed.push(serde_json::from_str(&data)?);
        }
        Ok(failed)
    }

    async fn remove_failed_operation(&self, operation_id: &str) -> Result<(), CacheError> {
        let conn = self.connect().await?;
        conn.execute(
            "DELETE FROM failed_operations WHERE id = ?",
            [operation_id],
        )
        .await?;
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), CacheError> {
        let conn = self.connect().await?;
        let tx = conn.transaction().await?;
        tx.execute("DELETE FROM pages", ()).await?;
        tx.execute("DELETE FROM pending_operations", ()).await?;
        tx.execute("DELETE FROM failed_operations", ()).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Block, BlockType, BlockUpdate, Operation, Page, RichTextNode,
    };
    use tempfile::TempDir;

    async fn create_test_cache() -> (SqliteCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("cache.db");
        let cache = SqliteCache::open(db_path).await.unwrap();
        (cache, temp_dir)
    }

    fn update_op(block_id: &str) -> QueuedOperation {
        QueuedOperation::new(Operation::Update {
            block_id: block_id.to_string(),
            update: BlockUpdate::new().with_content(RichTextNode::from_plain("edited")),
            user_id: "user-1".to_string(),
        })
    }

    #[tokio::test]
    async fn test_page_mirror_round_trip() {
        let (cache, _temp) = create_test_cache().await;
        let page = Page::new("page-1", "ws-1", "Notes", "user-1");
        let block = Block::new(
            BlockType::Paragraph,
            "page-1".to_string(),
            None,
            "a0".to_string(),
            RichTextNode::from_plain("hello"),
            "user-1".to_string(),
        );
        let cached = CachedPage::new(page, vec![block]);

        cache.save_page(&cached).await.unwrap();
        let loaded = cache.get_page("page-1").await.unwrap().unwrap();
        assert_eq!(loaded, cached);

        let listed = cache.list_pages_by_workspace("ws-1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(cache
            .list_pages_by_workspace("ws-2")
            .await
            .unwrap()
            .is_empty());

        cache.delete_page("page-1").await.unwrap();
        assert!(cache.get_page("page-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pending_operations_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("cache.db");

        let first = update_op("b-1");
        let second = update_op("b-2");
        {
            let cache = SqliteCache::open(db_path.clone()).await.unwrap();
            cache.enqueue_operation(&first).await.unwrap();
            cache.enqueue_operation(&second).await.unwrap();
            assert_eq!(cache.increment_retry(&first.id).await.unwrap(), 1);
        }

        let reopened = SqliteCache::open(db_path).await.unwrap();
        let pending = reopened.list_pending_operations().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, first.id);
        assert_eq!(pending[0].retry_count, 1);
        assert_eq!(pending[1].id, second.id);
        assert_eq!(pending[1].operation, second.operation);
    }

    #[tokio::test]
    async fn test_same_timestamp_keeps_enqueue_order() {
        let (cache, _temp) = create_test_cache().await;
        let mut ops: Vec<QueuedOperation> = (0..5).map(|i| update_op(&format!("b-{}", i))).collect();
        let stamp = ops[0].timestamp;
        for op in ops.iter_mut() {
            op.timestamp = stamp;
        }
        for op in &ops {
            cache.enqueue_operation(op).await.unwrap();
        }

        let pending = cache.list_pending_operations().await.unwrap();
        let ids: Vec<_> = pending.iter().map(|op| op.id.clone()).collect();
        let expected: Vec<_> = ops.iter().map(|op| op.id.clone()).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_move_to_failed_is_atomic_transfer() {
        let (cache, _temp) = create_test_cache().await;
        let op = update_op("b-1");
        cache.enqueue_operation(&op).await.unwrap();

        cache
            .move_to_failed(&FailedOperation::new(op.clone(), "permission-denied"))
            .await
            .unwrap();

        assert!(cache.list_pending_operations().await.unwrap().is_empty());
        let failed = cache.list_failed_operations().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].operation, op);

        cache.remove_failed_operation(&op.id).await.unwrap();
        assert!(cache.list_failed_operations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_increment_retry_missing_operation() {
        let (cache, _temp) = create_test_cache().await;
        assert!(matches!(
            cache.increment_retry("missing").await,
            Err(CacheError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_clear_all_empties_every_store() {
        let (cache, _temp) = create_test_cache().await;
        cache
            .save_page(&CachedPage::new(Page::new("p", "ws", "t", "u"), Vec::new()))
            .await
            .unwrap();
        cache.enqueue_operation(&update_op("b")).await.unwrap();

        cache.clear_all().await.unwrap();

        assert!(cache.get_page("p").await.unwrap().is_none());
        assert!(cache.list_pending_operations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_versions_recorded() {
        let (cache, _temp) = create_test_cache().await;
        let conn = cache.connect().await.unwrap();
        for (store, version) in STORE_VERSIONS {
            assert_eq!(
                SqliteCache::stored_version(&conn, store).await.unwrap(),
                Some(version)
            );
        }
    }
}
