//! Work queue access
//!
//! The `work_items` table is populated by the upstream extraction stage. The
//! pipeline reads unprocessed rows and marks confirmed successes, nothing
//! else. Rows are never deleted and failures are never marked.

use libsql::{params, Connection, Row};
use tracing::instrument;

use crate::store::error::DbError;
use crate::store::WorkItem;

/// Read/mark access to the inbound work queue.
#[derive(Clone)]
pub struct WorkQueue {
    conn: Connection,
}

impl WorkQueue {
    /// Open the queue database and verify the `work_items` table exists.
    ///
    /// A missing table means the extraction stage has not run; that is an
    /// initialization error, not something to paper over with CREATE TABLE.
    pub async fn open(path: &str) -> Result<Self, DbError> {
        let conn = super::connect(path).await?;
        let queue = Self { conn };
        queue.verify_table().await?;
        Ok(queue)
    }

    async fn verify_table(&self) -> Result<(), DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT name FROM sqlite_master WHERE type='table' AND name='work_items'",
                params![],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to inspect queue schema: {}", e)))?;

        match rows.next().await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(DbError::Schema(
                "work_items table not found; run the extraction stage first".to_string(),
            )),
            Err(e) => Err(DbError::Query(format!(
                "Failed to inspect queue schema: {}",
                e
            ))),
        }
    }

    /// Fetch up to `limit` unprocessed work items, oldest rows first.
    #[instrument(skip(self))]
    pub async fn fetch_unprocessed(&self, limit: usize) -> Result<Vec<WorkItem>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT record_id, session_id, created_at, text, kind, processed
                 FROM work_items
                 WHERE processed = 0
                 ORDER BY rowid
                 LIMIT ?",
                params![limit as i64],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to fetch work items: {}", e)))?;

        let mut items = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            items.push(row_to_item(&row)?);
        }
        Ok(items)
    }

    /// Count unprocessed work items.
    pub async fn count_unprocessed(&self) -> Result<usize, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM work_items WHERE processed = 0",
                params![],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to count work items: {}", e)))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(0),
            Err(e) => return Err(DbError::Data(format!("Failed to read queue count: {}", e))),
        };

        let count: i64 = row
            .get(0)
            .map_err(|e| DbError::Data(format!("Failed to read queue count: {}", e)))?;
        Ok(count as usize)
    }

    /// Mark the given record ids as processed. Only confirmed embedding
    /// successes belong here.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn mark_processed(&self, ids: &[String]) -> Result<(), DbError> {
        for id in ids {
            self.conn
                .execute(
                    "UPDATE work_items SET processed = 1 WHERE record_id = ?",
                    params![id.clone()],
                )
                .await
                .map_err(|e| DbError::Query(format!("Failed to mark {} processed: {}", id, e)))?;
        }
        Ok(())
    }

    /// Create the queue table and insert items. Test/demo seeding only; in
    /// production the extraction stage owns this table.
    pub async fn seed(path: &str, items: &[WorkItem]) -> Result<Self, DbError> {
        let conn = super::connect(path).await?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS work_items (
                record_id TEXT PRIMARY KEY,
                session_id TEXT,
                created_at TEXT,
                text TEXT,
                kind TEXT,
                processed INTEGER DEFAULT 0
            )",
            params![],
        )
        .await
        .map_err(|e| DbError::Schema(format!("Failed to create work_items table: {}", e)))?;

        for item in items {
            conn.execute(
                "INSERT OR IGNORE INTO work_items (record_id, session_id, created_at, text, kind, processed)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    item.record_id.clone(),
                    item.session_id.clone(),
                    item.created_at.clone(),
                    item.text.clone(),
                    item.kind.clone(),
                    item.processed as i64,
                ],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to seed work item: {}", e)))?;
        }

        Ok(Self { conn })
    }
}

fn row_to_item(row: &Row) -> Result<WorkItem, DbError> {
    let processed: i64 = row
        .get(5)
        .map_err(|e| DbError::Data(format!("Failed to get processed: {}", e)))?;

    Ok(WorkItem {
        record_id: row
            .get(0)
            .map_err(|e| DbError::Data(format!("Failed to get record_id: {}", e)))?,
        session_id: row
            .get(1)
            .map_err(|e| DbError::Data(format!("Failed to get session_id: {}", e)))?,
        created_at: row
            .get(2)
            .map_err(|e| DbError::Data(format!("Failed to get created_at: {}", e)))?,
        text: row
            .get(3)
            .map_err(|e| DbError::Data(format!("Failed to get text: {}", e)))?,
        kind: row
            .get(4)
            .map_err(|e| DbError::Data(format!("Failed to get kind: {}", e)))?,
        processed: processed != 0,
    })
}
