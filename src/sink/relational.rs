//! Relational sink
//!
//! An append-mostly projection of successfully embedded records, keyed by
//! the work item's stable identifier. Duplicate-key conflicts are ignored,
//! not errored: reprocessing a record that already landed is a no-op.

use libsql::{params, Connection};
use tracing::instrument;

use crate::store::error::DbError;
use crate::store::VectorRecord;

/// Writer for the `vectors` table.
#[derive(Clone)]
pub struct RelationalSink {
    conn: Connection,
}

impl RelationalSink {
    /// Wrap an open vector store connection.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Upsert one row per vector record. Returns the number of records
    /// submitted (conflicting rows count as written; they already landed).
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub async fn write_batch(&self, records: &[VectorRecord]) -> Result<usize, DbError> {
        for record in records {
            let encoded = serde_json::to_string(&record.vector)
                .map_err(|e| DbError::Data(format!("Failed to encode vector: {}", e)))?;

            self.conn
                .execute(
                    "INSERT OR IGNORE INTO vectors
                     (record_id, session_id, created_at, text_preview, kind,
                      vector, model, dims, written_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        record.record_id.clone(),
                        record.session_id.clone(),
                        record.created_at.clone(),
                        record.text_preview.clone(),
                        record.kind.clone(),
                        encoded,
                        record.model.clone(),
                        record.dims as i64,
                        record.written_at.clone(),
                    ],
                )
                .await
                .map_err(|e| {
                    DbError::Query(format!(
                        "Failed to write vector for {}: {}",
                        record.record_id, e
                    ))
                })?;
        }

        Ok(records.len())
    }

    /// Count rows in the projection.
    pub async fn count(&self) -> Result<usize, DbError> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM vectors", params![])
            .await
            .map_err(|e| DbError::Query(format!("Failed to count vectors: {}", e)))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(0),
            Err(e) => return Err(DbError::Data(format!("Failed to read count: {}", e))),
        };

        let count: i64 = row
            .get(0)
            .map_err(|e| DbError::Data(format!("Failed to read count: {}", e)))?;
        Ok(count as usize)
    }
}
