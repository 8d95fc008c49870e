//! Dead letter queue for permanently failed embeddings
//!
//! One entry per content key: repeat failures increment `attempts` and
//! overwrite the last error rather than duplicating. Entries stop being
//! retry-eligible once `attempts` reaches the cap and stay in the table for
//! manual inspection; a later successful reprocessing removes them.

use libsql::{params, Connection, Row};
use tracing::instrument;

use crate::store::error::DbError;
use crate::store::now_timestamp;

/// Retry eligibility cap: entries at or beyond this many attempts are inert
pub const MAX_ATTEMPTS: i64 = 10;

/// A dead letter entry.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// Content-hash key of the failed text
    pub key: String,

    /// The original (normalized) text
    pub text: String,

    /// Last error observed
    pub last_error: String,

    /// Number of exhausted retry rounds
    pub attempts: i64,

    /// Timestamp of the last attempt
    pub last_attempt_at: String,
}

/// Durable record of permanently-failing inputs.
#[derive(Clone)]
pub struct DeadLetterStore {
    conn: Connection,
}

impl DeadLetterStore {
    /// Wrap an open vector store connection.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Record a final failure for a text: insert with `attempts = 1` or
    /// increment the existing entry.
    #[instrument(skip(self, text, error), level = "debug")]
    pub async fn upsert_failure(&self, key: &str, text: &str, error: &str) -> Result<(), DbError> {
        self.conn
            .execute(
                "INSERT INTO embed_dlq (key, text, last_error, attempts, last_attempt_at)
                 VALUES (?, ?, ?, 1, ?)
                 ON CONFLICT(key) DO UPDATE SET
                     last_error = excluded.last_error,
                     attempts = embed_dlq.attempts + 1,
                     last_attempt_at = excluded.last_attempt_at",
                params![key, text, error, now_timestamp()],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to write dead letter: {}", e)))?;

        Ok(())
    }

    /// List retry-eligible entries, oldest failure first.
    pub async fn list_retryable(&self, limit: usize) -> Result<Vec<DeadLetter>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT key, text, last_error, attempts, last_attempt_at
                 FROM embed_dlq
                 WHERE attempts < ?
                 ORDER BY last_attempt_at ASC
                 LIMIT ?",
                params![MAX_ATTEMPTS, limit as i64],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to list dead letters: {}", e)))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            entries.push(row_to_entry(&row)?);
        }
        Ok(entries)
    }

    /// Remove an entry after a successful reprocessing.
    #[instrument(skip(self), level = "debug")]
    pub async fn remove(&self, key: &str) -> Result<(), DbError> {
        self.conn
            .execute("DELETE FROM embed_dlq WHERE key = ?", params![key])
            .await
            .map_err(|e| DbError::Query(format!("Failed to remove dead letter: {}", e)))?;
        Ok(())
    }

    /// Total number of dead letters, inert ones included.
    pub async fn count(&self) -> Result<usize, DbError> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM embed_dlq", params![])
            .await
            .map_err(|e| DbError::Query(format!("Failed to count dead letters: {}", e)))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(0),
            Err(e) => return Err(DbError::Data(format!("Failed to read DLQ count: {}", e))),
        };

        let count: i64 = row
            .get(0)
            .map_err(|e| DbError::Data(format!("Failed to read DLQ count: {}", e)))?;
        Ok(count as usize)
    }
}

fn row_to_entry(row: &Row) -> Result<DeadLetter, DbError> {
    Ok(DeadLetter {
        key: row
            .get(0)
            .map_err(|e| DbError::Data(format!("Failed to get key: {}", e)))?,
        text: row
            .get(1)
            .map_err(|e| DbError::Data(format!("Failed to get text: {}", e)))?,
        last_error: row
            .get(2)
            .map_err(|e| DbError::Data(format!("Failed to get last_error: {}", e)))?,
        attempts: row
            .get(3)
            .map_err(|e| DbError::Data(format!("Failed to get attempts: {}", e)))?,
        last_attempt_at: row
            .get(4)
            .map_err(|e| DbError::Data(format!("Failed to get last_attempt_at: {}", e)))?,
    })
}
