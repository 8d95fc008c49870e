//! Content-hash keyed embedding cache
//!
//! Entries are immutable once written: `store` is insert-if-absent, so a
//! race producing two writes for the same key resolves by ignoring the
//! duplicate. The pipeline never expires entries; cache growth is an
//! accepted tradeoff for idempotent reprocessing.

use libsql::{params, Connection};
use tracing::instrument;

use crate::store::error::DbError;
use crate::store::now_timestamp;

/// Durable cache of previously computed embeddings, keyed by content hash.
///
/// Failures on either path are non-fatal to the pipeline: callers log and
/// degrade to a miss (reads) or skip the write.
#[derive(Clone)]
pub struct EmbeddingCache {
    conn: Connection,
}

impl EmbeddingCache {
    /// Wrap an open vector store connection.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Look up a cached vector by content key.
    #[instrument(skip(self), level = "debug")]
    pub async fn lookup(&self, key: &str) -> Result<Option<Vec<f32>>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT vector FROM embed_cache WHERE key = ?",
                params![key],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to read cache: {}", e)))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let raw: String = row
                    .get(0)
                    .map_err(|e| DbError::Data(format!("Failed to get cached vector: {}", e)))?;
                let vector: Vec<f32> = serde_json::from_str(&raw)
                    .map_err(|e| DbError::Data(format!("Corrupt cached vector: {}", e)))?;
                Ok(Some(vector))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DbError::Data(format!("Failed to read cache row: {}", e))),
        }
    }

    /// Store a vector under its content key, ignoring an existing entry.
    #[instrument(skip(self, vector), level = "debug")]
    pub async fn store(
        &self,
        key: &str,
        vector: &[f32],
        model: &str,
        dims: usize,
    ) -> Result<(), DbError> {
        let encoded = serde_json::to_string(vector)
            .map_err(|e| DbError::Data(format!("Failed to encode vector: {}", e)))?;

        self.conn
            .execute(
                "INSERT OR IGNORE INTO embed_cache (key, vector, model, dims, created_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![key, encoded, model, dims as i64, now_timestamp()],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to write cache: {}", e)))?;

        Ok(())
    }
}
