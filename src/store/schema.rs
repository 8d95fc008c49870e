//! Vector store schema
//!
//! Three tables back the pipeline's durable state:
//!
//! 1. `vectors` - the relational projection of successfully embedded records
//! 2. `embed_cache` - content-hash keyed embeddings, insert-if-absent
//! 3. `embed_dlq` - permanently failed inputs with bounded retry eligibility
//!
//! All statements are idempotent so initialization can run before every
//! batch run. The inbound `work_items` queue table is owned by the external
//! extraction stage and is deliberately not created here.

use libsql::{params, Connection};

use crate::store::error::DbError;

/// Initialize the vector store schema
pub async fn initialize_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS vectors (
            record_id TEXT PRIMARY KEY,
            session_id TEXT,
            created_at TEXT,
            text_preview TEXT,
            kind TEXT,
            vector TEXT NOT NULL,
            model TEXT,
            dims INTEGER,
            written_at TEXT
        )",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create vectors table: {}", e)))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS embed_cache (
            key TEXT PRIMARY KEY,
            vector TEXT NOT NULL,
            model TEXT,
            dims INTEGER,
            created_at TEXT
        )",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create embed_cache table: {}", e)))?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_embed_cache_dims ON embed_cache(dims)",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create embed_cache index: {}", e)))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS embed_dlq (
            key TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            last_error TEXT,
            attempts INTEGER DEFAULT 0,
            last_attempt_at TEXT
        )",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create embed_dlq table: {}", e)))?;

    Ok(())
}
