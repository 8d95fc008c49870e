//! Storage layer for the vectorization pipeline
//!
//! The work queue lives in its own database owned by the upstream extraction
//! stage; the vector store database holds the relational projection, the
//! embedding cache and the dead letter queue. All writes are key-based
//! idempotent upserts, safe under concurrent writers without cross-table
//! transactions.

mod cache;
mod dlq;
pub mod error;
mod queue;
mod schema;

pub use cache::EmbeddingCache;
pub use dlq::{DeadLetter, DeadLetterStore};
pub use error::DbError;
pub use queue::WorkQueue;
pub use schema::initialize_schema;

use chrono::{SecondsFormat, Utc};
use libsql::Connection;

/// One unit of the inbound work queue.
///
/// Owned by the extraction stage; the pipeline only reads unprocessed items
/// and flips `processed` on confirmed success. Items are never deleted here.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Stable identifier of the record
    pub record_id: String,

    /// Secondary identifier (session/composer), when present
    pub session_id: Option<String>,

    /// Creation timestamp of the record
    pub created_at: String,

    /// Free text to embed
    pub text: String,

    /// Record type tag
    pub kind: String,

    /// Whether the record has been vectorized
    pub processed: bool,
}

/// Output unit handed to the sink writers. Constructed per batch, not
/// persisted by the pipeline beyond what the sinks do.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// Stable identifier of the source record
    pub record_id: String,

    /// Secondary identifier, when present
    pub session_id: Option<String>,

    /// Creation timestamp of the source record
    pub created_at: String,

    /// Truncated text preview
    pub text_preview: String,

    /// Record type tag
    pub kind: String,

    /// The embedding vector
    pub vector: Vec<f32>,

    /// Model that produced the vector
    pub model: String,

    /// Vector dimensionality
    pub dims: usize,

    /// Write timestamp
    pub written_at: String,
}

/// Characters of source text kept in sink previews
pub const TEXT_PREVIEW_CHARS: usize = 500;

/// Current UTC timestamp in RFC3339 with millisecond precision.
///
/// Lexicographic order matches chronological order, which the DLQ relies on
/// for oldest-failed-first draining.
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Open a local libsql database and connect.
pub(crate) async fn connect(path: &str) -> Result<Connection, DbError> {
    let db = libsql::Builder::new_local(path)
        .build()
        .await
        .map_err(|e| DbError::Connection(format!("Failed to open database: {}", e)))?;

    db.connect()
        .map_err(|e| DbError::Connection(format!("Failed to connect to database: {}", e)))
}
