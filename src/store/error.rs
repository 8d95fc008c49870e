//! Error types for the storage layer
//!
//! Cache and dead-letter writes are best-effort from the pipeline's point of
//! view: the embedding engine logs a `DbError` from those paths and
//! continues. Queue operations and schema initialization, by contrast,
//! propagate into the crate error and abort the run.

use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for storage operations
#[derive(Debug, Error)]
pub enum DbError {
    /// LibSQL error
    #[error("LibSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// SQL query error
    #[error("SQL query error: {0}")]
    Query(String),

    /// Schema error
    #[error("Schema error: {0}")]
    Schema(String),

    /// Data error
    #[error("Data error: {0}")]
    Data(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<DbError> for CrateError {
    fn from(err: DbError) -> Self {
        CrateError::Database(err.to_string())
    }
}
