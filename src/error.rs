//! Error types for the vectorizer crate

use thiserror::Error;

/// Result type for vectorizer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for vectorizer operations
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Endpoint returned an error response
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code
        status_code: u16,
        /// Error message
        message: String,
    },

    /// Unexpected response format
    #[error("Unexpected response format: {0}")]
    UnexpectedResponse(String),

    /// Initialization error, fatal: aborts the run before any processing
    #[error("Initialization error: {0}")]
    Init(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Vector sink error
    #[error("Vector sink error: {0}")]
    Sink(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}
