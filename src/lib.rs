//! # Vectorizer - Resilient Batch Vectorization Pipeline
//!
//! This crate drains a backlog of unprocessed text records, converts each
//! into a fixed-dimension embedding via a remote inference endpoint, and
//! durably persists the vectors to a relational store and/or a vector-search
//! store. A record is only marked processed after its vector has actually
//! landed.
//!
//! ## Features
//!
//! - Token-bucket rate limiting against the inference endpoint
//! - Circuit breaker with escalating cooldown under sustained failure
//! - Content-hash embedding cache for idempotent reprocessing
//! - Dead letter queue isolating permanently-failing records
//! - Instant/bulk batch orchestration with partial-failure semantics
//! - Async API with Tokio
//!
//! ## Example
//!
//! ```rust,no_run
//! use vectorizer::config::{RunMode, VectorizerConfig};
//! use vectorizer::pipeline;
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = VectorizerConfig::default();
//!     let shutdown = Arc::new(AtomicBool::new(false));
//!
//!     let mut orchestrator = pipeline::initialize(
//!         &config,
//!         "queue.db",
//!         "vectors.db",
//!         vectorizer::config::SinkTarget::Both,
//!         shutdown,
//!     )
//!     .await?;
//!
//!     let summary = orchestrator.run(RunMode::Auto).await;
//!     println!("vectorized {}", summary.total_processed);
//!     Ok(())
//! }
//! ```

pub mod breaker;
pub mod config;
pub mod embedder;
pub mod inference;
pub mod limiter;
pub mod orchestrator;
pub mod pipeline;
pub mod sink;
pub mod store;
pub mod telemetry;
pub mod text;

mod error;

pub use error::{Error, Result};

/// Re-export of commonly used types
pub mod prelude {
    pub use crate::config::{RunMode, SinkTarget, VectorizerConfig};
    pub use crate::embedder::{EmbedOutcome, Embedder};
    pub use crate::error::{Error, Result};
    pub use crate::orchestrator::{Orchestrator, RunSummary};
}
