//! Pipeline initialization
//!
//! Wires the queue, stores, inference endpoint and sinks into a ready
//! orchestrator. Everything here is fail-fast: an unreachable endpoint or
//! missing storage aborts the run before any processing begins. The one
//! exception is the vector sink under a `both` target, which degrades to
//! relational-only with a warning rather than failing the whole run.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{SinkTarget, VectorizerConfig};
use crate::embedder::Embedder;
use crate::error::{Error, Result};
use crate::inference::InferenceClient;
use crate::orchestrator::Orchestrator;
use crate::sink::{QdrantSink, RelationalSink, SinkWriter};
use crate::store::{self, DeadLetterStore, EmbeddingCache, WorkQueue};

/// Initialize every collaborator and assemble the orchestrator.
pub async fn initialize(
    config: &VectorizerConfig,
    queue_path: &str,
    store_path: &str,
    target: SinkTarget,
    shutdown: Arc<AtomicBool>,
) -> Result<Orchestrator> {
    let queue = WorkQueue::open(queue_path).await?;
    info!(path = queue_path, "work queue open");

    let conn = store::connect(store_path).await?;
    store::initialize_schema(&conn).await?;
    info!(path = store_path, "vector store ready");

    let inference = InferenceClient::new(&config.inference_url, &config.model)?;
    let dims = inference.warm_up().await?;
    if dims != config.expected_dims {
        warn!(
            discovered = dims,
            expected = config.expected_dims,
            "endpoint dimensionality differs from configuration, using discovered value"
        );
    }

    let relational = target
        .includes_relational()
        .then(|| RelationalSink::new(conn.clone()));

    let vector = if target.includes_vector() {
        match init_vector_sink(config, dims).await {
            Ok(sink) => Some(sink),
            Err(e) if target == SinkTarget::Vector => return Err(e),
            Err(e) => {
                warn!(error = %e, "vector sink unavailable, falling back to relational only");
                None
            }
        }
    } else {
        None
    };

    let effective = match (&relational, &vector) {
        (Some(_), Some(_)) => SinkTarget::Both,
        (None, Some(_)) => SinkTarget::Vector,
        _ => SinkTarget::Relational,
    };
    info!(target = %effective, rate = config.rate_limit.tokens_per_sec(), "vectorizer initialized");

    let embedder = Embedder::new(
        inference,
        EmbeddingCache::new(conn.clone()),
        DeadLetterStore::new(conn),
        config,
    );

    Ok(Orchestrator::new(
        queue,
        embedder,
        SinkWriter::new(relational, vector),
        config.model.clone(),
        config.batch.clone(),
        shutdown,
    ))
}

async fn init_vector_sink(config: &VectorizerConfig, dims: usize) -> Result<QdrantSink> {
    let sink = QdrantSink::new(&config.qdrant)?;
    sink.ensure_collection(dims)
        .await
        .map_err(|e| Error::Init(format!("vector sink unavailable: {}", e)))?;
    Ok(sink)
}
