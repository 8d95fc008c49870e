//! The embedding engine
//!
//! `Embedder` wraps the rate limiter, circuit breaker, embedding cache and
//! dead letter store around a single text-to-vector operation. Ordinary
//! failures never escape as errors: `embed` returns a tri-state outcome the
//! orchestrator partitions on, and every storage failure along the way is
//! logged and degraded rather than propagated.

use rand::{thread_rng, Rng};
use tracing::{debug, error, warn};

use crate::breaker::CircuitBreaker;
use crate::config::{RetryPolicy, VectorizerConfig};
use crate::inference::InferenceClient;
use crate::limiter::TokenBucket;
use crate::store::{DeadLetterStore, EmbeddingCache};
use crate::text;

/// Result of a single embed operation.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbedOutcome {
    /// Input normalized to nothing; a deliberate zero-work no-op
    Empty,
    /// Successfully produced (or cache-served) vector
    Vector(Vec<f32>),
    /// All retries exhausted; the text is dead-lettered
    Failed,
}

impl EmbedOutcome {
    /// Whether this outcome carries a vector.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Vector(_))
    }
}

/// Running counters for one engine instance.
#[derive(Debug, Default, Clone)]
pub struct EngineStats {
    /// Vectors served from the cache
    pub cache_hits: u64,

    /// Vectors produced by the inference endpoint
    pub embeddings_generated: u64,

    /// Failed inference attempts (including retried ones)
    pub embedding_errors: u64,

    /// Inputs that normalized to nothing
    pub empty_inputs: u64,
}

/// Single-flow embedding engine. Owns all engine state; constructed once and
/// driven one item at a time.
pub struct Embedder {
    inference: InferenceClient,
    cache: EmbeddingCache,
    dlq: DeadLetterStore,
    bucket: TokenBucket,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    max_text_chars: usize,
    stats: EngineStats,
}

impl Embedder {
    /// Assemble an engine from its collaborators and configuration.
    pub fn new(
        inference: InferenceClient,
        cache: EmbeddingCache,
        dlq: DeadLetterStore,
        config: &VectorizerConfig,
    ) -> Self {
        Self {
            inference,
            cache,
            dlq,
            bucket: TokenBucket::new(&config.rate_limit),
            breaker: CircuitBreaker::new(&config.circuit_breaker),
            retry: config.retry_policy.clone(),
            max_text_chars: config.max_text_chars,
            stats: EngineStats::default(),
        }
    }

    /// Embed one text.
    ///
    /// Normalizes, paces through the rate limiter, serves cache hits before
    /// the circuit breaker gate, then runs the bounded retry loop against
    /// the endpoint. Exhausted retries dead-letter the text and yield
    /// `Failed`; the caller decides what that means for the batch.
    pub async fn embed(&mut self, raw_text: &str) -> EmbedOutcome {
        let normalized = text::normalize(raw_text, self.max_text_chars);
        if normalized.is_empty() {
            self.stats.empty_inputs += 1;
            return EmbedOutcome::Empty;
        }

        self.bucket.acquire().await;

        let key = text::content_key(&normalized);
        match self.cache.lookup(&key).await {
            Ok(Some(vector)) => {
                self.stats.cache_hits += 1;
                debug!(key = text::key_prefix(&key), "cache hit");
                return EmbedOutcome::Vector(vector);
            }
            Ok(None) => {}
            Err(e) => {
                // Treat an unreadable cache as a miss and keep going.
                warn!(error = %e, "cache read failed");
            }
        }

        self.breaker.guard().await;

        let mut last_error = String::new();
        for attempt in 0..self.retry.attempts {
            match self.inference.embed_once(&normalized).await {
                Ok(vector) => {
                    self.breaker.record_success();
                    if let Err(e) = self
                        .cache
                        .store(&key, &vector, self.inference.model(), vector.len())
                        .await
                    {
                        warn!(error = %e, "cache write failed");
                    }
                    self.stats.embeddings_generated += 1;
                    return EmbedOutcome::Vector(vector);
                }
                Err(e) => {
                    self.stats.embedding_errors += 1;
                    self.breaker.record_failure();
                    last_error = e.to_string();

                    if attempt + 1 < self.retry.attempts {
                        let delay = self.jittered_backoff(attempt);
                        warn!(
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "embedding attempt failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        if let Err(e) = self.dlq.upsert_failure(&key, &normalized, &last_error).await {
            error!(error = %e, "dead letter write failed");
        }
        error!(
            key = text::key_prefix(&key),
            attempts = self.retry.attempts,
            error = %last_error,
            "embedding failed permanently"
        );
        EmbedOutcome::Failed
    }

    /// Exponential backoff plus up to 10% jitter.
    fn jittered_backoff(&self, attempt: u32) -> std::time::Duration {
        let base = self.retry.backoff(attempt);
        let jitter = base.mul_f64(thread_rng().gen_range(0.0..0.1));
        base + jitter
    }

    /// Snapshot of the engine counters.
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Number of circuit breaker trips so far.
    pub fn circuit_trips(&self) -> u32 {
        self.breaker.trips()
    }

    /// Handle to the dead letter store, for draining and reporting.
    pub fn dead_letters(&self) -> &DeadLetterStore {
        &self.dlq
    }
}
