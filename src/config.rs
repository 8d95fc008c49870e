//! # Vectorizer Configuration Module
//!
//! This module provides configuration for the vectorization pipeline: the
//! inference endpoint, rate limiting, retry policy, circuit breaker, batch
//! sizing and sink targets. It uses a builder pattern for flexible
//! configuration and supports overlaying defaults with a partial JSON file.
//!
//! ## Key Components
//!
//! - `VectorizerConfig`: the top-level configuration struct
//! - `VectorizerConfigBuilder`: builder pattern implementation
//! - `RunMode` / `SinkTarget`: CLI-facing selector enums
//!
//! Every field has a documented default; a JSON config file only needs to
//! name the fields it overrides.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Rate limiting configuration for the outbound inference endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Minimum interval between inference calls in milliseconds
    pub min_interval_ms: u64,

    /// Token bucket capacity (burst allowance)
    pub bucket_capacity: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 2000,
            bucket_capacity: 2.0,
        }
    }
}

impl RateLimitConfig {
    /// Refill rate in tokens per second
    pub fn tokens_per_sec(&self) -> f64 {
        1000.0 / self.min_interval_ms.max(1) as f64
    }
}

/// Retry policy for individual inference calls
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Number of attempts before a text is dead-lettered
    pub attempts: u32,

    /// Base backoff delay in milliseconds
    pub base_ms: u64,

    /// Backoff ceiling in milliseconds
    pub max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_ms: 1000,
            max_ms: 5000,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay for a zero-based attempt index, before jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_ms.saturating_mul(1u64 << attempt.min(16));
        Duration::from_millis(exp.min(self.max_ms))
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker trips
    pub failure_threshold: u32,

    /// Base cooldown duration in seconds
    pub pause_duration_s: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 10,
            pause_duration_s: 30,
        }
    }
}

/// Batch orchestration configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of work items pulled per batch
    pub batch_size: usize,

    /// Maximum batches per bulk-mode run
    pub bulk_max_batches: usize,

    /// Delay between bulk-mode batches in seconds
    pub inter_batch_delay_s: u64,

    /// Queue depth below which auto mode selects instant
    pub instant_threshold: usize,

    /// Maximum dead-letter entries retried before a run
    pub dlq_drain_limit: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            bulk_max_batches: 10,
            inter_batch_delay_s: 2,
            instant_threshold: 100,
            dlq_drain_limit: 25,
        }
    }
}

/// Vector sink (Qdrant) configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    /// Base URL of the Qdrant REST endpoint
    pub url: String,

    /// Collection that receives the points
    pub collection: String,

    /// Distance metric used when the collection is created
    pub distance: String,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            collection: "text_vectors".to_string(),
            distance: "Cosine".to_string(),
        }
    }
}

/// Configuration for the vectorization pipeline
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorizerConfig {
    /// Base URL of the embedding inference endpoint
    pub inference_url: String,

    /// Embedding model identifier
    pub model: String,

    /// Expected vector dimensionality (verified against the warm-up call)
    pub expected_dims: usize,

    /// Maximum characters of normalized text sent to the endpoint
    pub max_text_chars: usize,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,

    /// Retry policy for inference calls
    pub retry_policy: RetryPolicy,

    /// Circuit breaker configuration
    pub circuit_breaker: CircuitBreakerConfig,

    /// Batch orchestration configuration
    pub batch: BatchConfig,

    /// Vector sink configuration
    pub qdrant: QdrantConfig,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            inference_url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            expected_dims: 768,
            max_text_chars: 8000,
            rate_limit: RateLimitConfig::default(),
            retry_policy: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            batch: BatchConfig::default(),
            qdrant: QdrantConfig::default(),
        }
    }
}

impl VectorizerConfig {
    /// Create a new builder
    pub fn builder() -> VectorizerConfigBuilder {
        VectorizerConfigBuilder::new()
    }

    /// Load a configuration file, overlaying the defaults.
    ///
    /// The file is JSON and may be partial; absent fields keep their default
    /// values.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Circuit breaker base pause as a Duration
    pub fn breaker_pause(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker.pause_duration_s)
    }
}

/// Builder for VectorizerConfig
#[derive(Debug, Default)]
pub struct VectorizerConfigBuilder {
    config: VectorizerConfig,
}

impl VectorizerConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: VectorizerConfig::default(),
        }
    }

    /// Set the inference endpoint base URL
    pub fn inference_url(mut self, url: impl Into<String>) -> Self {
        self.config.inference_url = url.into();
        self
    }

    /// Set the embedding model
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    /// Set the expected vector dimensionality
    pub fn expected_dims(mut self, dims: usize) -> Self {
        self.config.expected_dims = dims;
        self
    }

    /// Set the minimum interval between inference calls
    pub fn min_interval_ms(mut self, ms: u64) -> Self {
        self.config.rate_limit.min_interval_ms = ms;
        self
    }

    /// Set the retry policy
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry_policy = policy;
        self
    }

    /// Set the circuit breaker configuration
    pub fn circuit_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.config.circuit_breaker = breaker;
        self
    }

    /// Set the batch configuration
    pub fn batch(mut self, batch: BatchConfig) -> Self {
        self.config.batch = batch;
        self
    }

    /// Set the vector sink configuration
    pub fn qdrant(mut self, qdrant: QdrantConfig) -> Self {
        self.config.qdrant = qdrant;
        self
    }

    /// Build the configuration
    pub fn build(self) -> VectorizerConfig {
        self.config
    }
}

/// Orchestration mode selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Instant below the queue-depth threshold, bulk above it
    Auto,
    /// Drain the whole queue in one run
    Instant,
    /// Process a bounded number of batches, resumable
    Bulk,
}

impl RunMode {
    /// Parse a CLI mode string
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(Self::Auto),
            "instant" => Ok(Self::Instant),
            "bulk" => Ok(Self::Bulk),
            other => Err(Error::Config(format!("unknown mode: {}", other))),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Instant => write!(f, "instant"),
            Self::Bulk => write!(f, "bulk"),
        }
    }
}

/// Sink target selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkTarget {
    /// Write to the relational store only
    Relational,
    /// Write to the vector store only
    Vector,
    /// Write to both stores
    Both,
}

impl SinkTarget {
    /// Parse a CLI target string
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "relational" => Ok(Self::Relational),
            "vector" => Ok(Self::Vector),
            "both" => Ok(Self::Both),
            other => Err(Error::Config(format!("unknown target: {}", other))),
        }
    }

    /// Whether the relational sink receives writes
    pub fn includes_relational(&self) -> bool {
        matches!(self, Self::Relational | Self::Both)
    }

    /// Whether the vector sink receives writes
    pub fn includes_vector(&self) -> bool {
        matches!(self, Self::Vector | Self::Both)
    }
}

impl fmt::Display for SinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relational => write!(f, "relational"),
            Self::Vector => write!(f, "vector"),
            Self::Both => write!(f, "both"),
        }
    }
}
