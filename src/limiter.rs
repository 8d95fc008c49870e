//! Token bucket rate limiter for the inference endpoint
//!
//! The bucket refills continuously at `tokens_per_sec` up to its capacity.
//! `acquire` suspends the calling task until a token is available; the wait
//! is computed from the current deficit and capped per iteration, so the
//! limiter neither busy-spins nor oversleeps past the true refill point.

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::config::RateLimitConfig;

/// Longest single sleep before the deficit is recomputed
const MAX_SLEEP: Duration = Duration::from_millis(500);

/// Token bucket pacing outbound inference calls.
///
/// Single-flow: one embedding engine owns one bucket. Sharing a bucket across
/// concurrent engines requires external synchronization.
#[derive(Debug)]
pub struct TokenBucket {
    tokens: f64,
    capacity: f64,
    tokens_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a bucket from the rate limit configuration, starting full.
    pub fn new(config: &RateLimitConfig) -> Self {
        let capacity = config.bucket_capacity.max(1.0);
        Self {
            tokens: capacity,
            capacity,
            tokens_per_sec: config.tokens_per_sec(),
            last_refill: Instant::now(),
        }
    }

    /// Block until one token is available, then consume it.
    pub async fn acquire(&mut self) {
        loop {
            self.refill();

            if self.tokens >= 1.0 {
                self.tokens -= 1.0;
                return;
            }

            let deficit = 1.0 - self.tokens;
            let wait = Duration::from_secs_f64(deficit / self.tokens_per_sec);
            let wait = wait.min(MAX_SLEEP);
            trace!(wait_ms = wait.as_millis() as u64, "rate limit wait");
            tokio::time::sleep(wait).await;
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.tokens_per_sec).min(self.capacity);
        self.last_refill = now;
    }
}
