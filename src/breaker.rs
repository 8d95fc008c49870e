//! Circuit breaker for the inference endpoint
//!
//! The breaker is gate-checked at the start of each embedding attempt rather
//! than transitioned on failure. Once consecutive failures reach the
//! threshold, the next gate check sleeps the caller for an escalating
//! cooldown instead of rejecting: the breaker imposes backpressure, it does
//! not fail fast.

use std::time::Duration;

use tracing::{error, info};

use crate::config::CircuitBreakerConfig;

/// Ceiling on the cooldown multiplier for repeated trips
const MAX_PAUSE_MULTIPLIER: u32 = 5;

/// Breaker state for a single embedding engine.
///
/// There is no half-open probe: after a cooldown the failure counter resets
/// to zero and the next call proceeds as a fresh attempt, so an immediate
/// re-failure re-accumulates from zero rather than re-tripping instantly.
#[derive(Debug)]
pub struct CircuitBreaker {
    consecutive_failures: u32,
    trip_count: u32,
    failure_threshold: u32,
    base_pause: Duration,
}

impl CircuitBreaker {
    /// Create a breaker from configuration.
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            consecutive_failures: 0,
            trip_count: 0,
            failure_threshold: config.failure_threshold.max(1),
            base_pause: Duration::from_secs(config.pause_duration_s),
        }
    }

    /// Gate check: if the failure threshold has been reached, cool down for
    /// `base_pause × min(trip_count + 1, 5)` before allowing the caller to
    /// proceed.
    pub async fn guard(&mut self) {
        if self.consecutive_failures < self.failure_threshold {
            return;
        }

        let multiplier = (self.trip_count + 1).min(MAX_PAUSE_MULTIPLIER);
        let pause = self.base_pause * multiplier;

        error!(
            consecutive_failures = self.consecutive_failures,
            pause_s = pause.as_secs_f64(),
            trip = self.trip_count + 1,
            "circuit open, cooling down"
        );

        tokio::time::sleep(pause).await;

        self.consecutive_failures = 0;
        self.trip_count += 1;
        info!(trips = self.trip_count, "circuit cooldown complete");
    }

    /// Record a failed inference call.
    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
    }

    /// Record a successful inference call, resetting the failure streak.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Number of times the breaker has tripped since construction.
    pub fn trips(&self) -> u32 {
        self.trip_count
    }

    #[cfg(test)]
    fn is_tripped(&self) -> bool {
        self.consecutive_failures >= self.failure_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, pause_s: u64) -> CircuitBreaker {
        CircuitBreaker::new(&CircuitBreakerConfig {
            failure_threshold: threshold,
            pause_duration_s: pause_s,
        })
    }

    #[tokio::test]
    async fn test_guard_sleeps_after_threshold() {
        let mut breaker = breaker(3, 1);
        for _ in 0..3 {
            breaker.record_failure();
        }

        let start = std::time::Instant::now();
        breaker.guard().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert_eq!(breaker.trips(), 1);
        assert!(!breaker.is_tripped(), "failure streak resets after cooldown");
    }

    #[tokio::test]
    async fn test_guard_is_noop_below_threshold() {
        let mut breaker = breaker(3, 60);
        breaker.record_failure();
        breaker.record_failure();

        let start = std::time::Instant::now();
        breaker.guard().await;
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(breaker.trips(), 0);
    }

    #[tokio::test]
    async fn test_single_success_resets_failure_streak() {
        // threshold - 1 failures, one success, then one more failure must
        // leave the breaker closed.
        let mut breaker = breaker(3, 60);
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();

        assert!(!breaker.is_tripped());
        let start = std::time::Instant::now();
        breaker.guard().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_cooldown_escalates_with_trips() {
        let mut breaker = breaker(1, 1);

        breaker.record_failure();
        let start = std::time::Instant::now();
        breaker.guard().await;
        let first = start.elapsed();

        breaker.record_failure();
        let start = std::time::Instant::now();
        breaker.guard().await;
        let second = start.elapsed();

        assert!(first >= Duration::from_secs(1));
        // Second trip pauses base × 2.
        assert!(second >= Duration::from_secs(2));
        assert_eq!(breaker.trips(), 2);
    }
}
