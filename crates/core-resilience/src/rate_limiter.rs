//! Adaptive rate limiting for a single upstream API
//!
//! Enforces a minimum spacing between outbound calls and adapts that spacing
//! to observed outcomes: consecutive successes narrow the gap, rate-limit
//! rejections and generic errors widen it multiplicatively within fixed
//! bounds.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Configuration for the adaptive delay
///
/// Fixed at construction; defaults match the CRM deal endpoint's observed
/// tolerances.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Spacing applied before any outcome has been observed
    pub base_delay: Duration,
    /// Lower bound for the adaptive spacing
    pub min_delay: Duration,
    /// Upper bound for the adaptive spacing
    pub max_delay: Duration,
    /// Consecutive successes required before the spacing shrinks
    pub success_threshold: u32,
    /// Multiplier applied on a success streak (narrows the gap)
    pub decay_factor: f64,
    /// Multiplier applied on an explicit rate-limit rejection
    pub rate_limit_factor: f64,
    /// Multiplier applied on a generic failure
    pub error_factor: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(30_000),
            success_threshold: 3,
            decay_factor: 0.8,
            rate_limit_factor: 2.0,
            error_factor: 1.5,
        }
    }
}

/// Read-only snapshot of the limiter's adaptive state
#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    pub delay_ms: u64,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

/// Internal adaptive state
#[derive(Debug)]
struct LimiterState {
    last_request_at: Option<Instant>,
    current_delay: Duration,
    consecutive_successes: u32,
    consecutive_failures: u32,
}

/// Adaptive spacing limiter for calls that share one upstream quota
///
/// Callers are responsible for invoking exactly one of `on_success` /
/// `on_rate_limit` / `on_error` after each attempt gated by
/// `wait_for_next_request`; the limiter has no automatic feedback from the
/// operation's outcome.
///
/// # Example
/// ```no_run
/// use dealsync_core_resilience::{AdaptiveRateLimiter, RateLimiterConfig};
///
/// # async fn example() {
/// let limiter = AdaptiveRateLimiter::new(RateLimiterConfig::default());
///
/// limiter.wait_for_next_request().await;
/// // ... outbound call ...
/// limiter.on_success().await;
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AdaptiveRateLimiter {
    config: Arc<RateLimiterConfig>,
    state: Arc<Mutex<LimiterState>>,
}

impl AdaptiveRateLimiter {
    /// Create a new limiter with the given configuration
    pub fn new(config: RateLimiterConfig) -> Self {
        let initial = config.base_delay.clamp(config.min_delay, config.max_delay);
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(LimiterState {
                last_request_at: None,
                current_delay: initial,
                consecutive_successes: 0,
                consecutive_failures: 0,
            })),
        }
    }

    /// Create a new limiter with default configuration
    pub fn new_default() -> Self {
        Self::new(RateLimiterConfig::default())
    }

    /// Suspend until the adaptive spacing since the previous request has
    /// elapsed, then stamp the request time.
    ///
    /// Must be called immediately before every outbound request that shares
    /// this limiter. The lock is held across the sleep so concurrent callers
    /// observe the spacing too.
    pub async fn wait_for_next_request(&self) {
        let mut state = self.state.lock().await;

        if let Some(last) = state.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < state.current_delay {
                tokio::time::sleep(state.current_delay - elapsed).await;
            }
        }

        state.last_request_at = Some(Instant::now());
    }

    /// Record a successful gated attempt
    ///
    /// After `success_threshold` consecutive successes the spacing shrinks by
    /// `decay_factor`, floored at `min_delay`, and the streak restarts.
    pub async fn on_success(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_successes += 1;
        state.consecutive_failures = 0;

        if state.consecutive_successes >= self.config.success_threshold {
            state.consecutive_successes = 0;
            let shrunk = mul_duration(state.current_delay, self.config.decay_factor);
            state.current_delay = shrunk.clamp(self.config.min_delay, self.config.max_delay);
            tracing::debug!(
                delay_ms = state.current_delay.as_millis() as u64,
                "rate limiter narrowed spacing"
            );
        }
    }

    /// Record an explicit upstream rate-limit rejection (HTTP 429)
    pub async fn on_rate_limit(&self) {
        self.widen(self.config.rate_limit_factor, "rate limit").await;
    }

    /// Record a generic failure that was not a rate-limit rejection
    pub async fn on_error(&self) {
        self.widen(self.config.error_factor, "error").await;
    }

    async fn widen(&self, factor: f64, cause: &str) {
        let mut state = self.state.lock().await;
        state.consecutive_failures += 1;
        state.consecutive_successes = 0;

        let widened = mul_duration(state.current_delay, factor);
        state.current_delay = widened.clamp(self.config.min_delay, self.config.max_delay);
        tracing::debug!(
            delay_ms = state.current_delay.as_millis() as u64,
            cause,
            "rate limiter widened spacing"
        );
    }

    /// Get the current adaptive spacing
    pub async fn current_delay(&self) -> Duration {
        let state = self.state.lock().await;
        state.current_delay
    }

    /// Get a read-only snapshot of the adaptive state
    pub async fn stats(&self) -> RateLimiterStats {
        let state = self.state.lock().await;
        RateLimiterStats {
            delay_ms: state.current_delay.as_millis() as u64,
            consecutive_successes: state.consecutive_successes,
            consecutive_failures: state.consecutive_failures,
        }
    }
}

fn mul_duration(d: Duration, factor: f64) -> Duration {
    Duration::from_secs_f64(d.as_secs_f64() * factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delay_stays_within_bounds() {
        let limiter = AdaptiveRateLimiter::new_default();
        let config = RateLimiterConfig::default();

        // Hammer the limiter with a mixed signal sequence
        for i in 0..200 {
            match i % 5 {
                0 | 1 => limiter.on_success().await,
                2 => limiter.on_rate_limit().await,
                3 => limiter.on_error().await,
                _ => limiter.on_success().await,
            }
            let delay = limiter.current_delay().await;
            assert!(delay >= config.min_delay, "delay {:?} below floor", delay);
            assert!(delay <= config.max_delay, "delay {:?} above cap", delay);
        }

        // Saturate upward
        for _ in 0..50 {
            limiter.on_rate_limit().await;
        }
        assert_eq!(limiter.current_delay().await, config.max_delay);

        // Saturate downward
        for _ in 0..300 {
            limiter.on_success().await;
        }
        assert_eq!(limiter.current_delay().await, config.min_delay);
    }

    #[tokio::test]
    async fn test_three_successes_shrink_delay() {
        let limiter = AdaptiveRateLimiter::new_default();
        let before = limiter.current_delay().await;

        limiter.on_success().await;
        limiter.on_success().await;
        assert_eq!(limiter.current_delay().await, before);

        limiter.on_success().await;
        let after = limiter.current_delay().await;
        assert!(after < before);
        assert_eq!(after, Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_rate_limit_doubles_and_error_multiplies() {
        let limiter = AdaptiveRateLimiter::new_default();

        limiter.on_rate_limit().await;
        assert_eq!(limiter.current_delay().await, Duration::from_millis(2000));

        limiter.on_error().await;
        assert_eq!(limiter.current_delay().await, Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn test_failure_resets_success_streak() {
        let limiter = AdaptiveRateLimiter::new_default();

        limiter.on_success().await;
        limiter.on_success().await;
        limiter.on_error().await;

        let stats = limiter.stats().await;
        assert_eq!(stats.consecutive_successes, 0);
        assert_eq!(stats.consecutive_failures, 1);

        // The streak restarted, so two more successes must not shrink yet
        let widened = limiter.current_delay().await;
        limiter.on_success().await;
        limiter.on_success().await;
        assert_eq!(limiter.current_delay().await, widened);
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_waits_observe_spacing() {
        let limiter = AdaptiveRateLimiter::new_default();

        limiter.wait_for_next_request().await;
        let start = tokio::time::Instant::now();
        limiter.wait_for_next_request().await;
        let waited = start.elapsed();

        // Second call must have suspended for roughly the base delay
        assert!(waited >= Duration::from_millis(990), "waited {:?}", waited);
        assert!(waited <= Duration::from_millis(1100), "waited {:?}", waited);
    }

    #[tokio::test]
    async fn test_first_wait_does_not_sleep() {
        let limiter = AdaptiveRateLimiter::new_default();

        let start = Instant::now();
        limiter.wait_for_next_request().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
