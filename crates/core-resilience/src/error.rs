//! Error taxonomy shared by the resilience primitives and their callers

use thiserror::Error;

/// Failure classification for operations gated by the resilience layer.
///
/// The breaker and limiter never construct `RateLimited`/`Timeout`/`Upstream`
/// themselves; the caller classifies the upstream response and the primitives
/// react to the classification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResilienceError {
    /// The circuit breaker rejected the call without invoking the operation
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// The upstream explicitly rejected the request as rate-limited (HTTP 429)
    #[error("upstream rate limit: {0}")]
    RateLimited(String),

    /// The upstream call exceeded its deadline
    #[error("upstream timed out: {0}")]
    Timeout(String),

    /// Any other upstream failure (transport error, non-2xx, bad payload)
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl ResilienceError {
    /// True for explicit 429-style rejections, which drive a harder backoff
    /// than generic failures.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ResilienceError::RateLimited(_))
    }

    /// True when the breaker itself short-circuited the call; the operation
    /// never reached the wire, so outcome signals must not be fed back.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen)
    }
}
