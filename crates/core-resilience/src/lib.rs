//! Dealsync Core Resilience: Pure-logic fault tolerance primitives
//!
//! # Overview
//!
//! Building blocks for keeping the order synchronizer healthy against a
//! flaky upstream CRM:
//!
//! - **Circuit Breaker**: fails fast once the upstream crosses a consecutive
//!   failure threshold, probes recovery after a cooldown
//! - **Adaptive Rate Limiter**: enforces a minimum spacing between outbound
//!   calls and adapts the spacing to observed outcomes
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - The CRM wire format or HTTP
//! - Storage systems
//! - Application-specific concerns
//!
//! The sync engine composes both primitives around each upstream fetch:
//!
//! ```text
//! sync cycle ──> AdaptiveRateLimiter.wait_for_next_request()
//!            ──> CircuitBreaker.call(fetch)
//!            ──> on_success / on_rate_limit / on_error
//! ```

pub mod circuit_breaker;
pub mod error;
pub mod rate_limiter;

// Re-export main types for convenience
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::ResilienceError;
pub use rate_limiter::{AdaptiveRateLimiter, RateLimiterConfig, RateLimiterStats};

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use dealsync_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    pub use super::error::ResilienceError;
    pub use super::rate_limiter::{AdaptiveRateLimiter, RateLimiterConfig, RateLimiterStats};
}
