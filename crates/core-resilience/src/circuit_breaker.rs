//! Circuit Breaker implementation for fault tolerance
//!
//! The circuit breaker prevents cascading failures by failing fast when the
//! upstream CRM is experiencing issues. It has three states:
//! - Closed: Normal operation, requests pass through
//! - Open: Upstream is unhealthy, requests fail immediately
//! - HalfOpen: Testing if the upstream has recovered

use super::error::ResilienceError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// State of the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally
    Closed,
    /// Circuit is open, requests fail immediately
    /// Next probe time indicates when to try half-open
    Open { next_probe: Instant },
    /// Circuit is half-open, testing upstream recovery
    HalfOpen,
}

/// Configuration for circuit breaker behavior
///
/// Fixed at construction; the sync cycle never overrides thresholds per call.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: usize,
    /// Duration to wait before transitioning from open to half-open
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(300),
        }
    }
}

/// Internal state of the circuit breaker
#[derive(Debug)]
struct CircuitBreakerState {
    /// Current state of the circuit
    state: CircuitState,
    /// Consecutive failure count; only a success clears it, so callers can
    /// still read how hard the upstream was failing while the circuit is open
    consecutive_failures: usize,
}

impl CircuitBreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
        }
    }
}

/// Circuit breaker for protecting against cascading failures
///
/// # Example
/// ```no_run
/// use dealsync_core_resilience::{CircuitBreaker, CircuitBreakerConfig, ResilienceError};
///
/// #[tokio::main]
/// async fn main() -> Result<(), ResilienceError> {
///     let breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
///
///     // Execute operation with circuit breaker protection
///     let result = breaker.call(|| async {
///         // Your upstream call here
///         Ok::<_, ResilienceError>(42)
///     }).await?;
///
///     println!("Result: {}", result);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    state: Arc<Mutex<CircuitBreakerState>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(CircuitBreakerState::new())),
        }
    }

    /// Create a new circuit breaker with default configuration
    pub fn new_default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Get the current state of the circuit breaker
    pub async fn state(&self) -> CircuitState {
        let state = self.state.lock().await;
        state.state
    }

    /// Get current consecutive failure count
    pub async fn failure_count(&self) -> usize {
        let state = self.state.lock().await;
        state.consecutive_failures
    }

    /// Reset the circuit breaker to closed state
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.state = CircuitState::Closed;
        state.consecutive_failures = 0;
    }

    /// Execute an operation with circuit breaker protection
    ///
    /// If the circuit is open and the cooldown has not elapsed, fails
    /// immediately with `CircuitOpen` without invoking the operation. The
    /// breaker never swallows the operation's error; it only decides whether
    /// to attempt the call.
    pub async fn call<F, Fut, T>(&self, op: F) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, ResilienceError>>,
    {
        // Check circuit state and potentially transition to half-open
        self.check_and_update_state().await?;

        // Execute the operation
        match op().await {
            Ok(result) => {
                self.on_success().await;
                Ok(result)
            }
            Err(e) => {
                self.on_failure().await;
                Err(e)
            }
        }
    }

    /// Check circuit state and update if necessary
    async fn check_and_update_state(&self) -> Result<(), ResilienceError> {
        let mut state = self.state.lock().await;

        match state.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open { next_probe } => {
                if Instant::now() >= next_probe {
                    // Transition to half-open for a single trial request
                    state.state = CircuitState::HalfOpen;
                    tracing::debug!("circuit breaker half-open, probing upstream");
                    Ok(())
                } else {
                    Err(ResilienceError::CircuitOpen)
                }
            }
            CircuitState::HalfOpen => Ok(()),
        }
    }

    /// Handle successful operation
    async fn on_success(&self) {
        let mut state = self.state.lock().await;

        match state.state {
            CircuitState::Closed => {
                state.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                // Probe succeeded, close the circuit
                state.state = CircuitState::Closed;
                state.consecutive_failures = 0;
                tracing::info!("circuit breaker closed after successful probe");
            }
            CircuitState::Open { .. } => {
                // Should not happen, but reset to closed if it does
                state.state = CircuitState::Closed;
                state.consecutive_failures = 0;
            }
        }
    }

    /// Handle failed operation
    async fn on_failure(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_failures += 1;

        match state.state {
            CircuitState::Closed => {
                if state.consecutive_failures >= self.config.failure_threshold {
                    state.state = CircuitState::Open {
                        next_probe: Instant::now() + self.config.cooldown,
                    };
                    tracing::warn!(
                        failures = state.consecutive_failures,
                        cooldown_s = self.config.cooldown.as_secs(),
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                // Any failure in half-open state reopens the circuit
                state.state = CircuitState::Open {
                    next_probe: Instant::now() + self.config.cooldown,
                };
                tracing::warn!("circuit breaker reopened after failed probe");
            }
            CircuitState::Open { .. } => {
                // Already open, nothing to do
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing_breaker(threshold: usize, cooldown: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown,
        })
    }

    #[tokio::test]
    async fn test_closed_to_open_at_threshold() {
        let breaker = failing_breaker(3, Duration::from_secs(300));

        // Two failures keep the circuit closed
        for _ in 0..2 {
            let result: Result<(), ResilienceError> = breaker
                .call(|| async { Err(ResilienceError::Upstream("boom".to_string())) })
                .await;
            assert!(result.is_err());
        }
        assert_eq!(breaker.state().await, CircuitState::Closed);
        assert_eq!(breaker.failure_count().await, 2);

        // Third failure trips the breaker
        let _: Result<(), ResilienceError> = breaker
            .call(|| async { Err(ResilienceError::Upstream("boom".to_string())) })
            .await;
        match breaker.state().await {
            CircuitState::Open { .. } => (),
            state => panic!("expected Open state, got {:?}", state),
        }
        assert_eq!(breaker.failure_count().await, 3);
    }

    #[tokio::test]
    async fn test_open_fails_fast_without_invoking() {
        let breaker = failing_breaker(1, Duration::from_secs(300));

        let _: Result<(), ResilienceError> = breaker
            .call(|| async { Err(ResilienceError::Upstream("boom".to_string())) })
            .await;

        // Circuit is open; the operation must not run
        let mut invoked = false;
        let result: Result<(), ResilienceError> = breaker
            .call(|| {
                invoked = true;
                async { Ok(()) }
            })
            .await;

        assert_eq!(result, Err(ResilienceError::CircuitOpen));
        assert!(!invoked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_closes_on_success() {
        let breaker = failing_breaker(1, Duration::from_secs(300));

        let _: Result<(), ResilienceError> = breaker
            .call(|| async { Err(ResilienceError::Timeout("deadline".to_string())) })
            .await;

        // Wait out the five minute cooldown on the paused clock
        tokio::time::advance(Duration::from_secs(301)).await;

        let mut invocations = 0;
        let result = breaker
            .call(|| {
                invocations += 1;
                async { Ok::<_, ResilienceError>(7) }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(invocations, 1);
        assert_eq!(breaker.state().await, CircuitState::Closed);
        assert_eq!(breaker.failure_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_reopens_on_failure() {
        let breaker = failing_breaker(1, Duration::from_secs(300));

        let _: Result<(), ResilienceError> = breaker
            .call(|| async { Err(ResilienceError::Upstream("boom".to_string())) })
            .await;

        tokio::time::advance(Duration::from_secs(301)).await;

        let result: Result<(), ResilienceError> = breaker
            .call(|| async { Err(ResilienceError::Upstream("still down".to_string())) })
            .await;
        assert!(result.is_err());

        match breaker.state().await {
            CircuitState::Open { .. } => (),
            state => panic!("expected Open state, got {:?}", state),
        }
    }

    #[tokio::test]
    async fn test_error_passthrough_unchanged() {
        let breaker = failing_breaker(3, Duration::from_secs(300));

        let result: Result<(), ResilienceError> = breaker
            .call(|| async { Err(ResilienceError::RateLimited("429".to_string())) })
            .await;

        assert_eq!(result, Err(ResilienceError::RateLimited("429".to_string())));
    }

    #[tokio::test]
    async fn test_reset() {
        let breaker = failing_breaker(1, Duration::from_secs(300));

        let _: Result<(), ResilienceError> = breaker
            .call(|| async { Err(ResilienceError::Upstream("boom".to_string())) })
            .await;

        breaker.reset().await;

        assert_eq!(breaker.state().await, CircuitState::Closed);
        assert_eq!(breaker.failure_count().await, 0);
    }
}
