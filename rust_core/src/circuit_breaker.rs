//! Circuit breaker for external API calls.
//!
//! Stops hammering an upstream API after repeated failures:
//! - Opens after `failure_threshold` consecutive failures
//! - Moves to half-open once `recovery_timeout` has elapsed
//! - Closes again after `success_threshold` successes while half-open

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCircuitState {
    /// Normal operation - requests are allowed
    Closed,
    /// Circuit is open - requests are blocked
    Open,
    /// Probing whether the upstream recovered
    HalfOpen,
}

/// Configuration for API circuit breaker
#[derive(Debug, Clone)]
pub struct ApiCircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for ApiCircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: ApiCircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
}

/// Shared by every concurrent caller of one API client.
///
/// # Example
/// ```ignore
/// let breaker = ApiCircuitBreaker::new("battlenet", ApiCircuitBreakerConfig::default());
///
/// if !breaker.is_available() {
///     return Err(ProviderError::CircuitOpen("battlenet".into()));
/// }
/// match call().await {
///     Ok(v) => { breaker.record_success(); Ok(v) }
///     Err(e) => { breaker.record_failure(); Err(e) }
/// }
/// ```
#[derive(Debug)]
pub struct ApiCircuitBreaker {
    name: String,
    config: ApiCircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl ApiCircuitBreaker {
    pub fn new(name: &str, config: ApiCircuitBreakerConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            inner: Mutex::new(Inner {
                state: ApiCircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// Whether a request may be sent now; may move Open -> HalfOpen
    pub fn is_available(&self) -> bool {
        let mut inner = self.inner.lock();
        let state = inner.state;
        match state {
            ApiCircuitState::Closed | ApiCircuitState::HalfOpen => true,
            ApiCircuitState::Open => {
                let recovered = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.config.recovery_timeout)
                    .unwrap_or(true);
                if recovered {
                    inner.state = ApiCircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                }
                recovered
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        if inner.state == ApiCircuitState::HalfOpen {
            inner.half_open_successes += 1;
            if inner.half_open_successes < self.config.success_threshold {
                return;
            }
            tracing::info!(
                "API circuit breaker '{}' closed after {} successful calls",
                self.name,
                inner.half_open_successes
            );
        }
        inner.state = ApiCircuitState::Closed;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        let tripped = inner.consecutive_failures >= self.config.failure_threshold;
        let state = inner.state;
        match state {
            ApiCircuitState::Closed if tripped => {
                inner.state = ApiCircuitState::Open;
                inner.opened_at = Some(Instant::now());
                tracing::warn!(
                    "API circuit breaker '{}' OPENED after {} consecutive failures",
                    self.name,
                    inner.consecutive_failures
                );
            }
            ApiCircuitState::HalfOpen => {
                inner.state = ApiCircuitState::Open;
                inner.opened_at = Some(Instant::now());
                tracing::warn!(
                    "API circuit breaker '{}' re-OPENED during half-open probe",
                    self.name
                );
            }
            _ => {}
        }
    }

    pub fn state(&self) -> ApiCircuitState {
        self.inner.lock().state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = ApiCircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        inner.opened_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32, recovery_ms: u64) -> ApiCircuitBreaker {
        ApiCircuitBreaker::new(
            "test_api",
            ApiCircuitBreakerConfig {
                failure_threshold,
                recovery_timeout: Duration::from_millis(recovery_ms),
                success_threshold: 2,
            },
        )
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = breaker(3, 10_000);
        assert!(cb.is_available());

        cb.record_failure();
        cb.record_failure();
        assert!(cb.is_available());

        cb.record_failure();
        assert_eq!(cb.state(), ApiCircuitState::Open);
        assert!(!cb.is_available());
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let cb = breaker(3, 10_000);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), ApiCircuitState::Closed);
        assert_eq!(cb.failure_count(), 1);
    }

    #[test]
    fn test_recovery_through_half_open() {
        let cb = breaker(2, 10);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), ApiCircuitState::Open);

        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.is_available());
        assert_eq!(cb.state(), ApiCircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), ApiCircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), ApiCircuitState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = breaker(1, 10);
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.is_available());

        cb.record_failure();
        assert_eq!(cb.state(), ApiCircuitState::Open);
        assert!(!cb.is_available());

        cb.reset();
        assert_eq!(cb.state(), ApiCircuitState::Closed);
    }
}
