use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Circuit breaker state
#[derive(Debug, Clone)]
enum BreakerState {
    /// Calls go through; counts consecutive transient failures
    Closed { failures: u32 },
    /// Calls are rejected until the reset timeout elapses
    Open { opened_at: Instant },
    /// One probe is allowed through to decide whether to close again
    HalfOpen,
}

/// Circuit breaker errors
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError {
    /// Circuit is open, request rejected
    #[error("Circuit breaker is open")]
    Open,
    /// Request failed
    #[error("Request failed: {0}")]
    Failed(castmark::Error),
}

/// Stops calling an upstream service after repeated transient failures
///
/// Only transient errors (timeouts, connection failures, 5xx and 429
/// answers) count toward the threshold. A not-found answer means the
/// service is healthy, so it resets the count like a success does.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Creates a closed breaker
    pub fn new(name: impl Into<String>, failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            state: Mutex::new(BreakerState::Closed { failures: 0 }),
        }
    }

    /// Name used in logs and errors
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs `future` unless the circuit is open
    ///
    /// The state lock is not held while the future runs, so in the half-open
    /// state concurrent callers may each send a probe.
    pub async fn call<F, T>(&self, future: F) -> Result<T, CircuitBreakerError>
    where
        F: Future<Output = Result<T, castmark::Error>>,
    {
        {
            let mut state = self.state.lock().await;

            if let BreakerState::Open { opened_at } = *state {
                if opened_at.elapsed() < self.reset_timeout {
                    return Err(CircuitBreakerError::Open);
                }
                info!(breaker = %self.name, "Circuit breaker half-open, probing upstream");
                *state = BreakerState::HalfOpen;
            }
        }

        let result = future.await;
        let mut state = self.state.lock().await;

        match result {
            Err(error) if error.is_transient() => {
                let failures = match *state {
                    BreakerState::Closed { failures } => failures + 1,
                    _ => self.failure_threshold,
                };

                if failures >= self.failure_threshold {
                    warn!(
                        breaker = %self.name,
                        failures,
                        error = %error,
                        "Circuit breaker opened"
                    );
                    *state = BreakerState::Open {
                        opened_at: Instant::now(),
                    };
                } else {
                    *state = BreakerState::Closed { failures };
                }

                Err(CircuitBreakerError::Failed(error))
            }
            result => {
                if matches!(*state, BreakerState::HalfOpen) {
                    info!(breaker = %self.name, "Circuit breaker closed");
                }
                *state = BreakerState::Closed { failures: 0 };

                result.map_err(CircuitBreakerError::Failed)
            }
        }
    }
}
