//! # Circuit Breaker Implementation
//!
//! Provides fault isolation for external provider calls so a failing STT or
//! generation endpoint cannot cascade into every queued task. The implementation
//! follows the classic circuit breaker pattern with three states: Closed (normal
//! operation), Open (failing fast), and Half-Open (testing recovery).
//!
//! Failure counting is taxonomy-aware: only infrastructure failures (network,
//! timeout, rate limit, service errors) move the breaker. Validation and
//! authentication errors pass through uncounted so the breaker never masks a
//! bad credential or a programming bug as a provider outage.

use crate::error::{Result, ScribeError};
use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - limited calls allowed to test provider health
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open, // Default to safest state
        }
    }
}

/// Core circuit breaker implementation with atomic state management
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,

    /// Current circuit state (atomic for cheap reads)
    state: AtomicU8,

    /// Configuration parameters
    config: CircuitBreakerConfig,

    /// Metrics tracking protected by mutex
    metrics: Arc<Mutex<CircuitBreakerMetrics>>,

    /// Time when circuit was opened (for recovery timeout calculations)
    opened_at: Arc<Mutex<Option<Instant>>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: String, config: CircuitBreakerConfig) -> Self {
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_secs = config.recovery_timeout.as_secs(),
            success_threshold = config.success_threshold,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            metrics: Arc::new(Mutex::new(CircuitBreakerMetrics::new())),
            opened_at: Arc::new(Mutex::new(None)),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Execute an operation with circuit breaker protection.
    ///
    /// If the circuit is open and the recovery timeout has not elapsed, the
    /// operation is not invoked and `ScribeError::CircuitOpen` is returned.
    /// Once the timeout elapses the breaker moves to half-open and admits a
    /// limited number of probe calls.
    pub async fn call<F, T, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.should_allow_call().await {
            return Err(ScribeError::CircuitOpen {
                component: self.name.clone(),
            });
        }

        let start_time = Instant::now();
        let result = operation().await;
        let duration = start_time.elapsed();

        match &result {
            Ok(_) => {
                self.record_success(duration).await;
            }
            Err(err) if err.counts_toward_breaker() => {
                self.record_failure(duration).await;
            }
            Err(err) => {
                // Uncounted error family: record the call, leave state alone.
                debug!(
                    component = %self.name,
                    category = %err.category(),
                    "Error not counted toward circuit breaker"
                );
                let mut metrics = self.metrics.lock().await;
                metrics.total_calls += 1;
                metrics.total_duration += duration;
            }
        }

        result
    }

    /// Check if a call should be allowed based on current state
    async fn should_allow_call(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let opened_at = self.opened_at.lock().await;
                if let Some(opened_time) = *opened_at {
                    if opened_time.elapsed() >= self.config.recovery_timeout {
                        drop(opened_at);
                        self.transition_to_half_open().await;
                        // Admit this call as the first probe.
                        let mut metrics = self.metrics.lock().await;
                        metrics.half_open_probes = 1;
                        true
                    } else {
                        false
                    }
                } else {
                    // Open with no timestamp recorded; allow rather than wedge.
                    warn!(component = %self.name, "Circuit open but no timestamp recorded");
                    true
                }
            }
            CircuitState::HalfOpen => {
                let mut metrics = self.metrics.lock().await;
                if metrics.half_open_probes < u64::from(self.config.success_threshold) {
                    metrics.half_open_probes += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful operation
    async fn record_success(&self, duration: Duration) {
        let mut metrics = self.metrics.lock().await;
        metrics.total_calls += 1;
        metrics.success_count += 1;
        metrics.total_duration += duration;

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis(),
            "🟢 Operation succeeded"
        );

        match self.state() {
            CircuitState::HalfOpen => {
                metrics.half_open_successes += 1;
                if metrics.half_open_successes >= u64::from(self.config.success_threshold) {
                    drop(metrics);
                    self.transition_to_closed().await;
                }
            }
            CircuitState::Closed => {
                metrics.consecutive_failures = 0;
            }
            CircuitState::Open => {
                warn!(component = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    /// Record a counted failure
    async fn record_failure(&self, duration: Duration) {
        let mut metrics = self.metrics.lock().await;
        metrics.total_calls += 1;
        metrics.failure_count += 1;
        metrics.total_duration += duration;

        warn!(
            component = %self.name,
            duration_ms = duration.as_millis(),
            consecutive_failures = metrics.consecutive_failures + 1,
            "🔴 Operation failed"
        );

        match self.state() {
            CircuitState::Closed => {
                metrics.consecutive_failures += 1;
                if metrics.consecutive_failures >= u64::from(self.config.failure_threshold) {
                    drop(metrics);
                    self.transition_to_open().await;
                }
            }
            CircuitState::HalfOpen => {
                // Any failure during recovery testing reopens immediately.
                drop(metrics);
                self.transition_to_open().await;
            }
            CircuitState::Open => {}
        }
    }

    /// Transition to closed state (normal operation)
    async fn transition_to_closed(&self) {
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);

        let mut metrics = self.metrics.lock().await;
        metrics.consecutive_failures = 0;
        metrics.half_open_probes = 0;
        metrics.half_open_successes = 0;

        let mut opened_at = self.opened_at.lock().await;
        *opened_at = None;

        info!(
            component = %self.name,
            total_calls = metrics.total_calls,
            "🟢 Circuit breaker closed (recovered)"
        );
    }

    /// Transition to open state (failing fast)
    async fn transition_to_open(&self) {
        self.state.store(CircuitState::Open as u8, Ordering::Release);

        let mut opened_at = self.opened_at.lock().await;
        *opened_at = Some(Instant::now());

        let mut metrics = self.metrics.lock().await;
        metrics.half_open_probes = 0;
        metrics.half_open_successes = 0;

        warn!(
            component = %self.name,
            consecutive_failures = metrics.consecutive_failures,
            failure_threshold = self.config.failure_threshold,
            recovery_timeout_secs = self.config.recovery_timeout.as_secs(),
            "🔴 Circuit breaker opened (failing fast)"
        );
    }

    /// Transition to half-open state (testing recovery)
    async fn transition_to_half_open(&self) {
        self.state
            .store(CircuitState::HalfOpen as u8, Ordering::Release);

        let mut metrics = self.metrics.lock().await;
        metrics.half_open_probes = 0;
        metrics.half_open_successes = 0;

        info!(
            component = %self.name,
            success_threshold = self.config.success_threshold,
            "🟡 Circuit breaker half-open (testing recovery)"
        );
    }

    /// Manual override back to closed state, for admin and test use
    pub async fn reset(&self) {
        warn!(component = %self.name, "Circuit breaker manually reset");
        self.transition_to_closed().await;
    }

    /// Force circuit to open state (emergency stop)
    pub async fn force_open(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced open");
        self.transition_to_open().await;
    }

    /// Get current metrics snapshot
    pub async fn metrics(&self) -> CircuitBreakerMetrics {
        let metrics = self.metrics.lock().await;
        let mut snapshot = metrics.clone();

        snapshot.current_state = self.state();

        if metrics.total_calls > 0 {
            snapshot.failure_rate = metrics.failure_count as f64 / metrics.total_calls as f64;
            snapshot.success_rate = metrics.success_count as f64 / metrics.total_calls as f64;

            if metrics.success_count > 0 {
                snapshot.average_duration = metrics.total_duration / metrics.success_count as u32;
            }
        }

        snapshot
    }

    /// Get component name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if circuit is healthy (closed state with low failure rate)
    pub async fn is_healthy(&self) -> bool {
        if self.state() != CircuitState::Closed {
            return false;
        }

        let metrics = self.metrics.lock().await;
        if metrics.total_calls < 10 {
            // Too few calls to determine health
            return true;
        }

        let failure_rate = metrics.failure_count as f64 / metrics.total_calls as f64;
        failure_rate < 0.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn transient_err() -> ScribeError {
        ScribeError::ServiceUnavailable {
            provider: "test".to_string(),
            message: "503".to_string(),
        }
    }

    fn test_config(failure_threshold: u32, recovery_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout: Duration::from_millis(recovery_ms),
            success_threshold: 1,
        }
    }

    #[tokio::test]
    async fn test_circuit_breaker_normal_operation() {
        let circuit = CircuitBreaker::new("test".to_string(), test_config(3, 100));

        assert_eq!(circuit.state(), CircuitState::Closed);

        let result = circuit.call(|| async { Ok("success") }).await;
        assert!(result.is_ok());

        let metrics = circuit.metrics().await;
        assert_eq!(metrics.total_calls, 1);
        assert_eq!(metrics.success_count, 1);
        assert_eq!(metrics.failure_count, 0);
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_on_failures() {
        let circuit = CircuitBreaker::new("test".to_string(), test_config(2, 100));

        let _ = circuit.call(|| async { Err::<(), _>(transient_err()) }).await;
        assert_eq!(circuit.state(), CircuitState::Closed);

        let _ = circuit.call(|| async { Err::<(), _>(transient_err()) }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        // Next call should fail fast without invoking the operation.
        let mut invoked = false;
        let result = circuit
            .call(|| {
                invoked = true;
                async { Ok("should not execute") }
            })
            .await;
        assert!(matches!(result, Err(ScribeError::CircuitOpen { .. })));
        assert!(!invoked);
    }

    #[tokio::test]
    async fn test_uncounted_errors_do_not_open_circuit() {
        let circuit = CircuitBreaker::new("test".to_string(), test_config(1, 100));

        // Validation and auth failures pass through without tripping the breaker.
        let _ = circuit
            .call(|| async { Err::<(), _>(ScribeError::Validation("bad input".to_string())) })
            .await;
        let _ = circuit
            .call(|| async {
                Err::<(), _>(ScribeError::AuthenticationFailed {
                    provider: "test".to_string(),
                    message: "bad key".to_string(),
                })
            })
            .await;

        assert_eq!(circuit.state(), CircuitState::Closed);

        // A single counted failure still opens at threshold 1.
        let _ = circuit.call(|| async { Err::<(), _>(transient_err()) }).await;
        assert_eq!(circuit.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_circuit_breaker_recovery() {
        let circuit = CircuitBreaker::new("test".to_string(), test_config(1, 50));

        let _ = circuit.call(|| async { Err::<(), _>(transient_err()) }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        sleep(Duration::from_millis(60)).await;

        // Next call transitions to half-open, probes once, and closes on success.
        let result = circuit.call(|| async { Ok("success") }).await;
        assert!(result.is_ok());
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let circuit = CircuitBreaker::new("test".to_string(), test_config(1, 50));

        let _ = circuit.call(|| async { Err::<(), _>(transient_err()) }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        sleep(Duration::from_millis(60)).await;

        let _ = circuit.call(|| async { Err::<(), _>(transient_err()) }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        // And the reopened circuit fails fast again.
        let result = circuit.call(|| async { Ok(()) }).await;
        assert!(matches!(result, Err(ScribeError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn test_manual_reset_and_force_open() {
        let circuit = CircuitBreaker::new("test".to_string(), test_config(1, 1000));

        circuit.force_open().await;
        assert_eq!(circuit.state(), CircuitState::Open);

        circuit.reset().await;
        assert_eq!(circuit.state(), CircuitState::Closed);
    }
}
