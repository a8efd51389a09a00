//! # Retry with Exponential Backoff
//!
//! Wraps external provider calls with bounded retries. The policy honors
//! provider-supplied `retry_after` hints (slept exactly, no jitter), fails
//! fast on authentication and validation errors, and composes with a
//! [`CircuitBreaker`]: every attempt passes through the breaker, and if the
//! breaker opens mid-loop the remaining retries are abandoned immediately.

use crate::error::{Result, ScribeError};
use crate::resilience::CircuitBreaker;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry behavior for a family of external calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Multiplier applied to the delay after each attempt
    pub backoff_factor: f64,

    /// Upper bound on any computed delay
    pub max_delay: Duration,

    /// Apply random jitter to computed delays (never to retry_after hints)
    pub jitter: bool,
}

impl RetryPolicy {
    /// Policy for provider API calls (STT, generation, TTS)
    pub fn for_provider_calls() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }

    /// Policy for local SQLite writes contending on the database lock
    pub fn for_database_writes() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(50),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(2),
            jitter: true,
        }
    }

    /// Computed backoff delay for a given attempt (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponential = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = exponential.min(self.max_delay.as_secs_f64());

        let final_delay = if self.jitter {
            // Jitter in [0.5, 1.0) of the computed delay to decorrelate retries.
            capped * (0.5 + rand::thread_rng().gen::<f64>() * 0.5)
        } else {
            capped
        };

        Duration::from_secs_f64(final_delay)
    }

    /// Validate policy parameters
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.backoff_factor < 1.0 {
            return Err("backoff_factor must be at least 1.0".to_string());
        }
        if self.max_delay < self.initial_delay {
            return Err("max_delay must not be less than initial_delay".to_string());
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::for_provider_calls()
    }
}

/// Execute `operation` with retries under `policy`, optionally routing every
/// attempt through a circuit breaker.
///
/// Non-retryable errors (authentication, validation) propagate immediately.
/// A `RateLimited` error carrying a `retry_after` hint sleeps exactly that
/// duration instead of the computed backoff. An open circuit stops the loop.
pub async fn retry_api_call<F, T, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    breaker: Option<&CircuitBreaker>,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;

    loop {
        let result = match breaker {
            Some(cb) => cb.call(&mut operation).await,
            None => operation().await,
        };

        let err = match result {
            Ok(value) => {
                if attempt > 0 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        // The breaker opening mid-loop means the component is down for
        // everyone; further retries here would just burn the recovery window.
        if matches!(err, ScribeError::CircuitOpen { .. }) {
            warn!(
                operation = operation_name,
                attempt = attempt + 1,
                "Circuit opened during retry loop, abandoning retries"
            );
            return Err(err);
        }

        if !err.is_retryable() {
            debug!(
                operation = operation_name,
                category = %err.category(),
                "Non-retryable error, failing fast"
            );
            return Err(err);
        }

        if attempt >= policy.max_retries {
            warn!(
                operation = operation_name,
                attempts = attempt + 1,
                error = %err,
                "Retries exhausted"
            );
            return Err(err);
        }

        // Provider-specified delay wins over the computed backoff, exactly.
        let delay = match err.retry_after() {
            Some(hint) => hint,
            None => policy.delay_for_attempt(attempt),
        };

        warn!(
            operation = operation_name,
            attempt = attempt + 1,
            max_attempts = policy.max_retries + 1,
            delay_ms = delay.as_millis(),
            error = %err,
            "🔄 Retrying after failure"
        );

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitBreakerConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn no_jitter_policy(max_retries: u32, initial_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(initial_ms),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: false,
        }
    }

    #[test]
    fn test_delay_progression_without_jitter() {
        let policy = no_jitter_policy(5, 100);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 10.0,
            max_delay: Duration::from_secs(5),
            jitter: false,
        };
        assert_eq!(policy.delay_for_attempt(9), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            jitter: true,
            ..no_jitter_policy(3, 1000)
        };
        for _ in 0..100 {
            let delay = policy.delay_for_attempt(0);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_is_honored_exactly() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let policy = no_jitter_policy(3, 100);
        let started = tokio::time::Instant::now();

        let result = retry_api_call(&policy, "transcribe", None, move || {
            let attempts = Arc::clone(&attempts_clone);
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ScribeError::RateLimited {
                        provider: "deepgram".to_string(),
                        retry_after: Some(Duration::from_secs(2)),
                    })
                } else {
                    Ok("transcript")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "transcript");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        // The hint (2s) replaces the computed backoff (100ms) exactly.
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_backoff_between_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let policy = no_jitter_policy(2, 100);
        let started = tokio::time::Instant::now();

        let result: Result<()> = retry_api_call(&policy, "generate", None, move || {
            let attempts = Arc::clone(&attempts_clone);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ScribeError::ServiceUnavailable {
                    provider: "openai".to_string(),
                    message: "503".to_string(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // 100ms after attempt 1, 200ms after attempt 2.
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_auth_errors_fail_fast() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let policy = no_jitter_policy(5, 10);
        let result: Result<()> = retry_api_call(&policy, "generate", None, move || {
            let attempts = Arc::clone(&attempts_clone);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ScribeError::AuthenticationFailed {
                    provider: "openai".to_string(),
                    message: "invalid key".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(ScribeError::AuthenticationFailed { .. })
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_breaker_opening_stops_retry_loop() {
        let breaker = CircuitBreaker::new(
            "generation".to_string(),
            CircuitBreakerConfig {
                failure_threshold: 2,
                recovery_timeout: Duration::from_secs(60),
                success_threshold: 1,
            },
        );

        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let policy = no_jitter_policy(10, 1);
        let result: Result<()> = retry_api_call(&policy, "generate", Some(&breaker), move || {
            let attempts = Arc::clone(&attempts_clone);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ScribeError::ServiceUnavailable {
                    provider: "openai".to_string(),
                    message: "503".to_string(),
                })
            }
        })
        .await;

        // Breaker opened after 2 counted failures; the third attempt was
        // rejected without invoking the operation and the loop stopped.
        assert!(matches!(result, Err(ScribeError::CircuitOpen { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
