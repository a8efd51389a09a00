//! # Resilience Module
//!
//! Fault tolerance for the external services the dictation pipeline depends
//! on. Flaky STT and generation endpoints are the norm, not the exception, so
//! every provider call goes through this layer.
//!
//! ## Architecture
//!
//! - **Circuit Breakers**: isolate failing providers so queued work fails fast
//!   instead of piling up behind a dead endpoint
//! - **Retry**: bounded exponential backoff honoring provider retry-after
//!   hints, composed with the breaker
//! - **Rate Limiter**: persisted sliding-window call budgets per provider
//! - **Metrics**: per-breaker and system-wide health reporting
//!
//! ## Usage
//!
//! ```rust,no_run
//! use scribe_core::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy, retry_api_call};
//! use scribe_core::error::ScribeError;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), ScribeError> {
//! let breaker = CircuitBreaker::new(
//!     "transcription".to_string(),
//!     CircuitBreakerConfig::for_transcription(),
//! );
//!
//! let policy = RetryPolicy::for_provider_calls();
//! let transcript = retry_api_call(&policy, "transcribe", Some(&breaker), || async {
//!     // Provider call here
//!     Ok::<_, ScribeError>("transcript text".to_string())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod manager;
pub mod metrics;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use config::{CircuitBreakerConfig, GlobalCircuitBreakerSettings};
pub use manager::CircuitBreakerManager;
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
pub use rate_limiter::{RateLimit, RateLimitDecision, RateLimiter};
pub use retry::{retry_api_call, RetryPolicy};
