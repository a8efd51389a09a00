#![allow(clippy::doc_markdown)] // Allow technical terms like SQLite, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Scribe Core
//!
//! Rust core for a medical dictation assistant: the engine that recordings of
//! a clinical visit flow through on their way to becoming documents.
//!
//! ## Overview
//!
//! Scribe Core coordinates concurrent transcription and document generation
//! against flaky external AI services. The host front-end enqueues work and
//! subscribes to progress events; the core owns the worker pool, the batch
//! bookkeeping, the resilience layer guarding every provider call, and the
//! local SQLite store holding recordings and generated documents.
//!
//! ## Architecture
//!
//! Work flows: enqueue → worker claims task → pipeline transcribes and
//! generates the requested documents → results persist to SQLite → progress
//! events drain through a single dispatcher loop. Provider calls pass through
//! a persisted rate limiter, a per-component circuit breaker, and bounded
//! retry with provider-hinted backoff.
//!
//! ## Module Organization
//!
//! - [`queue`] - Bounded task queue, batch bookkeeping, worker dispatch
//! - [`resilience`] - Circuit breakers, retry with backoff, rate limiting
//! - [`pipeline`] - The production task executor calling providers
//! - [`providers`] - STT / generation / TTS abstractions and HTTP backends
//! - [`database`] - SQLite pool, migrations, allowlisted column updates
//! - [`models`] - Recording data model
//! - [`events`] - Progress event channel and dispatcher
//! - [`commands`] - Closed command enum dispatched to handlers
//! - [`context`] - Dependency-injected service graph with lifecycle
//! - [`config`] - Layered configuration with validation
//! - [`error`] - Normalized error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scribe_core::config::ScribeConfig;
//! use scribe_core::context::ServiceContext;
//! use scribe_core::queue::{ProcessOptions, RecordingTaskRequest};
//! use scribe_core::constants::TaskPriority;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ScribeConfig::load(None)?;
//! let (context, mut dispatcher) = ServiceContext::initialize(config).await?;
//!
//! dispatcher.subscribe(|event| println!("{}", event.summary()));
//! tokio::spawn(dispatcher.run());
//!
//! let task_id = context.queue.add_recording(RecordingTaskRequest {
//!     recording_id: 1,
//!     file_path: "visit_001.wav".to_string(),
//!     options: ProcessOptions { generate_soap: true, ..Default::default() },
//!     priority: TaskPriority::Normal,
//! })?;
//! println!("queued {task_id}");
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod config;
pub mod constants;
pub mod context;
pub mod database;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod queue;
pub mod resilience;

pub use commands::{Command, CommandOutcome};
pub use config::ScribeConfig;
pub use constants::{DocumentKind, TaskPriority};
pub use context::ServiceContext;
pub use error::{ErrorCategory, Result, ScribeError};
pub use events::{EventDispatcher, ProcessingEvent};
pub use queue::{
    Batch, BatchOptions, BatchRecordingRequest, BatchStatus, ProcessOptions, ProcessingQueue,
    RecordingTaskRequest, TaskStatus,
};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerManager, CircuitState, RateLimiter,
    RetryPolicy,
};
