//! # Service Context
//!
//! Explicitly constructed, dependency-injected service graph with a defined
//! lifecycle: everything is built in [`ServiceContext::initialize`], nothing
//! lives in module-level globals, and [`ServiceContext::shutdown`] tears the
//! system down in order (queue first, then persisted state, then the pool).

use crate::config::ScribeConfig;
use crate::database::{self, migrations, RecordingStore};
use crate::error::Result;
use crate::events::EventDispatcher;
use crate::pipeline::PipelineExecutor;
use crate::providers::ProviderSet;
use crate::queue::ProcessingQueue;
use crate::resilience::{
    CircuitBreakerManager, GlobalCircuitBreakerSettings, RateLimiter, RetryPolicy,
};
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// The wired service graph for one running core instance
pub struct ServiceContext {
    pub config: ScribeConfig,
    pub pool: SqlitePool,
    pub store: RecordingStore,
    pub limiter: Arc<RateLimiter>,
    pub breakers: CircuitBreakerManager,
    pub providers: ProviderSet,
    pub queue: ProcessingQueue,
    pub retry_policy: RetryPolicy,
}

impl ServiceContext {
    /// Build and start every service. Returns the context together with the
    /// event dispatcher so the caller can register subscribers before
    /// spawning its run loop.
    pub async fn initialize(config: ScribeConfig) -> Result<(Self, EventDispatcher)> {
        config.validate()?;

        let pool = database::connect(&config.database, &config.database_path()).await?;
        migrations::run_migrations(&pool).await?;
        let store = RecordingStore::new(pool.clone());

        let limiter = Arc::new(
            RateLimiter::new(
                config.rate_limits.providers.clone(),
                config.rate_limits.default,
            )
            .with_save_interval(Duration::from_secs(config.rate_limits.save_interval_secs))
            .with_idle_expiry(Duration::from_secs(config.rate_limits.idle_expiry_secs))
            .with_persistence(config.rate_limit_state_path())?,
        );

        let breakers = CircuitBreakerManager::new(GlobalCircuitBreakerSettings::default());
        let providers = ProviderSet::from_config(&config.providers, &config.provider_timeouts)?;
        let retry_policy = config.retry.to_policy();

        let (events, dispatcher) = EventDispatcher::channel();

        let executor = PipelineExecutor::new(
            providers.clone(),
            store.clone(),
            Arc::clone(&limiter),
            breakers.clone(),
            retry_policy.clone(),
            config.providers.generation.model.clone(),
        );

        let queue = ProcessingQueue::new(
            config.queue.clone(),
            Arc::new(executor),
            Arc::new(store.clone()),
            events,
        );
        queue.start();

        info!(
            database = %config.database_path().display(),
            max_concurrency = config.queue.max_concurrency,
            "🚀 Service context initialized"
        );

        Ok((
            Self {
                config,
                pool,
                store,
                limiter,
                breakers,
                providers,
                queue,
                retry_policy,
            },
            dispatcher,
        ))
    }

    /// Orderly teardown: drain the queue, flush persisted state, close the pool.
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;

        if let Err(err) = self.limiter.save_now() {
            tracing::warn!(error = %err, "Failed to flush rate limiter state during shutdown");
        }

        self.pool.close().await;
        info!("Service context shut down");
    }
}
