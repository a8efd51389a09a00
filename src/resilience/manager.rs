//! # Circuit Breaker Manager
//!
//! Manages one circuit breaker per external component (transcription,
//! generation, speech synthesis). Provides centralized lookup, metrics
//! aggregation, and emergency controls.

use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState,
    GlobalCircuitBreakerSettings, SystemCircuitBreakerMetrics,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Manager for multiple circuit breakers across provider components
#[derive(Debug)]
pub struct CircuitBreakerManager {
    /// Collection of circuit breakers by component name
    circuit_breakers: Arc<RwLock<HashMap<String, Arc<CircuitBreaker>>>>,

    /// Per-component configuration overrides
    component_configs: HashMap<String, CircuitBreakerConfig>,

    /// Fallback configuration for components without an override
    default_config: CircuitBreakerConfig,

    /// Global limits
    settings: GlobalCircuitBreakerSettings,
}

impl CircuitBreakerManager {
    /// Create a manager with the standard per-component presets
    pub fn new(settings: GlobalCircuitBreakerSettings) -> Self {
        let mut component_configs = HashMap::new();
        component_configs.insert(
            "transcription".to_string(),
            CircuitBreakerConfig::for_transcription(),
        );
        component_configs.insert(
            "generation".to_string(),
            CircuitBreakerConfig::for_generation(),
        );
        component_configs.insert(
            "speech_synthesis".to_string(),
            CircuitBreakerConfig::for_speech_synthesis(),
        );

        Self {
            circuit_breakers: Arc::new(RwLock::new(HashMap::new())),
            component_configs,
            default_config: CircuitBreakerConfig::default(),
            settings,
        }
    }

    /// Override the configuration for a component (applies to new instances)
    pub fn set_component_config(&mut self, component_name: &str, config: CircuitBreakerConfig) {
        self.component_configs
            .insert(component_name.to_string(), config);
        info!(
            component = component_name,
            "Updated circuit breaker configuration (applies to new instances)"
        );
    }

    /// Get or create circuit breaker for a component
    pub async fn get_circuit_breaker(&self, component_name: &str) -> Arc<CircuitBreaker> {
        {
            let breakers = self.circuit_breakers.read().await;
            if let Some(breaker) = breakers.get(component_name) {
                return Arc::clone(breaker);
            }
        }

        let mut breakers = self.circuit_breakers.write().await;

        // Double-check pattern (another task might have created it)
        if let Some(breaker) = breakers.get(component_name) {
            return Arc::clone(breaker);
        }

        if breakers.len() >= self.settings.max_circuit_breakers {
            warn!(
                component = component_name,
                current_count = breakers.len(),
                max_allowed = self.settings.max_circuit_breakers,
                "🚨 Maximum circuit breaker limit reached"
            );
        }

        let config = self
            .component_configs
            .get(component_name)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone());

        let breaker = Arc::new(CircuitBreaker::new(component_name.to_string(), config));
        breakers.insert(component_name.to_string(), Arc::clone(&breaker));

        info!(
            component = component_name,
            total_circuit_breakers = breakers.len(),
            "Created new circuit breaker"
        );

        breaker
    }

    /// Get all circuit breaker names
    pub async fn list_components(&self) -> Vec<String> {
        let breakers = self.circuit_breakers.read().await;
        breakers.keys().cloned().collect()
    }

    /// Get metrics for a specific circuit breaker
    pub async fn get_component_metrics(
        &self,
        component_name: &str,
    ) -> Option<CircuitBreakerMetrics> {
        let breakers = self.circuit_breakers.read().await;
        match breakers.get(component_name) {
            Some(breaker) => Some(breaker.metrics().await),
            None => None,
        }
    }

    /// Get system-wide circuit breaker metrics
    pub async fn get_system_metrics(&self) -> SystemCircuitBreakerMetrics {
        let mut system_metrics = SystemCircuitBreakerMetrics::new();

        let breakers = self.circuit_breakers.read().await;
        for (name, breaker) in breakers.iter() {
            let metrics = breaker.metrics().await;
            system_metrics.add_circuit_breaker(name.clone(), metrics);
        }

        system_metrics
    }

    /// Force open all circuit breakers (emergency stop)
    pub async fn force_open_all(&self) {
        warn!("🚨 Forcing all circuit breakers open (emergency stop)");

        let breakers = self.circuit_breakers.read().await;
        for breaker in breakers.values() {
            breaker.force_open().await;
        }
    }

    /// Reset all circuit breakers to closed (emergency recovery)
    pub async fn reset_all(&self) {
        warn!("🚨 Resetting all circuit breakers to closed");

        let breakers = self.circuit_breakers.read().await;
        for breaker in breakers.values() {
            breaker.reset().await;
        }
    }

    /// Get count of circuit breakers by state
    pub async fn get_state_summary(&self) -> HashMap<CircuitState, usize> {
        let system_metrics = self.get_system_metrics().await;
        system_metrics.count_by_state()
    }

    /// Check overall system health based on circuit breaker states
    pub async fn system_health_score(&self) -> f64 {
        let system_metrics = self.get_system_metrics().await;
        system_metrics.health_score()
    }
}

impl Clone for CircuitBreakerManager {
    fn clone(&self) -> Self {
        Self {
            circuit_breakers: Arc::clone(&self.circuit_breakers),
            component_configs: self.component_configs.clone(),
            default_config: self.default_config.clone(),
            settings: self.settings.clone(),
        }
    }
}
