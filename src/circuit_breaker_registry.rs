//! Per-dependency circuit breaker registry.
//!
//! Spec 4.2 requires one `CircuitBreakerPolicy` instance per outbound
//! dependency (each chain listener's RPC, the home-chain relay submission).
//! The registry lazily creates and caches one breaker per dependency name so
//! callers never have to thread breaker instances through constructors by
//! hand.

use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerPolicy};
use dashmap::DashMap;
use std::sync::Arc;

/// Lazily-populated map of dependency name -> circuit breaker.
///
/// Cloning is cheap; all clones share the same underlying map.
#[derive(Clone)]
pub struct CircuitBreakerRegistry {
    breakers: Arc<DashMap<String, CircuitBreakerPolicy>>,
    default_config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    /// Create a registry where breakers not explicitly configured fall back
    /// to `default_config` on first use.
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self { breakers: Arc::new(DashMap::new()), default_config }
    }

    /// Fetch the breaker for `dependency`, creating it with the default
    /// config if this is the first time it's been named.
    pub fn get(&self, dependency: &str) -> CircuitBreakerPolicy {
        if let Some(existing) = self.breakers.get(dependency) {
            return existing.clone();
        }
        let breaker = CircuitBreakerPolicy::with_config(self.default_config.clone());
        self.breakers.entry(dependency.to_string()).or_insert(breaker).clone()
    }

    /// Install a breaker for `dependency` with a non-default config.
    ///
    /// Replaces any breaker already registered under that name.
    pub fn configure(&self, dependency: &str, config: CircuitBreakerConfig) {
        self.breakers.insert(dependency.to_string(), CircuitBreakerPolicy::with_config(config));
    }

    /// Names of every dependency that has had a breaker created so far.
    pub fn dependencies(&self) -> Vec<String> {
        self.breakers.iter().map(|entry| entry.key().clone()).collect()
    }
}
