//! Runtime configuration surface.
//!
//! Mirrors spec.md §6's "Configuration surface" list field-for-field. This
//! core doesn't parse TOML or environment variables itself (no file/env
//! wiring is specified) — it exposes `BridgeConfig` with a `Default`
//! matching the documented defaults, and the embedding binary is
//! responsible for populating and validating it before handing it to the
//! constructors in `circuit_breaker_registry`, `retry_queue`, and
//! `transfer_manager`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-source-chain confirmation requirements (`requiredConfirmations[chain]`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RequiredConfirmations {
    pub evm: u32,
    pub sol: u32,
}

impl Default for RequiredConfirmations {
    fn default() -> Self {
        Self { evm: 12, sol: 32 }
    }
}

impl RequiredConfirmations {
    /// Resolve the threshold for the chain a `SourceEvent` was observed on.
    /// `Chain::Home` never originates a `SourceEvent` and has no configured
    /// threshold of its own; it falls back to the EVM figure rather than
    /// panicking.
    pub fn for_chain(&self, chain: crate::domain::chain::Chain) -> u32 {
        match chain {
            crate::domain::chain::Chain::Evm => self.evm,
            crate::domain::chain::Chain::Sol => self.sol,
            crate::domain::chain::Chain::Home => self.evm,
        }
    }
}

/// `circuitBreaker.failureThreshold` / `circuitBreaker.resetTimeout`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: usize,
    pub reset_timeout_millis: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self { failure_threshold: 5, reset_timeout_millis: Duration::from_secs(5 * 60).as_millis() as u64 }
    }
}

impl CircuitBreakerSettings {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_millis)
    }
}

/// `listener.pollInterval` / `listener.subscriptionReconnectBackoff`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerSettings {
    pub poll_interval_millis: u64,
    pub subscription_reconnect_backoff_millis: u64,
    pub rpc_timeout_millis: u64,
    pub events_channel_capacity: usize,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            poll_interval_millis: 5_000,
            subscription_reconnect_backoff_millis: 1_000,
            rpc_timeout_millis: 30_000,
            events_channel_capacity: 256,
        }
    }
}

impl ListenerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_millis)
    }
}

/// Tick intervals for the background worker loops in `workers`: retry queue
/// processing, transfer expiry sweeping, replay store GC. spec.md §4.3 pins
/// the retry worker's default at 5s; the sweep and GC ticks aren't named by
/// the spec, so these pick conservative defaults in the same spirit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    pub retry_tick_millis: u64,
    pub expiry_sweep_tick_millis: u64,
    pub replay_gc_tick_millis: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            retry_tick_millis: 5_000,
            expiry_sweep_tick_millis: 30_000,
            replay_gc_tick_millis: 60_000,
        }
    }
}

impl WorkerSettings {
    pub fn retry_tick(&self) -> Duration {
        Duration::from_millis(self.retry_tick_millis)
    }

    pub fn expiry_sweep_tick(&self) -> Duration {
        Duration::from_millis(self.expiry_sweep_tick_millis)
    }

    pub fn replay_gc_tick(&self) -> Duration {
        Duration::from_millis(self.replay_gc_tick_millis)
    }
}

/// Full recognized configuration surface, spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub required_confirmations: RequiredConfirmations,
    /// ReplayStore retention window (`replayTTL`).
    pub replay_ttl_millis: u64,
    /// RetryQueue parameters (`maxAttempts`, `baseDelay`, `maxDelay`).
    pub max_attempts: u32,
    pub base_delay_millis: u64,
    pub max_delay_millis: u64,
    pub circuit_breaker: CircuitBreakerSettings,
    pub listener: ListenerSettings,
    /// Expiry threshold (`maxTransferAge`).
    pub max_transfer_age_millis: u64,
    /// TransferManager sharding (`shardCount`).
    pub shard_count: usize,
    pub workers: WorkerSettings,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            required_confirmations: RequiredConfirmations::default(),
            replay_ttl_millis: Duration::from_secs(24 * 60 * 60).as_millis() as u64,
            max_attempts: 8,
            base_delay_millis: 1_000,
            max_delay_millis: 60_000,
            circuit_breaker: CircuitBreakerSettings::default(),
            listener: ListenerSettings::default(),
            max_transfer_age_millis: Duration::from_secs(24 * 60 * 60).as_millis() as u64,
            shard_count: 16,
            workers: WorkerSettings::default(),
        }
    }
}

/// A recognized configuration value outside the bounds the core can operate
/// under.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("shard_count must be at least 1")]
    ZeroShardCount,
    #[error("max_attempts must be at least 1")]
    ZeroMaxAttempts,
    #[error("base_delay_millis ({base}) must not exceed max_delay_millis ({max})")]
    BaseDelayExceedsMax { base: u64, max: u64 },
    #[error("circuit_breaker.failure_threshold must be at least 1")]
    ZeroFailureThreshold,
    #[error("replay_ttl_millis must be greater than zero")]
    ZeroReplayTtl,
    #[error("workers.{field} must be greater than zero")]
    ZeroWorkerTick { field: &'static str },
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shard_count == 0 {
            return Err(ConfigError::ZeroShardCount);
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroMaxAttempts);
        }
        if self.base_delay_millis > self.max_delay_millis {
            return Err(ConfigError::BaseDelayExceedsMax {
                base: self.base_delay_millis,
                max: self.max_delay_millis,
            });
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        if self.replay_ttl_millis == 0 {
            return Err(ConfigError::ZeroReplayTtl);
        }
        if self.workers.retry_tick_millis == 0 {
            return Err(ConfigError::ZeroWorkerTick { field: "retry_tick_millis" });
        }
        if self.workers.expiry_sweep_tick_millis == 0 {
            return Err(ConfigError::ZeroWorkerTick { field: "expiry_sweep_tick_millis" });
        }
        if self.workers.replay_gc_tick_millis == 0 {
            return Err(ConfigError::ZeroWorkerTick { field: "replay_gc_tick_millis" });
        }
        Ok(())
    }
}

impl From<&BridgeConfig> for crate::transfer_manager::TransferManagerConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            shard_count: config.shard_count,
            required_confirmations: config.required_confirmations,
            max_transfer_age_millis: config.max_transfer_age_millis,
            max_relay_attempts: config.max_attempts,
        }
    }
}

impl From<&BridgeConfig> for crate::circuit_breaker::CircuitBreakerConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            failure_threshold: config.circuit_breaker.failure_threshold,
            recovery_timeout: config.circuit_breaker.reset_timeout(),
            // Not part of the recognized configuration surface (spec.md §6
            // names only failureThreshold/resetTimeout); every half-open
            // probe in this codebase allows exactly one in-flight call.
            half_open_max_calls: 1,
        }
    }
}

impl From<&BridgeConfig> for crate::listener::ListenerConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            poll_interval: config.listener.poll_interval(),
            rpc_timeout: config.listener.rpc_timeout(),
            events_channel_capacity: config.listener.events_channel_capacity,
        }
    }
}

impl crate::retry_queue::RetryQueue {
    /// Build a `RetryQueue` from the relevant slice of a `BridgeConfig`:
    /// `maxAttempts`/`baseDelay`/`maxDelay`, with spec.md §4.3's recommended
    /// bounded +/-25% jitter.
    pub fn from_bridge_config(
        store: crate::storage::Store,
        clock: std::sync::Arc<dyn crate::clock::WallClock>,
        config: &BridgeConfig,
    ) -> Self {
        let backoff = crate::backoff::Backoff::exponential(Duration::from_millis(config.base_delay_millis))
            .with_max(Duration::from_millis(config.max_delay_millis));
        Self::new(store, clock, backoff, crate::jitter::Jitter::bounded(0.25), config.max_attempts)
    }
}

impl crate::replay_store::ReplayStore {
    /// Build a `ReplayStore` from `BridgeConfig::replay_ttl_millis`.
    pub fn from_bridge_config(
        store: crate::storage::Store,
        clock: std::sync::Arc<dyn crate::clock::WallClock>,
        config: &BridgeConfig,
    ) -> Self {
        Self::new(store, clock, config.replay_ttl_millis)
    }
}
