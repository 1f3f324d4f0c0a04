#![forbid(unsafe_code)]

//! # Bridge Relay Core
//!
//! A cross-chain bridge relay: it watches token-transfer events on an EVM
//! chain and a Solana-family chain, deduplicates them, drives each transfer
//! through a state machine, and relays the corresponding transaction onto a
//! home chain — all with the resilience patterns a long-lived service
//! talking to unreliable RPC endpoints actually needs.
//!
//! ## Layers
//!
//! - **Resilience primitives** (`backoff`, `jitter`, `retry`, `circuit_breaker`,
//!   `bulkhead`, `timeout`): generic, chain-agnostic building blocks.
//! - **Domain model** (`domain`): chain-tagged addresses, the canonical
//!   `SourceEvent`, and the `Transfer` state machine.
//! - **Storage** (`storage`, `replay_store`, `retry_queue`): durable,
//!   versioned persistence for transfers, replay-protection entries, and
//!   in-flight retries.
//! - **Listeners** (`listener`): per-chain polling loops that canonicalize
//!   raw chain events into `SourceEvent`s.
//! - **Dispatch** (`transfer_manager`, `relay`): the state machine driver
//!   that calls out to the home-chain relay endpoint.
//! - **Operations** (`supervisor`, `notifier`, `circuit_breaker_registry`):
//!   crash recovery, pub/sub fan-out, and per-dependency fault gating.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use bridge_relay_core::{
//!     Backoff, CircuitBreakerRegistry, CircuitBreakerConfig, Jitter, Notifier, ReplayStore,
//!     RetryQueue, Store, SystemWallClock,
//! };
//!
//! # fn build(path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::open(path)?;
//! let clock = Arc::new(SystemWallClock);
//! let replay_store = Arc::new(ReplayStore::new(store.clone(), clock.clone(), 24 * 60 * 60 * 1000));
//! let retry_queue = Arc::new(RetryQueue::new(
//!     store.clone(),
//!     clock.clone(),
//!     Backoff::exponential(Duration::from_secs(1)).with_max(Duration::from_secs(60)),
//!     Jitter::bounded(0.25),
//!     8,
//! ));
//! let breakers = CircuitBreakerRegistry::new(CircuitBreakerConfig {
//!     failure_threshold: 5,
//!     recovery_timeout: Duration::from_secs(300),
//!     half_open_max_calls: 1,
//! });
//! let _notifier = Notifier::new(1024);
//! let _ = (replay_store, retry_queue, breakers);
//! # Ok(())
//! # }
//! ```

mod backoff;
mod bulkhead;
mod circuit_breaker;
pub mod circuit_breaker_registry;
mod clock;
pub mod config;
pub mod domain;
mod error;
mod jitter;
pub mod listener;
pub mod notifier;
pub mod relay;
pub mod replay_store;
mod retry;
pub mod retry_queue;
mod sleeper;
pub mod storage;
pub mod supervisor;
pub mod telemetry;
mod timeout;
pub mod transfer_manager;
pub mod workers;

// Re-exports: generic resilience primitives, usable standalone or as the
// building blocks the bridge-specific modules above are assembled from.
pub use backoff::{
    Backoff, BackoffError, BackoffStrategy, ConstantBackoff, ExponentialBackoff, LinearBackoff,
    MAX_BACKOFF,
};
pub use bulkhead::{BulkheadError, BulkheadPolicy};
pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerPolicy, CircuitState,
};
pub use clock::{Clock, ManualWallClock, MonotonicClock, SystemWallClock, WallClock};
pub use error::ResilienceError;
pub use jitter::Jitter;
pub use retry::{BuildError, RetryPolicy, RetryPolicyBuilder};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use timeout::{TimeoutError, TimeoutLayer, TimeoutPolicy, MAX_TIMEOUT};

// Re-exports: bridge-specific assembly.
pub use circuit_breaker_registry::CircuitBreakerRegistry;
pub use config::{
    BridgeConfig, CircuitBreakerSettings, ConfigError, ListenerSettings, RequiredConfirmations,
    WorkerSettings,
};
pub use notifier::{BridgeEvent, FilteredSubscription, Notifier, Subscription};
pub use relay::{ConfirmOutcome, RelayClient, SubmitOutcome};
pub use replay_store::{AdmitOutcome, ReplayStats, ReplayStore};
pub use retry_queue::RetryQueue;
pub use storage::{Store, Versioned};
pub use supervisor::{default_restart_backoff, PanicEntry, Supervisor};
pub use transfer_manager::{AdmitResult, TransferManager, TransferManagerConfig};
pub use workers::{run_expiry_sweeper, run_replay_gc, run_retry_worker};

pub mod prelude;
