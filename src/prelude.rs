//! Convenient re-exports for assembling a bridge relay instance.
pub use crate::{
    backoff::{
        Backoff, BackoffError, BackoffStrategy, ConstantBackoff, ExponentialBackoff, LinearBackoff,
        MAX_BACKOFF,
    },
    bulkhead::{BulkheadError, BulkheadPolicy},
    circuit_breaker::{CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerPolicy, CircuitState},
    circuit_breaker_registry::CircuitBreakerRegistry,
    clock::{ManualWallClock, SystemWallClock, WallClock},
    config::{
        BridgeConfig, CircuitBreakerSettings, ConfigError, ListenerSettings, RequiredConfirmations,
        WorkerSettings,
    },
    domain::{
        Amount, BridgeError, Chain, EvmAddress, RetryItem, RetryOperation, SolAddress,
        SourceAddress, SourceEvent, SourceTxHash, Token, TokenContract, Transfer, TransferId,
        TransferState, ValidationError,
    },
    jitter::Jitter,
    listener::{Cursor, Listener, ListenerConfig, PollResult, SourceClient, WatchedTxSource},
    notifier::{BridgeEvent, FilteredSubscription, Notifier, Subscription},
    relay::{ConfirmOutcome, RelayClient, SubmitOutcome},
    replay_store::{AdmitOutcome, ReplayStats, ReplayStore},
    retry::{BuildError, RetryPolicy, RetryPolicyBuilder},
    retry_queue::RetryQueue,
    storage::{Store, Versioned},
    supervisor::{default_restart_backoff, PanicEntry, Supervisor},
    telemetry::{
        BulkheadEvent, CircuitBreakerEvent, FallbackSink, LogSink, MemorySink, MulticastSink,
        NullSink, PolicyEvent, RequestOutcome, RetryEvent, StreamingSink, TelemetrySink,
        TimeoutEvent,
    },
    timeout::{TimeoutError, TimeoutLayer, TimeoutPolicy, MAX_TIMEOUT},
    transfer_manager::{AdmitResult, TransferManager, TransferManagerConfig},
    workers::{run_expiry_sweeper, run_listener_pump, run_replay_gc, run_retry_worker},
    ResilienceError,
};
