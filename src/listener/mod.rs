//! Per-chain listener: polls a `SourceClient` for new events and
//! confirmation depth, wraps every RPC round-trip in a timeout and the
//! chain's circuit breaker, and feeds admitted events downstream through a
//! bounded channel so a slow `TransferManager` applies backpressure instead
//! of unbounded buffering.
//!
//! Grounded on the per-chain ingestion task structure of a reference
//! ingestion manager: one long-lived task per chain, cancellation-aware,
//! restartable by a supervisor rather than self-healing internally.

pub mod evm;
pub mod sol;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::circuit_breaker::CircuitBreakerPolicy;
use crate::circuit_breaker_registry::CircuitBreakerRegistry;
use crate::domain::chain::{Chain, SourceTxHash};
use crate::domain::error::BridgeError;
use crate::domain::event::SourceEvent;
use crate::timeout::TimeoutPolicy;
use crate::ResilienceError;

/// Opaque position in a chain's event stream (block number for EVM, slot
/// for Solana). Listeners resume from their last-persisted cursor after a
/// restart rather than re-scanning from genesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor(pub u64);

/// A batch of newly observed events plus the cursor position after them.
pub struct PollResult {
    pub events: Vec<SourceEvent>,
    pub next_cursor: Cursor,
}

/// Abstraction over a chain's event source. Two implementations ship with
/// this crate (`evm::EvmSourceClient`, `sol::SolSourceClient`); tests use an
/// in-memory double so listener backpressure/cancellation/retry behavior is
/// exercised without a live RPC endpoint.
#[async_trait]
pub trait SourceClient: Send + Sync {
    fn chain(&self) -> Chain;

    /// Poll for events emitted since `from_cursor` (`None` means "from the
    /// configured start height"). Returns the events plus the cursor to
    /// resume from on the next call.
    async fn poll_events(&self, from_cursor: Option<Cursor>) -> Result<PollResult, BridgeError>;

    /// Number of confirmations a previously observed transaction currently
    /// has. Used to drive `TransferManager::on_confirmation`.
    async fn confirmations(&self, tx_hash: &SourceTxHash) -> Result<u32, BridgeError>;
}

/// Configuration for one listener instance.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub poll_interval: Duration,
    pub rpc_timeout: Duration,
    pub events_channel_capacity: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            rpc_timeout: Duration::from_secs(30),
            events_channel_capacity: 256,
        }
    }
}

/// Runs one chain's poll loop until cancelled.
///
/// `events_tx` carries newly admitted `SourceEvent`s downstream through a
/// bounded channel. The loop never blocks on a full channel: it uses
/// `try_send` and, if the channel is full, counts the overflow and leaves
/// the cursor where it was so the same batch — including the event that
/// overflowed — is re-polled on the next tick. Events already delivered
/// this tick are re-sent too; the `ReplayStore` absorbs the resulting
/// duplicates, so every overflow event is eventually re-observed rather
/// than silently lost.
pub struct Listener<C: SourceClient> {
    client: Arc<C>,
    config: ListenerConfig,
    breaker: CircuitBreakerPolicy,
    timeout: TimeoutPolicy,
    cursor: Option<Cursor>,
    overflow_count: Arc<AtomicU64>,
}

impl<C: SourceClient + 'static> Listener<C> {
    pub fn new(
        client: Arc<C>,
        config: ListenerConfig,
        registry: &CircuitBreakerRegistry,
        initial_cursor: Option<Cursor>,
    ) -> Self {
        let chain = client.chain();
        let breaker = registry.get(&format!("listener:{}", chain));
        let timeout = TimeoutPolicy::new(config.rpc_timeout)
            .expect("listener rpc_timeout must be a positive, bounded duration");
        Self {
            client,
            config,
            breaker,
            timeout,
            cursor: initial_cursor,
            overflow_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of events dropped back into the re-poll path because
    /// `events_tx` was full at admission time.
    pub fn overflow_count(&self) -> u64 {
        self.overflow_count.load(Ordering::Relaxed)
    }

    /// Run until `cancel` fires. Returns `Ok(())` on graceful shutdown;
    /// an `Err` return is treated by the supervisor as a crash worth
    /// restarting (a panic is also caught by the supervisor's boundary, but
    /// this loop prefers to surface fatal conditions as a `Result`).
    pub async fn run(
        mut self,
        events_tx: mpsc::Sender<SourceEvent>,
        confirmations_tx: mpsc::Sender<(SourceTxHash, u32)>,
        watched: Arc<dyn WatchedTxSource>,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            let cursor = self.cursor;
            let client = self.client.clone();
            let poll = self
                .breaker
                .execute(|| {
                    let client = client.clone();
                    let timeout = self.timeout.clone();
                    async move {
                        timeout
                            .execute(|| {
                                let client = client.clone();
                                async move {
                                    client
                                        .poll_events(cursor)
                                        .await
                                        .map_err(ResilienceError::Inner)
                                }
                            })
                            .await
                    }
                })
                .await;

            match poll {
                Ok(result) => {
                    let mut overflowed = false;
                    for event in result.events {
                        match events_tx.try_send(event) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                overflowed = true;
                                self.overflow_count.fetch_add(1, Ordering::Relaxed);
                                tracing::warn!(
                                    chain = %self.client.chain(),
                                    "events channel full, will re-poll this batch"
                                );
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => return Ok(()),
                        }
                    }
                    if !overflowed {
                        self.cursor = Some(result.next_cursor);
                    }
                }
                Err(err) if err.is_circuit_open() => {
                    tracing::warn!(chain = %self.client.chain(), "listener breaker open, skipping poll");
                }
                Err(err) => {
                    tracing::error!(chain = %self.client.chain(), error = %err, "listener poll failed");
                }
            }

            for tx_hash in watched.watched_tx_hashes().await {
                let client = self.client.clone();
                match self.breaker.execute(|| {
                    let client = client.clone();
                    let tx_hash = tx_hash;
                    async move { client.confirmations(&tx_hash).await.map_err(ResilienceError::Inner) }
                }).await {
                    Ok(count) => {
                        if confirmations_tx.send((tx_hash, count)).await.is_err() {
                            return Ok(());
                        }
                    }
                    Err(err) => {
                        tracing::debug!(chain = %self.client.chain(), error = %err, "confirmation poll failed");
                    }
                }
            }
        }
    }
}

/// Supplies the set of source transactions the listener should keep
/// checking confirmation depth for (i.e. transfers currently `Confirming`).
/// Implemented by `TransferManager` so the listener never needs its own
/// notion of transfer state.
#[async_trait]
pub trait WatchedTxSource: Send + Sync {
    async fn watched_tx_hashes(&self) -> Vec<SourceTxHash>;
}
