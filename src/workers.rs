//! Tick- and channel-driven background loops the `Supervisor` starts
//! alongside the listeners: retry-queue processing, transfer expiry
//! sweeping, replay-store garbage collection, and draining a listener's
//! output channels into the `TransferManager`.
//!
//! These are free functions rather than methods on `RetryQueue`/`ReplayStore`
//! because driving them requires the `TransferManager` that interprets what
//! a due item or an aged transfer means; the storage-layer types only expose
//! the per-tick primitives (`due_items`, `purge_expired`). Each function's
//! signature is shaped to drop straight into `Supervisor::supervise`'s
//! `Fn() -> Fut` closure.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::chain::SourceTxHash;
use crate::domain::error::BridgeError;
use crate::domain::event::SourceEvent;
use crate::domain::retry_item::RetryOperation;
use crate::replay_store::ReplayStore;
use crate::retry_queue::RetryQueue;
use crate::transfer_manager::TransferManager;

/// Drives the retry queue: on a fixed tick (default 5s, spec.md §4.3),
/// dispatches every due item to the matching `TransferManager` operation.
pub async fn run_retry_worker(
    retry_queue: Arc<RetryQueue>,
    manager: Arc<TransferManager>,
    tick: Duration,
    cancel: CancellationToken,
) -> Result<(), BridgeError> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(tick) => {}
        }

        for item in retry_queue.due_items()? {
            let result = match item.operation {
                RetryOperation::RelayOnce => manager.relay_once(item.transfer_id).await,
                RetryOperation::OnConfirmation => {
                    manager.check_relay_confirmation(item.transfer_id).await
                }
            };
            if let Err(err) = result {
                tracing::error!(
                    transfer_id = %item.transfer_id,
                    operation = ?item.operation,
                    error = %err,
                    "retry worker tick failed"
                );
            }
        }
    }
}

/// Sweeps every transfer for age-out on a fixed tick. `TransferManager::expire`
/// is itself a no-op for transfers that aren't due, so this just needs to
/// offer every transfer up each tick.
pub async fn run_expiry_sweeper(
    manager: Arc<TransferManager>,
    tick: Duration,
    cancel: CancellationToken,
) -> Result<(), BridgeError> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(tick) => {}
        }

        for transfer in manager.list_transfers()? {
            if let Err(err) = manager.expire(transfer.transfer_id).await {
                tracing::error!(
                    transfer_id = %transfer.transfer_id,
                    error = %err,
                    "expiry sweep failed for transfer"
                );
            }
        }
    }
}

/// Drains a `Listener`'s two output channels into the `TransferManager` —
/// the glue between `Listener::run` and everything downstream of it.
/// `admit` and `on_confirmation` each take their own shard lock per call, so
/// the two channels are drained concurrently rather than one at a time;
/// nothing here blocks the other on a slow store write.
pub async fn run_listener_pump(
    manager: Arc<TransferManager>,
    mut events_rx: mpsc::Receiver<SourceEvent>,
    mut confirmations_rx: mpsc::Receiver<(SourceTxHash, u32)>,
    cancel: CancellationToken,
) -> Result<(), BridgeError> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            event = events_rx.recv() => {
                match event {
                    Some(event) => {
                        if let Err(err) = manager.admit(event).await {
                            tracing::error!(error = %err, "listener pump failed to admit event");
                        }
                    }
                    None => return Ok(()),
                }
            }
            confirmation = confirmations_rx.recv() => {
                match confirmation {
                    Some((tx_hash, confirmations)) => match manager.find_by_source_tx_hash(&tx_hash) {
                        Ok(Some(transfer)) => {
                            if let Err(err) =
                                manager.on_confirmation(transfer.transfer_id, confirmations).await
                            {
                                tracing::error!(
                                    transfer_id = %transfer.transfer_id,
                                    error = %err,
                                    "listener pump failed to apply confirmation"
                                );
                            }
                        }
                        Ok(None) => {
                            tracing::debug!(
                                tx_hash = %tx_hash,
                                "confirmation update for unknown transfer, ignoring"
                            );
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "listener pump failed to look up transfer by tx hash");
                        }
                    },
                    None => return Ok(()),
                }
            }
        }
    }
}

/// Purges expired replay entries on a fixed tick, bounding how far the
/// durable replay bucket grows between restarts.
pub async fn run_replay_gc(
    replay_store: Arc<ReplayStore>,
    tick: Duration,
    cancel: CancellationToken,
) -> Result<(), BridgeError> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(tick) => {}
        }

        let purged = replay_store.purge_expired()?;
        if purged > 0 {
            tracing::debug!(purged, "replay store gc pass complete");
        }
    }
}
