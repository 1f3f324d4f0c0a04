//! Best-effort pub/sub fan-out of bridge lifecycle events.
//!
//! Generalized from the teacher's `StreamingSink` telemetry sink: a
//! `tokio::sync::broadcast` channel under the hood, non-blocking delivery
//! (a lagging subscriber drops messages and is counted, never blocks the
//! publisher), with an optional per-subscriber destination-address filter
//! layered on top since not every subscriber cares about every transfer.
//!
//! `broadcast`'s lag signal is only visible on the receiver side
//! (`RecvError::Lagged`), so counting drops means every subscription goes
//! through `Subscription`, which absorbs `Lagged` into the shared counter
//! and resumes from the next available event rather than surfacing it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::chain::EvmAddress;
use crate::domain::transfer::{TransferId, TransferState};

/// A notification about a transfer's lifecycle, delivered best-effort to
/// subscribers of the Notification API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BridgeEvent {
    /// Maps to the Notification API's `TransferCreated`.
    TransferAdmitted { transfer_id: TransferId, dest_address: EvmAddress },
    /// Maps to `TransferConfirmationAdvanced`: fired every time a listener
    /// reports a new confirmation count, independent of whether it also
    /// crosses a state boundary.
    ConfirmationAdvanced { transfer_id: TransferId, confirmations: u32, required_confirmations: u32 },
    /// Maps to `TransferCompleted`/`TransferExpired` (via `to`), and to
    /// `TransferFailed` when `to` is `Failed` without an accompanying
    /// `RelayFailed` (e.g. the expiry sweep never reaches relay at all).
    StateChanged { transfer_id: TransferId, from: TransferState, to: TransferState },
    RelaySubmitted { transfer_id: TransferId, home_tx_hash: String },
    /// Maps to `TransferFailed`.
    RelayFailed { transfer_id: TransferId, reason: String },
    DeadLettered { transfer_id: TransferId },
}

impl BridgeEvent {
    fn dest_address(&self) -> Option<EvmAddress> {
        match self {
            BridgeEvent::TransferAdmitted { dest_address, .. } => Some(*dest_address),
            _ => None,
        }
    }
}

/// Fan-out publisher. Cloning is cheap; all clones share one broadcast
/// channel and one drop counter.
#[derive(Clone)]
pub struct Notifier {
    sender: Arc<broadcast::Sender<BridgeEvent>>,
    dropped: Arc<AtomicU64>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender: Arc::new(sender), dropped: Arc::new(AtomicU64::new(0)) }
    }

    /// Publish an event. Never blocks and never fails the caller: a full
    /// subscriber queue causes that subscriber to miss the event, which is
    /// reflected in `dropped_count` once that subscriber next polls, not
    /// propagated as an error here.
    pub fn publish(&self, event: BridgeEvent) {
        if self.sender.send(event).is_err() {
            // No active subscribers; not counted as a drop since nobody lagged.
        }
    }

    /// Subscribe to every event.
    pub fn subscribe(&self) -> Subscription {
        Subscription { inner: self.sender.subscribe(), dropped: self.dropped.clone() }
    }

    /// Subscribe to events concerning only transfers addressed to
    /// `dest_address` (events with no destination, like `DeadLettered`,
    /// are delivered to every subscriber regardless of filter).
    pub fn subscribe_filtered(&self, dest_address: EvmAddress) -> FilteredSubscription {
        FilteredSubscription { inner: self.subscribe(), dest_address }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total events dropped across every subscriber that has ever lagged
    /// behind the broadcast channel's buffer.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// A subscription to every event. Transparently absorbs broadcast lag: if
/// this subscriber falls behind the channel's buffer, `recv` counts the
/// skipped messages into the shared `dropped` counter and resumes from the
/// next available event instead of surfacing `RecvError::Lagged`.
pub struct Subscription {
    inner: broadcast::Receiver<BridgeEvent>,
    dropped: Arc<AtomicU64>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Result<BridgeEvent, broadcast::error::RecvError> {
        loop {
            match self.inner.recv().await {
                Ok(event) => return Ok(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    self.dropped.fetch_add(skipped, Ordering::Relaxed);
                }
                Err(err @ broadcast::error::RecvError::Closed) => return Err(err),
            }
        }
    }
}

/// A subscription that only yields events matching a destination address.
pub struct FilteredSubscription {
    inner: Subscription,
    dest_address: EvmAddress,
}

impl FilteredSubscription {
    /// Await the next event matching this subscription's filter, skipping
    /// ones that don't. Returns `Err` only when the channel itself closes,
    /// per `broadcast::Receiver::recv`'s own semantics (lag is absorbed by
    /// the inner `Subscription` and counted, never surfaced here).
    pub async fn recv(&mut self) -> Result<BridgeEvent, broadcast::error::RecvError> {
        loop {
            let event = self.inner.recv().await?;
            match event.dest_address() {
                Some(addr) if addr != self.dest_address => continue,
                _ => return Ok(event),
            }
        }
    }
}
