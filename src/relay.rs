//! Home-chain relay client contract.
//!
//! Per the design notes: the relay contract returns explicit variants
//! rather than strings, so mapping a legacy RPC's string error codes onto
//! these variants is an adapter's job, not the core's.

use async_trait::async_trait;

use crate::domain::error::BridgeError;
use crate::domain::transfer::Transfer;

/// Outcome of submitting a transfer to the home chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Accepted; `home_tx_hash` is now pending inclusion.
    Submitted { home_tx_hash: String },
    /// Rejected for a reason that may succeed on a later attempt (nonce
    /// contention, fee too low, mempool congestion).
    Retryable { reason: String },
    /// Rejected for a reason that will never succeed no matter how many
    /// times retried (e.g. destination contract reverts unconditionally).
    Fatal { reason: String },
}

/// Outcome of checking a previously submitted home-chain transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Pending,
    Confirmed,
    Rejected { reason: String },
}

/// Abstraction over the home-chain relay endpoint.
#[async_trait]
pub trait RelayClient: Send + Sync {
    async fn submit(&self, transfer: &Transfer) -> Result<SubmitOutcome, BridgeError>;
    async fn confirm(&self, home_tx_hash: &str) -> Result<ConfirmOutcome, BridgeError>;
}
