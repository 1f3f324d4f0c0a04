//! Domain error types.
//!
//! `BridgeError` is the crate-wide error enum for bridge-domain operations,
//! sitting alongside (not replacing) the generic `crate::ResilienceError<E>`
//! used by the resilience primitives. The two compose: a `SourceClient` call
//! wrapped in a circuit breaker returns `ResilienceError<BridgeError>`.

use std::time::Duration;

use thiserror::Error;

use crate::domain::chain::Chain;
use crate::domain::transfer::TransferState;

/// A malformed chain identifier caught at construction time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("malformed {chain} address: {value}")]
    MalformedAddress { chain: Chain, value: String },
    #[error("zero amount is not a valid transfer amount")]
    ZeroAmount,
}

/// The six error kinds from the bridge's error-handling design, all folded
/// into one `thiserror`-derived enum so every fallible operation in the
/// crate returns the same `BridgeError` type.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A transient failure talking to a source/destination chain RPC.
    /// Safe to retry; does not imply anything about on-chain finality.
    #[error("transient network failure calling {dependency}: {message}")]
    TransientNetwork { dependency: String, message: String },

    /// `ReplayStore::admit` rejected an event it had already seen.
    #[error("duplicate event rejected: fingerprint {fingerprint} already admitted")]
    ReplayRejection { fingerprint: String },

    /// A structurally invalid input (malformed address, zero amount, bad
    /// decimals) that will never succeed no matter how many times retried.
    #[error("validation failed: {0}")]
    ValidationFailure(#[from] ValidationError),

    /// A policy explicitly forbade the operation (e.g. destination address
    /// on a deny-list, amount outside configured bounds).
    #[error("policy rejected transfer: {reason}")]
    PolicyRejection { reason: String },

    /// An invariant the state machine promises never breaks anyway broke;
    /// always a bug, never retried.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    /// The durable store failed to read or write a record.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// A caller asked to transition a `Transfer` from a state that cannot
    /// reach the requested state.
    #[error("invalid transfer state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: TransferState, to: TransferState },

    /// `relayOnce` or `onConfirmation` were called for an unknown transfer id.
    #[error("transfer not found: {transfer_id}")]
    TransferNotFound { transfer_id: String },

    /// The request was rejected outright because a circuit breaker for the
    /// named dependency was open.
    #[error("circuit open for {dependency} ({open_for:?})")]
    CircuitOpen { dependency: String, open_for: Duration },
}

impl BridgeError {
    /// Whether the caller should schedule a retry for this error, per the
    /// error-handling design's propagation policy: transient and storage
    /// failures retry, validation/policy/invariant failures never do.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::TransientNetwork { .. }
                | BridgeError::StorageFailure(_)
                | BridgeError::CircuitOpen { .. }
        )
    }
}
