//! Transfer state machine data model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::chain::{Chain, EvmAddress, SourceTxHash};
use crate::domain::error::BridgeError;
use crate::domain::event::{Amount, SourceAddress, SourceEvent, Token};

/// Schema version written into every persisted `Transfer` record.
pub const TRANSFER_SCHEMA_VERSION: u16 = 1;

/// Opaque, time-ordered transfer identifier. Backed by UUIDv7 so
/// lexicographic order on the bytes matches creation order, which keeps the
/// `transfers` storage bucket roughly insertion-ordered without a separate
/// index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(Uuid);

impl TransferId {
    pub fn new() -> Self {
        TransferId(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// States a `Transfer` moves through. Terminal states are `Completed`,
/// `Failed`, and `Expired` — once in one of those, no further transition is
/// valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferState {
    Pending,
    Confirming,
    Relaying,
    Completed,
    Failed,
    Expired,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferState::Completed | TransferState::Failed | TransferState::Expired)
    }

    /// Whether `self -> next` is one of the transitions the state machine
    /// allows. `Expired` is reachable from any non-terminal state (age-out
    /// can fire at any point before relay completes).
    pub fn can_transition_to(self, next: TransferState) -> bool {
        use TransferState::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (Pending, Confirming) => true,
            (Confirming, Relaying) => true,
            (Relaying, Completed) => true,
            (Relaying, Failed) => true,
            (_, Expired) => !self.is_terminal(),
            _ => false,
        }
    }
}

/// A transfer in flight between the source chain and the home chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub schema_version: u16,
    pub transfer_id: TransferId,
    pub source_chain: Chain,
    pub source_tx_hash: SourceTxHash,
    pub source_address: SourceAddress,
    pub dest_address: EvmAddress,
    pub token: Token,
    pub amount: Amount,
    pub state: TransferState,
    pub confirmations: u32,
    pub required_confirmations: u32,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub home_tx_hash: Option<String>,
    pub created_at_unix_millis: u64,
    pub updated_at_unix_millis: u64,
    /// Set iff `state == Completed`.
    pub completed_at_unix_millis: Option<u64>,
    /// `completed_at_unix_millis - created_at_unix_millis`. Set alongside
    /// `completed_at_unix_millis`.
    pub processing_latency_millis: Option<u64>,
}

impl Transfer {
    pub fn from_event(
        transfer_id: TransferId,
        event: SourceEvent,
        required_confirmations: u32,
        now_unix_millis: u64,
    ) -> Self {
        Transfer {
            schema_version: TRANSFER_SCHEMA_VERSION,
            transfer_id,
            source_chain: event.source_chain,
            source_tx_hash: event.source_tx_hash,
            source_address: event.source_address,
            dest_address: event.dest_address,
            token: event.token,
            amount: event.amount,
            state: TransferState::Pending,
            confirmations: 0,
            required_confirmations,
            attempts: 0,
            last_error: None,
            home_tx_hash: None,
            created_at_unix_millis: now_unix_millis,
            updated_at_unix_millis: now_unix_millis,
            completed_at_unix_millis: None,
            processing_latency_millis: None,
        }
    }

    /// Apply a state transition, enforcing the state machine's legal-edge
    /// rules. Does not mutate `self` on rejection. Transitioning into
    /// `Completed` records `completed_at_unix_millis` and
    /// `processing_latency_millis` in the same step, so the two can never
    /// go out of sync with `state`.
    pub fn transition(&mut self, next: TransferState, now_unix_millis: u64) -> Result<(), BridgeError> {
        if !self.state.can_transition_to(next) {
            return Err(BridgeError::InvalidTransition { from: self.state, to: next });
        }
        self.state = next;
        self.updated_at_unix_millis = now_unix_millis;
        if next == TransferState::Completed {
            self.completed_at_unix_millis = Some(now_unix_millis);
            self.processing_latency_millis =
                Some(now_unix_millis.saturating_sub(self.created_at_unix_millis));
        }
        Ok(())
    }

    pub fn is_expired(&self, now_unix_millis: u64, max_transfer_age_millis: u64) -> bool {
        !self.state.is_terminal()
            && now_unix_millis.saturating_sub(self.created_at_unix_millis) >= max_transfer_age_millis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chain::SourceTxHash;
    use crate::domain::event::TokenContract;
    use alloy_primitives::U256;

    fn sample_transfer() -> Transfer {
        let event = SourceEvent {
            source_chain: Chain::Evm,
            source_tx_hash: SourceTxHash::Evm([9u8; 32]),
            block_number: 42,
            source_address: SourceAddress::Evm(
                EvmAddress::from_hex("0x0000000000000000000000000000000000000002").unwrap(),
            ),
            dest_address: EvmAddress::from_hex("0x0000000000000000000000000000000000000003")
                .unwrap(),
            token: Token {
                symbol: "USDC".to_string(),
                contract: TokenContract::Evm(
                    EvmAddress::from_hex("0x0000000000000000000000000000000000000004").unwrap(),
                ),
                decimals: 6,
            },
            amount: Amount::new(U256::from(100u64)).unwrap(),
            observed_at_unix_millis: 0,
        };
        Transfer::from_event(TransferId::new(), event, 12, 1_000)
    }

    #[test]
    fn new_transfer_starts_pending() {
        let t = sample_transfer();
        assert_eq!(t.state, TransferState::Pending);
        assert_eq!(t.attempts, 0);
    }

    #[test]
    fn legal_transition_sequence_succeeds() {
        let mut t = sample_transfer();
        t.transition(TransferState::Confirming, 2_000).unwrap();
        t.transition(TransferState::Relaying, 3_000).unwrap();
        t.transition(TransferState::Completed, 4_000).unwrap();
        assert_eq!(t.state, TransferState::Completed);
        assert_eq!(t.updated_at_unix_millis, 4_000);
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        let mut t = sample_transfer();
        let err = t.transition(TransferState::Relaying, 2_000).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidTransition { .. }));
        assert_eq!(t.state, TransferState::Pending);
    }

    #[test]
    fn terminal_states_reject_any_further_transition() {
        let mut t = sample_transfer();
        t.transition(TransferState::Confirming, 2_000).unwrap();
        t.transition(TransferState::Relaying, 3_000).unwrap();
        t.transition(TransferState::Failed, 4_000).unwrap();

        let err = t.transition(TransferState::Completed, 5_000).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidTransition { .. }));
    }

    #[test]
    fn expiry_fires_once_max_age_elapsed() {
        let t = sample_transfer();
        assert!(!t.is_expired(1_500, 1_000));
        assert!(t.is_expired(2_000, 1_000));
    }

    #[test]
    fn terminal_transfer_is_never_expired() {
        let mut t = sample_transfer();
        t.transition(TransferState::Confirming, 1_100).unwrap();
        t.transition(TransferState::Relaying, 1_200).unwrap();
        t.transition(TransferState::Completed, 1_300).unwrap();
        assert!(!t.is_expired(999_999, 1_000));
    }

    #[test]
    fn completion_records_timestamp_and_latency() {
        let mut t = sample_transfer();
        assert_eq!(t.completed_at_unix_millis, None);
        assert_eq!(t.processing_latency_millis, None);

        t.transition(TransferState::Confirming, 1_200).unwrap();
        t.transition(TransferState::Relaying, 1_500).unwrap();
        t.transition(TransferState::Completed, 2_300).unwrap();

        assert_eq!(t.completed_at_unix_millis, Some(2_300));
        assert_eq!(t.processing_latency_millis, Some(2_300 - 1_000));
    }

    #[test]
    fn non_completing_transitions_leave_completion_fields_unset() {
        let mut t = sample_transfer();
        t.transition(TransferState::Confirming, 1_100).unwrap();
        t.transition(TransferState::Relaying, 1_200).unwrap();
        t.transition(TransferState::Failed, 1_300).unwrap();
        assert_eq!(t.completed_at_unix_millis, None);
        assert_eq!(t.processing_latency_millis, None);
    }
}
