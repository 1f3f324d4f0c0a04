//! Canonical source-chain event representation and the token/amount types
//! that travel with it.

use std::fmt;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::chain::{Chain, EvmAddress, SolAddress, SourceTxHash};
use crate::domain::error::ValidationError;

/// A token identifier, chain-tagged by where its contract/mint lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenContract {
    Evm(EvmAddress),
    Sol(SolAddress),
}

impl fmt::Display for TokenContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenContract::Evm(addr) => write!(f, "{addr}"),
            TokenContract::Sol(addr) => write!(f, "{addr}"),
        }
    }
}

/// Token metadata carried alongside a transfer amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub symbol: String,
    pub contract: TokenContract,
    pub decimals: u8,
}

/// Arbitrary-precision unsigned transfer amount, in the token's minor units.
///
/// Construction rejects zero: a zero-value transfer is a validation failure,
/// not a degenerate Transfer that flows through the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount(U256);

impl Amount {
    pub fn new(value: U256) -> Result<Self, ValidationError> {
        if value.is_zero() {
            return Err(ValidationError::ZeroAmount);
        }
        Ok(Amount(value))
    }

    pub fn value(&self) -> U256 {
        self.0
    }
}

/// A source address on whichever chain emitted the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceAddress {
    Evm(EvmAddress),
    Sol(SolAddress),
}

impl fmt::Display for SourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceAddress::Evm(addr) => write!(f, "{addr}"),
            SourceAddress::Sol(addr) => write!(f, "{addr}"),
        }
    }
}

/// Canonicalized event read from a chain listener, before it's admitted
/// into a `Transfer`. One `SourceEvent` maps to at most one `Transfer`:
/// the `ReplayStore` deduplicates on `fingerprint()`, which is defined over
/// `source_chain`/`source_tx_hash`/`source_address`/`dest_address`/`token`/
/// `amount` — the fields that identify a transfer, not the observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEvent {
    pub source_chain: Chain,
    pub source_tx_hash: SourceTxHash,
    /// Block (EVM) or slot (Solana) the event was included in. Informational
    /// only — it is not part of the fingerprint, since a re-org can move an
    /// otherwise-identical event to a different block without changing what
    /// it represents.
    pub block_number: u64,
    pub source_address: SourceAddress,
    pub dest_address: EvmAddress,
    pub token: Token,
    pub amount: Amount,
    pub observed_at_unix_millis: u64,
}

impl SourceEvent {
    /// Stable fingerprint for replay detection: SHA-256 over the fields that
    /// uniquely identify this transfer, independent of when or where it was
    /// observed or how many confirmations it has.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source_chain.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(self.source_tx_hash.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(self.source_address.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(self.dest_address.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(self.token.contract.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(self.amount.value().to_string().as_bytes());
        let digest = hasher.finalize();
        hex_encode(&digest)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
