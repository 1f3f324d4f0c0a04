//! Chain identity and chain-tagged address/hash newtypes.
//!
//! Grounded on the EVM `Address`/log representation in the x402 reference
//! client and the base58 pubkey handling in the Chainflip Solana witness
//! module: addresses are validated at construction so a malformed value
//! never reaches the transfer state machine as a bare string.

use std::fmt;

use alloy_primitives::Address as EvmAddressInner;
use serde::{Deserialize, Serialize};

use crate::domain::error::ValidationError;

/// The three chain roles a `Transfer` ever touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chain {
    Evm,
    Sol,
    Home,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chain::Evm => write!(f, "evm"),
            Chain::Sol => write!(f, "sol"),
            Chain::Home => write!(f, "home"),
        }
    }
}

/// 20-byte EVM address, validated at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvmAddress(EvmAddressInner);

impl EvmAddress {
    pub fn from_hex(s: &str) -> Result<Self, ValidationError> {
        s.parse::<EvmAddressInner>()
            .map(EvmAddress)
            .map_err(|_| ValidationError::MalformedAddress { chain: Chain::Evm, value: s.to_string() })
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        self.0.as_ref()
    }
}

impl fmt::Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 32-byte Solana pubkey, base58-encoded at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SolAddress([u8; 32]);

impl SolAddress {
    pub fn from_base58(s: &str) -> Result<Self, ValidationError> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| ValidationError::MalformedAddress { chain: Chain::Sol, value: s.to_string() })?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ValidationError::MalformedAddress { chain: Chain::Sol, value: s.to_string() })?;
        Ok(SolAddress(array))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for SolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

/// Source-chain transaction hash, chain-tagged so an EVM hash can never be
/// compared against a Solana signature by accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceTxHash {
    Evm([u8; 32]),
    Sol([u8; 64]),
}

impl fmt::Display for SourceTxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceTxHash::Evm(bytes) => write!(f, "0x{}", hex_encode(bytes)),
            SourceTxHash::Sol(bytes) => write!(f, "{}", bs58::encode(bytes).into_string()),
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evm_address_round_trips() {
        let addr = EvmAddress::from_hex("0x0000000000000000000000000000000000000001").unwrap();
        assert_eq!(addr.to_string().to_lowercase(), "0x0000000000000000000000000000000000000001");
    }

    #[test]
    fn evm_address_rejects_malformed_input() {
        let err = EvmAddress::from_hex("not-an-address").unwrap_err();
        assert!(matches!(err, ValidationError::MalformedAddress { chain: Chain::Evm, .. }));
    }

    #[test]
    fn sol_address_round_trips() {
        let original = [7u8; 32];
        let encoded = bs58::encode(original).into_string();
        let addr = SolAddress::from_base58(&encoded).unwrap();
        assert_eq!(addr.as_bytes(), &original);
    }

    #[test]
    fn sol_address_rejects_wrong_length() {
        let encoded = bs58::encode([1u8; 10]).into_string();
        let err = SolAddress::from_base58(&encoded).unwrap_err();
        assert!(matches!(err, ValidationError::MalformedAddress { chain: Chain::Sol, .. }));
    }
}
