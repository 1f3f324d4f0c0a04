//! EVM chain `SourceClient`.
//!
//! Grounded on the log-filter/provider-call shape used by the x402
//! reference client: events are read as logs matching a bridge contract's
//! topic, decoded into `SourceEvent`s, with the block number standing in
//! for the cursor. The actual JSON-RPC transport is abstracted behind
//! `JsonRpcTransport` so this crate doesn't pull in a full provider stack —
//! the embedding binary supplies a concrete transport (HTTP, WebSocket, or
//! a test double).

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::chain::{Chain, EvmAddress, SourceTxHash};
use crate::domain::error::BridgeError;
use crate::domain::event::SourceEvent;

use super::{Cursor, PollResult, SourceClient};

/// Minimal JSON-RPC transport so `EvmSourceClient` stays decoupled from any
/// specific HTTP/WebSocket client implementation.
#[async_trait]
pub trait JsonRpcTransport: Send + Sync {
    async fn call(&self, method: &str, params: Value) -> Result<Value, BridgeError>;
}

/// Decodes raw `eth_getLogs` JSON into canonical `SourceEvent`s. Kept as a
/// separate trait so alternate bridge contract ABIs can be swapped in
/// without touching the polling loop.
pub trait LogDecoder: Send + Sync {
    fn decode(&self, log: &Value) -> Result<SourceEvent, BridgeError>;
}

pub struct EvmSourceClient<T: JsonRpcTransport, D: LogDecoder> {
    transport: T,
    decoder: D,
    bridge_contract: EvmAddress,
    required_confirmations: u32,
}

impl<T: JsonRpcTransport, D: LogDecoder> EvmSourceClient<T, D> {
    pub fn new(transport: T, decoder: D, bridge_contract: EvmAddress, required_confirmations: u32) -> Self {
        Self { transport, decoder, bridge_contract, required_confirmations }
    }
}

#[async_trait]
impl<T: JsonRpcTransport, D: LogDecoder> SourceClient for EvmSourceClient<T, D> {
    fn chain(&self) -> Chain {
        Chain::Evm
    }

    async fn poll_events(&self, from_cursor: Option<Cursor>) -> Result<PollResult, BridgeError> {
        let from_block = from_cursor.map(|c| c.0).unwrap_or(0);
        let latest = self.latest_block_number().await?;
        if latest < from_block {
            return Ok(PollResult { events: vec![], next_cursor: Cursor(from_block) });
        }

        let params = serde_json::json!([{
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": format!("0x{:x}", latest),
            "address": self.bridge_contract.to_string(),
        }]);
        let raw_logs = self
            .transport
            .call("eth_getLogs", params)
            .await?;

        let logs = raw_logs
            .as_array()
            .ok_or_else(|| BridgeError::TransientNetwork {
                dependency: "evm-rpc".to_string(),
                message: "eth_getLogs returned a non-array result".to_string(),
            })?;

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            events.push(self.decoder.decode(log)?);
        }

        Ok(PollResult { events, next_cursor: Cursor(latest.saturating_add(1)) })
    }

    async fn confirmations(&self, tx_hash: &SourceTxHash) -> Result<u32, BridgeError> {
        let SourceTxHash::Evm(hash) = tx_hash else {
            return Err(BridgeError::InternalInvariant(
                "EvmSourceClient.confirmations called with a non-EVM hash".to_string(),
            ));
        };

        let params = serde_json::json!([format!("0x{}", hex_encode(hash))]);
        let receipt = self.transport.call("eth_getTransactionReceipt", params).await?;
        let Some(block_number) = receipt.get("blockNumber").and_then(Value::as_str) else {
            return Ok(0); // not yet mined
        };
        let tx_block = u64::from_str_radix(block_number.trim_start_matches("0x"), 16)
            .map_err(|e| BridgeError::TransientNetwork { dependency: "evm-rpc".to_string(), message: e.to_string() })?;
        let latest = self.latest_block_number().await?;

        let confirmations = latest.saturating_sub(tx_block).saturating_add(1);
        Ok(confirmations.min(self.required_confirmations as u64) as u32)
    }
}

impl<T: JsonRpcTransport, D: LogDecoder> EvmSourceClient<T, D> {
    async fn latest_block_number(&self) -> Result<u64, BridgeError> {
        let result = self.transport.call("eth_blockNumber", serde_json::json!([])).await?;
        let hex = result.as_str().ok_or_else(|| BridgeError::TransientNetwork {
            dependency: "evm-rpc".to_string(),
            message: "eth_blockNumber did not return a string".to_string(),
        })?;
        u64::from_str_radix(hex.trim_start_matches("0x"), 16)
            .map_err(|e| BridgeError::TransientNetwork { dependency: "evm-rpc".to_string(), message: e.to_string() })
    }
}

fn hex_encode(bytes: &[u8; 32]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
