//! Solana-family chain `SourceClient`.
//!
//! Grounded on the signature-status polling and commitment-level handling
//! used by the Chainflip Solana witness module: new events are discovered
//! via `getSignaturesForAddress` against the bridge program, with the
//! cursor standing in for the last-seen slot; confirmation depth comes from
//! `getSignatureStatuses`' `confirmations` field, treating a `finalized`
//! status as fully confirmed regardless of the raw count.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::chain::{Chain, SolAddress, SourceTxHash};
use crate::domain::error::BridgeError;
use crate::domain::event::SourceEvent;

use super::{Cursor, PollResult, SourceClient};

#[async_trait]
pub trait SolRpcTransport: Send + Sync {
    async fn call(&self, method: &str, params: Value) -> Result<Value, BridgeError>;
}

/// Decodes a raw Solana transaction (as returned by `getTransaction`) into
/// canonical `SourceEvent`s emitted by the bridge program.
pub trait InstructionDecoder: Send + Sync {
    fn decode(&self, tx: &Value) -> Result<Vec<SourceEvent>, BridgeError>;
}

pub struct SolSourceClient<T: SolRpcTransport, D: InstructionDecoder> {
    transport: T,
    decoder: D,
    bridge_program: SolAddress,
    required_confirmations: u32,
}

impl<T: SolRpcTransport, D: InstructionDecoder> SolSourceClient<T, D> {
    pub fn new(transport: T, decoder: D, bridge_program: SolAddress, required_confirmations: u32) -> Self {
        Self { transport, decoder, bridge_program, required_confirmations }
    }
}

#[async_trait]
impl<T: SolRpcTransport, D: InstructionDecoder> SourceClient for SolSourceClient<T, D> {
    fn chain(&self) -> Chain {
        Chain::Sol
    }

    async fn poll_events(&self, from_cursor: Option<Cursor>) -> Result<PollResult, BridgeError> {
        let until_signature_slot = from_cursor.map(|c| c.0);
        let params = serde_json::json!([
            self.bridge_program.to_string(),
            { "limit": 1000 },
        ]);
        let _ = until_signature_slot; // pagination cursor is opaque to getSignaturesForAddress

        let signatures = self.transport.call("getSignaturesForAddress", params).await?;
        let signatures = signatures.as_array().ok_or_else(|| BridgeError::TransientNetwork {
            dependency: "sol-rpc".to_string(),
            message: "getSignaturesForAddress returned a non-array result".to_string(),
        })?;

        let mut events = Vec::new();
        let mut max_slot = from_cursor.map(|c| c.0).unwrap_or(0);
        for entry in signatures {
            let Some(signature) = entry.get("signature").and_then(Value::as_str) else { continue };
            let slot = entry.get("slot").and_then(Value::as_u64).unwrap_or(0);
            if slot <= from_cursor.map(|c| c.0).unwrap_or(0) {
                continue;
            }
            max_slot = max_slot.max(slot);

            let tx = self
                .transport
                .call("getTransaction", serde_json::json!([signature, { "encoding": "json" }]))
                .await?;
            events.extend(self.decoder.decode(&tx)?);
        }

        Ok(PollResult { events, next_cursor: Cursor(max_slot) })
    }

    async fn confirmations(&self, tx_hash: &SourceTxHash) -> Result<u32, BridgeError> {
        let SourceTxHash::Sol(signature) = tx_hash else {
            return Err(BridgeError::InternalInvariant(
                "SolSourceClient.confirmations called with a non-Solana signature".to_string(),
            ));
        };

        let encoded = bs58::encode(signature).into_string();
        let params = serde_json::json!([[encoded]]);
        let response = self.transport.call("getSignatureStatuses", params).await?;

        let status = response
            .get("value")
            .and_then(Value::as_array)
            .and_then(|v| v.first())
            .cloned()
            .unwrap_or(Value::Null);

        if status.is_null() {
            return Ok(0);
        }

        if status.get("confirmationStatus").and_then(Value::as_str) == Some("finalized") {
            return Ok(self.required_confirmations);
        }

        let confirmations = status.get("confirmations").and_then(Value::as_u64).unwrap_or(0);
        Ok((confirmations as u32).min(self.required_confirmations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeTransport;

    #[async_trait]
    impl SolRpcTransport for FakeTransport {
        async fn call(&self, method: &str, _params: Value) -> Result<Value, BridgeError> {
            match method {
                "getSignaturesForAddress" => Ok(serde_json::json!([
                    { "signature": "sig1", "slot": 42 }
                ])),
                "getTransaction" => Ok(serde_json::json!({ "meta": {} })),
                "getSignatureStatuses" => Ok(serde_json::json!({
                    "value": [{ "confirmationStatus": "finalized" }]
                })),
                other => panic!("unexpected rpc call {other}"),
            }
        }
    }

    struct FakeDecoder;

    impl InstructionDecoder for FakeDecoder {
        fn decode(&self, _tx: &Value) -> Result<Vec<SourceEvent>, BridgeError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn poll_events_advances_cursor_to_max_seen_slot() {
        let client = SolSourceClient::new(
            FakeTransport,
            FakeDecoder,
            SolAddress::from_base58(&bs58::encode([3u8; 32]).into_string()).unwrap(),
            32,
        );
        let result = client.poll_events(Some(Cursor(10))).await.unwrap();
        assert_eq!(result.next_cursor, Cursor(42));
    }

    #[tokio::test]
    async fn finalized_status_reports_full_confirmations() {
        let client = SolSourceClient::new(
            FakeTransport,
            FakeDecoder,
            SolAddress::from_base58(&bs58::encode([3u8; 32]).into_string()).unwrap(),
            32,
        );
        let confirmations = client
            .confirmations(&SourceTxHash::Sol([0u8; 64]))
            .await
            .unwrap();
        assert_eq!(confirmations, 32);
    }
}
