//! Replay-protection record: the durable witness that a given source event
//! fingerprint has already been admitted.

use serde::{Deserialize, Serialize};

use crate::domain::transfer::TransferId;

pub const REPLAY_ENTRY_SCHEMA_VERSION: u16 = 1;

/// A durable record that a fingerprint has been seen, with the TTL bookkeeping
/// needed for `purgeExpired`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayEntry {
    pub schema_version: u16,
    pub fingerprint: String,
    pub transfer_id: TransferId,
    pub admitted_at_unix_millis: u64,
    pub expires_at_unix_millis: u64,
}

impl ReplayEntry {
    pub fn new(
        fingerprint: String,
        transfer_id: TransferId,
        admitted_at_unix_millis: u64,
        ttl_millis: u64,
    ) -> Self {
        ReplayEntry {
            schema_version: REPLAY_ENTRY_SCHEMA_VERSION,
            fingerprint,
            transfer_id,
            admitted_at_unix_millis,
            expires_at_unix_millis: admitted_at_unix_millis.saturating_add(ttl_millis),
        }
    }

    pub fn is_expired(&self, now_unix_millis: u64) -> bool {
        now_unix_millis >= self.expires_at_unix_millis
    }
}
