//! Retry queue record: a transfer operation scheduled to run again after a
//! transient failure.

use serde::{Deserialize, Serialize};

use crate::domain::transfer::TransferId;

pub const RETRY_ITEM_SCHEMA_VERSION: u16 = 1;

/// Which `TransferManager` operation the retry queue should re-drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryOperation {
    RelayOnce,
    OnConfirmation,
}

/// A single durable retry record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryItem {
    pub schema_version: u16,
    pub transfer_id: TransferId,
    pub operation: RetryOperation,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub next_attempt_at_unix_millis: u64,
    pub dead_lettered: bool,
}

impl RetryItem {
    pub fn new(
        transfer_id: TransferId,
        operation: RetryOperation,
        max_attempts: u32,
        next_attempt_at_unix_millis: u64,
    ) -> Self {
        RetryItem {
            schema_version: RETRY_ITEM_SCHEMA_VERSION,
            transfer_id,
            operation,
            attempts: 0,
            max_attempts,
            last_error: None,
            next_attempt_at_unix_millis,
            dead_lettered: false,
        }
    }

    pub fn is_due(&self, now_unix_millis: u64) -> bool {
        !self.dead_lettered && now_unix_millis >= self.next_attempt_at_unix_millis
    }

    /// Record a failed attempt, scheduling the next one or dead-lettering if
    /// `max_attempts` has been reached.
    pub fn record_failure(&mut self, error: String, next_attempt_at_unix_millis: u64) {
        self.attempts += 1;
        self.last_error = Some(error);
        if self.attempts >= self.max_attempts {
            self.dead_lettered = true;
        } else {
            self.next_attempt_at_unix_millis = next_attempt_at_unix_millis;
        }
    }
}
