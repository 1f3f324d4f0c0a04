//! Durable retry queue.
//!
//! Distinct from `retry::RetryPolicy` (an in-process retry-with-backoff
//! wrapper around a single async call): this queue persists pending retries
//! so a crash between "operation failed" and "operation retried" doesn't
//! lose the retry. `RetryQueue` only computes *when* an item becomes due;
//! driving the actual re-execution is the worker loop's job (see
//! `TransferManager`), which calls `due_items` on a timer.

use crate::backoff::Backoff;
use crate::domain::error::BridgeError;
use crate::domain::retry_item::{RetryItem, RetryOperation, RETRY_ITEM_SCHEMA_VERSION};
use crate::domain::transfer::TransferId;
use crate::jitter::Jitter;
use crate::storage::{Store, Versioned};
use std::sync::Arc;

use crate::clock::WallClock;

impl Versioned for RetryItem {
    const CURRENT_SCHEMA_VERSION: u16 = RETRY_ITEM_SCHEMA_VERSION;

    fn schema_version(&self) -> u16 {
        self.schema_version
    }

    fn migrate(_raw: Vec<u8>, from_version: u16) -> Result<Self, BridgeError> {
        Err(BridgeError::StorageFailure(format!(
            "no migration registered from retry item schema version {}",
            from_version
        )))
    }
}

fn retry_key(transfer_id: TransferId, operation: RetryOperation) -> String {
    format!("{}:{:?}", transfer_id, operation)
}

pub struct RetryQueue {
    store: Store,
    clock: Arc<dyn WallClock>,
    backoff: Backoff,
    jitter: Jitter,
    max_attempts: u32,
}

impl RetryQueue {
    pub fn new(
        store: Store,
        clock: Arc<dyn WallClock>,
        backoff: Backoff,
        jitter: Jitter,
        max_attempts: u32,
    ) -> Self {
        Self { store, clock, backoff, jitter, max_attempts }
    }

    /// Enqueue a transfer operation to be retried immediately (due at the
    /// next `due_items` poll).
    pub fn enqueue(
        &self,
        transfer_id: TransferId,
        operation: RetryOperation,
    ) -> Result<(), BridgeError> {
        let now = self.clock.now_unix_millis();
        let item = RetryItem::new(transfer_id, operation, self.max_attempts, now);
        self.store.put_retry(&retry_key(transfer_id, operation), &item)
    }

    /// Record a failed retry attempt, scheduling the next one with
    /// jittered exponential backoff, or dead-lettering if attempts are
    /// exhausted.
    pub fn record_failure(
        &self,
        transfer_id: TransferId,
        operation: RetryOperation,
        error: String,
    ) -> Result<bool, BridgeError> {
        let key = retry_key(transfer_id, operation);
        let mut item: RetryItem = self
            .store
            .scan_retry::<RetryItem>()?
            .into_iter()
            .find(|i| i.transfer_id == transfer_id && i.operation == operation)
            .ok_or_else(|| BridgeError::InternalInvariant(format!("no retry item for {}", key)))?;

        let delay = self.jitter.apply(self.backoff.delay(item.attempts as usize + 1));
        let next_attempt_at = self.clock.now_unix_millis().saturating_add(delay.as_millis() as u64);
        item.record_failure(error, next_attempt_at);

        let dead_lettered = item.dead_lettered;
        self.store.put_retry(&key, &item)?;
        Ok(dead_lettered)
    }

    /// Remove an item once its operation has finally succeeded.
    pub fn complete(&self, transfer_id: TransferId, operation: RetryOperation) -> Result<(), BridgeError> {
        self.store.delete_retry(&retry_key(transfer_id, operation))
    }

    /// Items whose scheduled time has arrived, excluding dead-lettered ones.
    pub fn due_items(&self) -> Result<Vec<RetryItem>, BridgeError> {
        let now = self.clock.now_unix_millis();
        let all = self.store.scan_retry::<RetryItem>()?;
        Ok(all.into_iter().filter(|item| item.is_due(now)).collect())
    }

    /// Items that have exhausted their retry budget and require operator
    /// attention (the dead-letter surface).
    pub fn dead_lettered(&self) -> Result<Vec<RetryItem>, BridgeError> {
        let all = self.store.scan_retry::<RetryItem>()?;
        Ok(all.into_iter().filter(|item| item.dead_lettered).collect())
    }
}
