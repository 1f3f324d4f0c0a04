//! Replay protection: at-most-once admission of source events by
//! fingerprint.
//!
//! A `DashMap` front cache absorbs the hot path (most fingerprints are
//! checked once and never seen again); the durable `redb` bucket is the
//! source of truth so a restart doesn't reopen a replay window. The cache
//! is populated on every admit and lookup but never trusted over the
//! durable store — a cache miss always falls through to disk before a
//! fingerprint is declared new.

use std::sync::Arc;

use dashmap::DashMap;

use crate::clock::WallClock;
use crate::domain::error::BridgeError;
use crate::domain::replay::{ReplayEntry, REPLAY_ENTRY_SCHEMA_VERSION};
use crate::domain::transfer::TransferId;
use crate::storage::{Store, Versioned};

impl Versioned for ReplayEntry {
    const CURRENT_SCHEMA_VERSION: u16 = REPLAY_ENTRY_SCHEMA_VERSION;

    fn schema_version(&self) -> u16 {
        self.schema_version
    }

    fn migrate(_raw: Vec<u8>, from_version: u16) -> Result<Self, BridgeError> {
        Err(BridgeError::StorageFailure(format!(
            "no migration registered from replay entry schema version {}",
            from_version
        )))
    }
}

/// Outcome of `ReplayStore::admit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmitOutcome {
    /// First time this fingerprint has been seen; caller should proceed to
    /// create a `Transfer`.
    Admitted,
    /// This fingerprint was already admitted; caller must not mutate or
    /// recreate the existing `Transfer`.
    DuplicateRejected { existing_transfer_id: TransferId },
}

/// Point-in-time counters for the admin/query surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayStats {
    pub admitted: u64,
    pub duplicates_rejected: u64,
    pub entries_purged: u64,
}

struct Counters {
    admitted: std::sync::atomic::AtomicU64,
    duplicates_rejected: std::sync::atomic::AtomicU64,
    entries_purged: std::sync::atomic::AtomicU64,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            admitted: std::sync::atomic::AtomicU64::new(0),
            duplicates_rejected: std::sync::atomic::AtomicU64::new(0),
            entries_purged: std::sync::atomic::AtomicU64::new(0),
        }
    }
}

pub struct ReplayStore {
    store: Store,
    cache: Arc<DashMap<String, TransferId>>,
    clock: Arc<dyn WallClock>,
    ttl_millis: u64,
    counters: Counters,
}

impl ReplayStore {
    pub fn new(store: Store, clock: Arc<dyn WallClock>, ttl_millis: u64) -> Self {
        Self { store, cache: Arc::new(DashMap::new()), clock, ttl_millis, counters: Counters::default() }
    }

    /// Admit a fingerprint, failing closed: a storage error is surfaced
    /// rather than silently treated as "not a duplicate."
    pub fn admit(
        &self,
        fingerprint: &str,
        transfer_id: TransferId,
    ) -> Result<AdmitOutcome, BridgeError> {
        if let Some(existing) = self.cache.get(fingerprint) {
            self.counters.duplicates_rejected.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return Ok(AdmitOutcome::DuplicateRejected { existing_transfer_id: *existing });
        }

        let now = self.clock.now_unix_millis();
        if let Some(entry) = self.store.get_replay::<ReplayEntry>(fingerprint)? {
            if !entry.is_expired(now) {
                self.cache.insert(fingerprint.to_string(), entry.transfer_id);
                self.counters.duplicates_rejected.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return Ok(AdmitOutcome::DuplicateRejected { existing_transfer_id: entry.transfer_id });
            }
        }

        let entry = ReplayEntry::new(fingerprint.to_string(), transfer_id, now, self.ttl_millis);
        self.store.put_replay(fingerprint, &entry)?;
        self.cache.insert(fingerprint.to_string(), transfer_id);
        self.counters.admitted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(AdmitOutcome::Admitted)
    }

    /// Drop expired entries from both the durable store and the front
    /// cache. Safe to call concurrently with `admit`.
    pub fn purge_expired(&self) -> Result<u64, BridgeError> {
        let now = self.clock.now_unix_millis();
        let entries = self.store.scan_replay::<ReplayEntry>()?;
        let mut purged = 0u64;
        for entry in entries {
            if entry.is_expired(now) {
                self.store.delete_replay(&entry.fingerprint)?;
                self.cache.remove(&entry.fingerprint);
                purged += 1;
            }
        }
        self.counters.entries_purged.fetch_add(purged, std::sync::atomic::Ordering::Relaxed);
        Ok(purged)
    }

    pub fn stats(&self) -> ReplayStats {
        use std::sync::atomic::Ordering::Relaxed;
        ReplayStats {
            admitted: self.counters.admitted.load(Relaxed),
            duplicates_rejected: self.counters.duplicates_rejected.load(Relaxed),
            entries_purged: self.counters.entries_purged.load(Relaxed),
        }
    }
}
