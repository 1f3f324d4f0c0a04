//! Transfer state machine and relay dispatcher.
//!
//! Transfers are sharded across `shard_count` lanes by `transfer_id` hash.
//! Each lane is an async mutex guarding the sequence of reads and writes
//! for its subset of transfers, so two operations against the *same*
//! transfer always serialize while operations against *different*
//! transfers in different lanes run fully in parallel — no single global
//! lock sits in front of the whole manager.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::bulkhead::BulkheadPolicy;
use crate::circuit_breaker::CircuitBreakerPolicy;
use crate::circuit_breaker_registry::CircuitBreakerRegistry;
use crate::clock::WallClock;
use crate::domain::error::BridgeError;
use crate::domain::event::SourceEvent;
use crate::domain::retry_item::RetryOperation;
use crate::domain::transfer::{Transfer, TransferId, TransferState, TRANSFER_SCHEMA_VERSION};
use crate::notifier::{BridgeEvent, Notifier};
use crate::relay::{ConfirmOutcome, RelayClient, SubmitOutcome};
use crate::replay_store::{AdmitOutcome, ReplayStore};
use crate::retry_queue::RetryQueue;
use crate::storage::{Store, Versioned};
use crate::ResilienceError;

impl Versioned for Transfer {
    const CURRENT_SCHEMA_VERSION: u16 = TRANSFER_SCHEMA_VERSION;

    fn schema_version(&self) -> u16 {
        self.schema_version
    }

    fn migrate(_raw: Vec<u8>, from_version: u16) -> Result<Self, BridgeError> {
        Err(BridgeError::StorageFailure(format!(
            "no migration registered from transfer schema version {}",
            from_version
        )))
    }
}

/// Outcome of admitting a `SourceEvent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmitResult {
    Created { transfer_id: TransferId },
    DuplicateRejected { existing_transfer_id: TransferId },
    /// The admission bulkhead is at capacity; the caller should back off and
    /// retry rather than treat this event as lost.
    Throttled,
}

#[derive(Debug, Clone)]
pub struct TransferManagerConfig {
    pub shard_count: usize,
    pub required_confirmations: crate::config::RequiredConfirmations,
    pub max_transfer_age_millis: u64,
    pub max_relay_attempts: u32,
}

impl Default for TransferManagerConfig {
    fn default() -> Self {
        Self {
            shard_count: 16,
            required_confirmations: crate::config::RequiredConfirmations::default(),
            max_transfer_age_millis: 24 * 60 * 60 * 1000,
            max_relay_attempts: 8,
        }
    }
}

pub struct TransferManager {
    shard_locks: Vec<Arc<tokio::sync::Mutex<()>>>,
    store: Store,
    replay_store: Arc<ReplayStore>,
    retry_queue: Arc<RetryQueue>,
    relay_client: Arc<dyn RelayClient>,
    relay_breaker: CircuitBreakerPolicy,
    admission_bulkhead: BulkheadPolicy,
    clock: Arc<dyn WallClock>,
    notifier: Notifier,
    config: TransferManagerConfig,
}

impl TransferManager {
    pub fn new(
        store: Store,
        replay_store: Arc<ReplayStore>,
        retry_queue: Arc<RetryQueue>,
        relay_client: Arc<dyn RelayClient>,
        admission_bulkhead: BulkheadPolicy,
        breaker_registry: &CircuitBreakerRegistry,
        clock: Arc<dyn WallClock>,
        notifier: Notifier,
        config: TransferManagerConfig,
    ) -> Self {
        let shard_locks =
            (0..config.shard_count.max(1)).map(|_| Arc::new(tokio::sync::Mutex::new(()))).collect();
        let relay_breaker = breaker_registry.get("relay:home");
        Self {
            shard_locks,
            store,
            replay_store,
            retry_queue,
            relay_client,
            relay_breaker,
            admission_bulkhead,
            clock,
            notifier,
            config,
        }
    }

    fn shard_for(&self, id: TransferId) -> &tokio::sync::Mutex<()> {
        let mut hasher = DefaultHasher::new();
        id.as_uuid().hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shard_locks.len();
        &self.shard_locks[index]
    }

    /// Same shard as `shard_for`, returned as an owned handle so it can be
    /// moved into an async closure without borrowing `self`.
    fn shard_arc_for(&self, id: TransferId) -> Arc<tokio::sync::Mutex<()>> {
        let mut hasher = DefaultHasher::new();
        id.as_uuid().hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shard_locks.len();
        self.shard_locks[index].clone()
    }

    fn load(&self, id: TransferId) -> Result<Transfer, BridgeError> {
        self.store
            .get_transfer(&id.to_string())?
            .ok_or_else(|| BridgeError::TransferNotFound { transfer_id: id.to_string() })
    }

    fn save(&self, transfer: &Transfer) -> Result<(), BridgeError> {
        self.store.put_transfer(&transfer.transfer_id.to_string(), transfer)
    }

    /// Admit a canonicalized event: duplicate rejection never mutates the
    /// existing `Transfer`, and a fresh admission never touches any other
    /// transfer's record.
    ///
    /// The whole admission (dedup check, `Transfer` construction, persist,
    /// notify) runs behind `admission_bulkhead`, which bounds how many
    /// admissions run concurrently. When it's at capacity this returns
    /// `Throttled` immediately rather than queuing — the caller (a listener)
    /// is expected to re-poll the same event later instead of blocking.
    pub async fn admit(&self, event: SourceEvent) -> Result<AdmitResult, BridgeError> {
        let fingerprint = event.fingerprint();
        let candidate_id = TransferId::new();
        let now = self.clock.now_unix_millis();

        let replay_store = self.replay_store.clone();
        let store = self.store.clone();
        let notifier = self.notifier.clone();
        let shard = self.shard_arc_for(candidate_id);
        let required_confirmations = self.config.required_confirmations.for_chain(event.source_chain);

        let outcome = self
            .admission_bulkhead
            .execute(|| {
                let replay_store = replay_store.clone();
                let store = store.clone();
                let notifier = notifier.clone();
                let shard = shard.clone();
                let event = event.clone();
                let fingerprint = fingerprint.clone();
                async move {
                    match replay_store
                        .admit(&fingerprint, candidate_id)
                        .map_err(ResilienceError::Inner)?
                    {
                        AdmitOutcome::DuplicateRejected { existing_transfer_id } => {
                            Ok(AdmitResult::DuplicateRejected { existing_transfer_id })
                        }
                        AdmitOutcome::Admitted => {
                            let dest_address = event.dest_address;
                            let transfer =
                                Transfer::from_event(candidate_id, event, required_confirmations, now);

                            let _guard = shard.lock().await;
                            store
                                .put_transfer(&candidate_id.to_string(), &transfer)
                                .map_err(ResilienceError::Inner)?;
                            drop(_guard);

                            notifier.publish(BridgeEvent::TransferAdmitted {
                                transfer_id: candidate_id,
                                dest_address,
                            });
                            Ok(AdmitResult::Created { transfer_id: candidate_id })
                        }
                    }
                }
            })
            .await;

        match outcome {
            Ok(result) => Ok(result),
            Err(ResilienceError::Bulkhead { .. }) => Ok(AdmitResult::Throttled),
            Err(ResilienceError::Inner(err)) => Err(err),
            Err(other) => Err(BridgeError::InternalInvariant(other.to_string())),
        }
    }

    /// Record a new confirmation count observed by a listener. Transitions
    /// `Pending -> Confirming` on the first call, and `Confirming ->
    /// Relaying` (enqueuing the first relay attempt) once enough
    /// confirmations have accumulated.
    pub async fn on_confirmation(
        &self,
        transfer_id: TransferId,
        confirmations: u32,
    ) -> Result<(), BridgeError> {
        let _guard = self.shard_for(transfer_id).lock().await;
        let mut transfer = self.load(transfer_id)?;
        let now = self.clock.now_unix_millis();

        if transfer.state.is_terminal() {
            return Ok(()); // stale confirmation for a transfer that already finished
        }

        if transfer.state == TransferState::Pending {
            transfer.transition(TransferState::Confirming, now)?;
        }

        let advanced = confirmations > transfer.confirmations;
        transfer.confirmations = confirmations.max(transfer.confirmations);

        if advanced {
            self.notifier.publish(BridgeEvent::ConfirmationAdvanced {
                transfer_id,
                confirmations: transfer.confirmations,
                required_confirmations: transfer.required_confirmations,
            });
        }

        if transfer.state == TransferState::Confirming
            && transfer.confirmations >= transfer.required_confirmations
        {
            let from = transfer.state;
            transfer.transition(TransferState::Relaying, now)?;
            self.save(&transfer)?;
            self.notifier.publish(BridgeEvent::StateChanged {
                transfer_id,
                from,
                to: TransferState::Relaying,
            });
            drop(_guard);
            self.retry_queue.enqueue(transfer_id, RetryOperation::RelayOnce)?;
            return Ok(());
        }

        self.save(&transfer)
    }

    /// Attempt to submit a `Relaying` transfer to the home chain, through
    /// the home-chain circuit breaker. Never called directly by a listener;
    /// driven by the retry queue worker loop.
    pub async fn relay_once(&self, transfer_id: TransferId) -> Result<(), BridgeError> {
        let _guard = self.shard_for(transfer_id).lock().await;
        let mut transfer = self.load(transfer_id)?;
        let now = self.clock.now_unix_millis();

        if transfer.state != TransferState::Relaying {
            return Ok(()); // already progressed past relay (or expired) since this was enqueued
        }

        transfer.attempts += 1;
        // `attempts <= max_relay_attempts` is enforced here, against the
        // Transfer's own counter, independent of RetryQueue's `max_attempts`
        // (which bounds a RetryItem's backoff schedule, a related but
        // distinct counter). Either one reaching its cap is sufficient to
        // force `Failed`; the retry queue's bound is checked first because
        // it's already computed below, the manager's own cap is the
        // invariant named in the spec as the attempt bound of record.
        let attempt_cap_reached = transfer.attempts >= self.config.max_relay_attempts;
        let relay_client = self.relay_client.clone();
        let outcome = self
            .relay_breaker
            .execute(|| {
                let relay_client = relay_client.clone();
                let transfer = transfer.clone();
                async move { relay_client.submit(&transfer).await.map_err(ResilienceError::Inner) }
            })
            .await;

        match outcome {
            Ok(SubmitOutcome::Submitted { home_tx_hash }) => {
                transfer.home_tx_hash = Some(home_tx_hash.clone());
                transfer.last_error = None;
                self.save(&transfer)?;
                drop(_guard);
                self.notifier.publish(BridgeEvent::RelaySubmitted { transfer_id, home_tx_hash });
                self.retry_queue.complete(transfer_id, RetryOperation::RelayOnce)?;
                self.retry_queue.enqueue(transfer_id, RetryOperation::OnConfirmation)?;
                Ok(())
            }
            Ok(SubmitOutcome::Retryable { reason }) => {
                transfer.last_error = Some(reason.clone());
                let queue_dead_lettered = self.retry_queue.record_failure(
                    transfer_id,
                    RetryOperation::RelayOnce,
                    reason.clone(),
                )?;
                let dead_lettered = queue_dead_lettered || attempt_cap_reached;
                if dead_lettered {
                    transfer.transition(TransferState::Failed, now)?;
                }
                self.save(&transfer)?;
                drop(_guard);
                if dead_lettered {
                    if attempt_cap_reached && !queue_dead_lettered {
                        self.retry_queue.complete(transfer_id, RetryOperation::RelayOnce)?;
                    }
                    self.notifier.publish(BridgeEvent::RelayFailed { transfer_id, reason });
                    self.notifier.publish(BridgeEvent::DeadLettered { transfer_id });
                }
                Ok(())
            }
            Ok(SubmitOutcome::Fatal { reason }) => {
                transfer.last_error = Some(reason.clone());
                transfer.transition(TransferState::Failed, now)?;
                self.save(&transfer)?;
                drop(_guard);
                self.notifier.publish(BridgeEvent::RelayFailed { transfer_id, reason });
                self.retry_queue.complete(transfer_id, RetryOperation::RelayOnce)
            }
            Err(err) => {
                let message = err.to_string();
                transfer.last_error = Some(message.clone());
                let queue_dead_lettered = self.retry_queue.record_failure(
                    transfer_id,
                    RetryOperation::RelayOnce,
                    message.clone(),
                )?;
                let dead_lettered = queue_dead_lettered || attempt_cap_reached;
                if dead_lettered {
                    transfer.transition(TransferState::Failed, now)?;
                }
                self.save(&transfer)?;
                drop(_guard);
                if dead_lettered {
                    if attempt_cap_reached && !queue_dead_lettered {
                        self.retry_queue.complete(transfer_id, RetryOperation::RelayOnce)?;
                    }
                    self.notifier.publish(BridgeEvent::RelayFailed { transfer_id, reason: message });
                    self.notifier.publish(BridgeEvent::DeadLettered { transfer_id });
                }
                Ok(())
            }
        }
    }

    /// Poll the home chain for the submitted transaction's finality.
    pub async fn check_relay_confirmation(&self, transfer_id: TransferId) -> Result<(), BridgeError> {
        let _guard = self.shard_for(transfer_id).lock().await;
        let mut transfer = self.load(transfer_id)?;
        let now = self.clock.now_unix_millis();

        if transfer.state != TransferState::Relaying {
            return Ok(());
        }
        let Some(home_tx_hash) = transfer.home_tx_hash.clone() else {
            return Ok(()); // nothing submitted yet, nothing to confirm
        };

        let relay_client = self.relay_client.clone();
        let outcome = self
            .relay_breaker
            .execute(|| {
                let relay_client = relay_client.clone();
                let home_tx_hash = home_tx_hash.clone();
                async move { relay_client.confirm(&home_tx_hash).await.map_err(ResilienceError::Inner) }
            })
            .await;

        match outcome {
            Ok(ConfirmOutcome::Confirmed) => {
                let from = transfer.state;
                transfer.transition(TransferState::Completed, now)?;
                self.save(&transfer)?;
                drop(_guard);
                self.notifier.publish(BridgeEvent::StateChanged {
                    transfer_id,
                    from,
                    to: TransferState::Completed,
                });
                self.retry_queue.complete(transfer_id, RetryOperation::OnConfirmation)
            }
            Ok(ConfirmOutcome::Pending) => {
                let dead_lettered = self.retry_queue.record_failure(
                    transfer_id,
                    RetryOperation::OnConfirmation,
                    "still pending on home chain".to_string(),
                )?;
                if dead_lettered {
                    let reason = "home-chain confirmation never finalized".to_string();
                    transfer.last_error = Some(reason.clone());
                    transfer.transition(TransferState::Failed, now)?;
                    self.save(&transfer)?;
                    drop(_guard);
                    self.notifier.publish(BridgeEvent::RelayFailed { transfer_id, reason });
                    self.notifier.publish(BridgeEvent::DeadLettered { transfer_id });
                }
                Ok(())
            }
            Ok(ConfirmOutcome::Rejected { reason }) => {
                transfer.last_error = Some(reason.clone());
                transfer.transition(TransferState::Failed, now)?;
                self.save(&transfer)?;
                drop(_guard);
                self.notifier.publish(BridgeEvent::RelayFailed { transfer_id, reason });
                self.retry_queue.complete(transfer_id, RetryOperation::OnConfirmation)
            }
            Err(err) => {
                let message = err.to_string();
                let dead_lettered = self.retry_queue.record_failure(
                    transfer_id,
                    RetryOperation::OnConfirmation,
                    message.clone(),
                )?;
                if dead_lettered {
                    transfer.last_error = Some(message.clone());
                    transfer.transition(TransferState::Failed, now)?;
                    self.save(&transfer)?;
                    drop(_guard);
                    self.notifier.publish(BridgeEvent::RelayFailed { transfer_id, reason: message });
                    self.notifier.publish(BridgeEvent::DeadLettered { transfer_id });
                }
                Ok(())
            }
        }
    }

    /// Move a non-terminal transfer past its maximum age into `Expired`.
    pub async fn expire(&self, transfer_id: TransferId) -> Result<bool, BridgeError> {
        let _guard = self.shard_for(transfer_id).lock().await;
        let mut transfer = self.load(transfer_id)?;
        let now = self.clock.now_unix_millis();

        if !transfer.is_expired(now, self.config.max_transfer_age_millis) {
            return Ok(false);
        }

        let from = transfer.state;
        transfer.transition(TransferState::Expired, now)?;
        self.save(&transfer)?;
        drop(_guard);
        self.notifier.publish(BridgeEvent::StateChanged { transfer_id, from, to: TransferState::Expired });
        Ok(true)
    }

    pub fn get_transfer(&self, transfer_id: TransferId) -> Result<Option<Transfer>, BridgeError> {
        self.store.get_transfer(&transfer_id.to_string())
    }

    pub fn list_transfers(&self) -> Result<Vec<Transfer>, BridgeError> {
        self.store.scan_transfers()
    }

    /// Find the transfer a listener's confirmation update belongs to.
    /// `Listener::run` only knows the source tx hash it was told to watch,
    /// never the `TransferId` the manager assigned on admission.
    pub fn find_by_source_tx_hash(
        &self,
        tx_hash: &crate::domain::chain::SourceTxHash,
    ) -> Result<Option<Transfer>, BridgeError> {
        Ok(self.list_transfers()?.into_iter().find(|t| &t.source_tx_hash == tx_hash))
    }

    /// Observable state of the home-chain relay breaker, for the
    /// admin/query stats surface.
    pub fn relay_breaker_state(&self) -> crate::circuit_breaker::CircuitState {
        self.relay_breaker.current_state()
    }
}

#[async_trait::async_trait]
impl crate::listener::WatchedTxSource for TransferManager {
    /// A listener only needs to keep polling confirmation depth for
    /// transfers still accumulating them; once a transfer reaches
    /// `Relaying` or later, `TransferManager` stops asking about it.
    async fn watched_tx_hashes(&self) -> Vec<crate::domain::chain::SourceTxHash> {
        match self.list_transfers() {
            Ok(transfers) => transfers
                .into_iter()
                .filter(|t| t.state == TransferState::Pending || t.state == TransferState::Confirming)
                .map(|t| t.source_tx_hash)
                .collect(),
            Err(err) => {
                tracing::error!(error = %err, "failed to list transfers for watched_tx_hashes");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulkhead::BulkheadPolicy;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::clock::ManualWallClock;
    use crate::domain::chain::{Chain, EvmAddress, SourceTxHash};
    use crate::domain::event::{Amount, SourceAddress, Token, TokenContract};
    use crate::jitter::Jitter;
    use crate::Backoff;
    use alloy_primitives::U256;
    use async_trait::async_trait;
    use std::time::Duration;

    fn evm_addr(n: u8) -> EvmAddress {
        EvmAddress::from_hex(&format!("0x{:040x}", n)).unwrap()
    }

    fn sample_event(seed: u8) -> SourceEvent {
        SourceEvent {
            source_chain: Chain::Evm,
            source_tx_hash: SourceTxHash::Evm([seed; 32]),
            block_number: seed as u64,
            source_address: SourceAddress::Evm(evm_addr(1)),
            dest_address: evm_addr(2),
            token: Token { symbol: "USDC".to_string(), contract: TokenContract::Evm(evm_addr(3)), decimals: 6 },
            amount: Amount::new(U256::from(1_000_000u64)).unwrap(),
            observed_at_unix_millis: 0,
        }
    }

    struct AlwaysRetryable;

    #[async_trait]
    impl RelayClient for AlwaysRetryable {
        async fn submit(&self, _transfer: &Transfer) -> Result<SubmitOutcome, BridgeError> {
            Ok(SubmitOutcome::Retryable { reason: "nonce contention".to_string() })
        }

        async fn confirm(&self, _home_tx_hash: &str) -> Result<ConfirmOutcome, BridgeError> {
            Ok(ConfirmOutcome::Pending)
        }
    }

    fn build_manager(
        dir: &tempfile::TempDir,
        clock: Arc<ManualWallClock>,
        max_relay_attempts: u32,
        retry_queue_max_attempts: u32,
    ) -> (Arc<TransferManager>, Arc<RetryQueue>) {
        let store = Store::open(dir.path().join("bridge.redb")).unwrap();
        let replay_store = Arc::new(ReplayStore::new(store.clone(), clock.clone(), 24 * 60 * 60 * 1000));
        let retry_queue = Arc::new(RetryQueue::new(
            store.clone(),
            clock.clone(),
            Backoff::constant(Duration::from_millis(1)),
            Jitter::None,
            retry_queue_max_attempts,
        ));
        let breakers = CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 1_000,
            recovery_timeout: Duration::from_secs(300),
            half_open_max_calls: 1,
        });
        let manager = Arc::new(TransferManager::new(
            store,
            replay_store,
            retry_queue.clone(),
            Arc::new(AlwaysRetryable),
            BulkheadPolicy::unlimited(),
            &breakers,
            clock,
            Notifier::new(16),
            TransferManagerConfig {
                required_confirmations: crate::config::RequiredConfirmations { evm: 0, sol: 0 },
                max_relay_attempts,
                ..Default::default()
            },
        ));
        (manager, retry_queue)
    }

    /// `max_relay_attempts` must force `Failed` on its own even when the
    /// retry queue's own `max_attempts` is far from exhausted — the two
    /// counters are related but distinct, and the manager's bound is the
    /// one the spec names ("attempts <= maxAttempts ... forces Failed").
    #[tokio::test]
    async fn max_relay_attempts_forces_failed_before_retry_queue_would_dead_letter() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualWallClock::new(0));
        let (manager, retry_queue) = build_manager(&dir, clock, 2, 100);

        let transfer_id = match manager.admit(sample_event(1)).await.unwrap() {
            AdmitResult::Created { transfer_id } => transfer_id,
            other => panic!("expected Created, got {other:?}"),
        };
        manager.on_confirmation(transfer_id, 0).await.unwrap();

        manager.relay_once(transfer_id).await.unwrap();
        let after_first = manager.get_transfer(transfer_id).unwrap().unwrap();
        assert_eq!(after_first.attempts, 1);
        assert_eq!(after_first.state, TransferState::Relaying);

        manager.relay_once(transfer_id).await.unwrap();
        let after_second = manager.get_transfer(transfer_id).unwrap().unwrap();
        assert_eq!(after_second.attempts, 2);
        assert_eq!(after_second.state, TransferState::Failed);

        // The manager forced Failed on its own cap, not the retry queue's
        // (which was configured with max_attempts=100 and never dead-lettered
        // this item) — so the item must have been explicitly completed/removed.
        assert!(retry_queue.due_items().unwrap().is_empty());
        assert!(retry_queue.dead_lettered().unwrap().is_empty());
    }
}
