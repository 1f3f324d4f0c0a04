//! Panic/recovery supervision boundary.
//!
//! Grounded on the per-chain task-restart pattern of a reference ingestion
//! manager: each supervised component runs inside its own `tokio::spawn`,
//! wrapped so a panic (caught via `JoinHandle`'s `JoinError::is_panic`) or
//! an `Err` return records a `PanicEntry` and triggers a respawn after an
//! exponential backoff, capped at 30s, without ever swallowing the
//! shutdown `CancellationToken`.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;
use crate::clock::WallClock;
use crate::domain::error::BridgeError;

/// A recorded crash (panic or fatal `Err` return) for the admin/query
/// surface.
#[derive(Debug, Clone)]
pub struct PanicEntry {
    pub component: String,
    pub message: String,
    pub occurred_at_unix_millis: u64,
}

/// Restart backoff: 1s doubling, capped at 30s, matching the supervisor's
/// documented restart policy.
pub fn default_restart_backoff() -> Backoff {
    Backoff::exponential(Duration::from_secs(1)).with_max(Duration::from_secs(30))
}

/// Owns the shutdown token and the crash log for every component it
/// supervises.
pub struct Supervisor {
    cancel: CancellationToken,
    clock: Arc<dyn WallClock>,
    panics: Arc<Mutex<Vec<PanicEntry>>>,
    tasks: JoinSet<()>,
}

impl Supervisor {
    pub fn new(clock: Arc<dyn WallClock>) -> Self {
        Self {
            cancel: CancellationToken::new(),
            clock,
            panics: Arc::new(Mutex::new(Vec::new())),
            tasks: JoinSet::new(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request every supervised component to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for every supervised component to finish (normally only
    /// returns after `shutdown()`).
    pub async fn join_all(&mut self) {
        while self.tasks.join_next().await.is_some() {}
    }

    pub fn crash_log(&self) -> Vec<PanicEntry> {
        self.panics.lock().expect("Supervisor.crash_log: mutex poisoned").clone()
    }

    /// Supervise a component: `make_task` is called once per (re)start and
    /// must produce a fresh future each time (a component that held open
    /// state across a panic would defeat the point of restarting it).
    pub fn supervise<F, Fut>(&mut self, component: &str, backoff: Backoff, make_task: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BridgeError>> + Send + 'static,
    {
        let component = component.to_string();
        let cancel = self.cancel.clone();
        let clock = self.clock.clone();
        let panics = self.panics.clone();

        self.tasks.spawn(async move {
            let mut attempt: usize = 0;
            loop {
                if cancel.is_cancelled() {
                    return;
                }

                let task = make_task();
                let handle = tokio::spawn(task);

                let outcome = tokio::select! {
                    _ = cancel.cancelled() => {
                        handle.abort();
                        return;
                    }
                    result = handle => result,
                };

                match outcome {
                    Ok(Ok(())) => return, // component shut down on its own, nothing to restart
                    Ok(Err(err)) => {
                        attempt += 1;
                        record_crash(&panics, &clock, &component, err.to_string());
                    }
                    Err(join_err) if join_err.is_panic() => {
                        attempt += 1;
                        record_crash(&panics, &clock, &component, panic_message(&join_err));
                    }
                    Err(_cancelled) => return, // aborted by the select above
                }

                if cancel.is_cancelled() {
                    return;
                }

                tokio::time::sleep(backoff.delay(attempt)).await;
            }
        });
    }
}

fn record_crash(
    panics: &Arc<Mutex<Vec<PanicEntry>>>,
    clock: &Arc<dyn WallClock>,
    component: &str,
    message: String,
) {
    tracing::error!(component, message = %message, "supervised component crashed, restarting");
    let entry = PanicEntry {
        component: component.to_string(),
        message,
        occurred_at_unix_millis: clock.now_unix_millis(),
    };
    panics.lock().expect("record_crash: mutex poisoned").push(entry);
}

fn panic_message(join_err: &tokio::task::JoinError) -> String {
    join_err
        .try_into_panic()
        .ok()
        .map(|payload| {
            payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic with non-string payload".to_string())
        })
        .unwrap_or_else(|| "task panicked".to_string())
}
