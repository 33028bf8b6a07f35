//! Background autosave.
//!
//! A spawned task that wakes up on a fixed interval and syncs the session
//! whenever it has unsynced changes or the previous attempt failed. A
//! pending conflict pauses autosave until the caller resolves it.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::session::{CanvasSession, SyncOutcome};

#[derive(Debug, Default)]
struct AutosaveCounters {
    saves: AtomicU64,
    consecutive_failures: AtomicU32,
}

/// Handle to a running autosave task.
#[derive(Debug)]
pub struct AutosaveHandle {
    handle: JoinHandle<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    counters: Arc<AutosaveCounters>,
}

impl AutosaveHandle {
    /// Successful saves made by the task.
    #[must_use]
    pub fn saves(&self) -> u64 {
        self.counters.saves.load(Ordering::Relaxed)
    }

    /// Failed attempts since the last success.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.counters.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Whether the task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the task, letting an in-flight sync finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            if !e.is_cancelled() {
                tracing::warn!("Autosave task ended abnormally: {e}");
            }
        }
    }

    /// Stop the task immediately.
    pub fn abort(self) {
        self.handle.abort();
    }
}

/// Spawn the autosave loop for `session`.
///
/// Must be called from within a tokio runtime.
pub fn spawn_autosave(session: Arc<CanvasSession>, interval: Duration) -> AutosaveHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    let counters = Arc::new(AutosaveCounters::default());
    let task_counters = Arc::clone(&counters);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    tracing::info!(key = %session.key(), "Autosave received shutdown signal");
                    break;
                }

                _ = ticker.tick() => {
                    if session.pending_conflict().is_some() {
                        tracing::debug!(key = %session.key(), "Autosave paused by unresolved conflict");
                        continue;
                    }
                    let state = session.sync_state();
                    if !state.is_dirty() && !state.needs_retry() {
                        continue;
                    }

                    match session.sync(None).await {
                        Ok(SyncOutcome::Superseded) => {}
                        Ok(outcome) => {
                            let failures = task_counters.consecutive_failures.swap(0, Ordering::Relaxed);
                            if failures > 0 {
                                tracing::info!(
                                    key = %session.key(),
                                    "Autosave recovered after {} failures",
                                    failures
                                );
                            }
                            task_counters.saves.fetch_add(1, Ordering::Relaxed);
                            tracing::debug!(key = %session.key(), ?outcome, "Autosaved");
                        }
                        Err(e) => {
                            let failures = task_counters
                                .consecutive_failures
                                .fetch_add(1, Ordering::Relaxed)
                                .saturating_add(1);
                            tracing::warn!(
                                key = %session.key(),
                                "Autosave failed (failure #{}): {}",
                                failures,
                                e
                            );
                        }
                    }
                }
            }
        }
    });

    AutosaveHandle {
        handle,
        shutdown_tx: Some(shutdown_tx),
        counters,
    }
}
