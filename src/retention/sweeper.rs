// src/retention/sweeper.rs
//! Background eviction of artifacts older than the TTL.
//!
//! One task for the whole store: Idle -> Scanning -> Sleeping -> Idle until
//! shutdown. A scan works on a snapshot from `list_all`, so the index lock is
//! only taken inside each individual `remove`.

use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::retention::RetentionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweeperState {
    Idle,
    Scanning,
    Sleeping,
    Stopped,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Sweeper {
    store: Arc<RetentionStore>,
    ttl: chrono::Duration,
    period: Duration,
}

impl Sweeper {
    pub fn new(store: Arc<RetentionStore>, ttl: Duration, period: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        Self { store, ttl, period }
    }

    /// Remove every artifact with `now - created_at > ttl`. Never fails;
    /// removal errors are logged and counted.
    pub fn sweep_once(&self, now: DateTime<Utc>) -> SweepReport {
        let snapshot = self.store.list_all();
        let mut report = SweepReport {
            scanned: snapshot.len(),
            ..SweepReport::default()
        };

        for artifact in snapshot {
            if artifact.age(now) <= self.ttl {
                continue;
            }
            match self.store.remove(&artifact.id) {
                Ok(true) => {
                    report.removed += 1;
                    tracing::info!(artifact_id = %artifact.id, path = %artifact.file_path.display(), "evicted expired artifact");
                }
                // Already removed by someone else between snapshot and now.
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(artifact_id = %artifact.id, error = %e, "eviction failed");
                }
            }
        }

        counter!("sweeper_removed_total").increment(report.removed as u64);
        counter!("sweeper_errors_total").increment(report.failed as u64);
        report
    }

    /// [`Sweeper::sweep_once`] on the blocking pool; unlinking files must not
    /// stall a runtime worker.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let sweeper = self.clone();
        match tokio::task::spawn_blocking(move || sweeper.sweep_once(now)).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(target: "sweeper", error = %e, "sweep task failed");
                SweepReport::default()
            }
        }
    }

    /// Run the loop on a tokio task. The first scan happens immediately.
    ///
    /// Dropping the returned handle detaches the task; only
    /// [`SweeperHandle::shutdown`] stops it.
    pub fn spawn(self) -> SweeperHandle {
        let (state_tx, state_rx) = watch::channel(SweeperState::Idle);
        let stop = Arc::new(Notify::new());
        let stop_rx = stop.clone();

        let join = tokio::spawn(async move {
            loop {
                state_tx.send_replace(SweeperState::Scanning);
                let report = self.sweep(Utc::now()).await;
                if report.removed > 0 || report.failed > 0 {
                    tracing::info!(
                        target: "sweeper",
                        scanned = report.scanned,
                        removed = report.removed,
                        failed = report.failed,
                        "sweep finished"
                    );
                }

                state_tx.send_replace(SweeperState::Sleeping);
                tokio::select! {
                    _ = tokio::time::sleep(self.period) => {}
                    _ = stop_rx.notified() => break,
                }
                state_tx.send_replace(SweeperState::Idle);
            }
            state_tx.send_replace(SweeperState::Stopped);
            tracing::debug!(target: "sweeper", "sweeper stopped");
        });

        SweeperHandle {
            stop,
            state: state_rx,
            join,
        }
    }
}

pub struct SweeperHandle {
    stop: Arc<Notify>,
    state: watch::Receiver<SweeperState>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn state(&self) -> watch::Receiver<SweeperState> {
        self.state.clone()
    }

    /// Signal the loop and wait for it to finish its current step.
    pub async fn shutdown(self) {
        self.stop.notify_one();
        if let Err(e) = self.join.await {
            tracing::warn!(error = %e, "sweeper task ended abnormally");
        }
    }
}
