//! CleanupScheduler - periodic reclamation of expired sessions
//!
//! Every tick takes a snapshot of the registry, revokes the grant of each
//! expired entry and removes the entry whether or not the revoke worked.
//! Failures are logged, never returned; the loop keeps going.

use crate::grant::{AccessGrantManager, RevokeOutcome};
use crate::session::SessionRegistry;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

/// Result of a single sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions that were expired and got removed
    pub removed: Vec<String>,
    /// Grants actually deleted from the cluster
    pub revoked: usize,
    /// Revokes skipped because another session still holds the grant
    pub shared: usize,
    /// Revokes that failed, fully or in part
    pub failed: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }
}

pub struct CleanupScheduler {
    grants: Arc<AccessGrantManager>,
    registry: Arc<SessionRegistry>,
    interval: Duration,
}

impl CleanupScheduler {
    pub fn new(grants: Arc<AccessGrantManager>, interval: Duration) -> Self {
        let registry = Arc::clone(grants.registry());
        Self {
            grants,
            registry,
            interval,
        }
    }

    /// Run one sweep as of `now`.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let expired: Vec<_> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|s| s.is_expired_at(now))
            .collect();

        for session in expired {
            debug!(session_id = %session.session_id, "Session expired, revoking");

            match self.grants.revoke_grant(&session).await {
                Ok(RevokeOutcome::Revoked) => report.revoked += 1,
                Ok(RevokeOutcome::Shared) => report.shared += 1,
                Ok(RevokeOutcome::AlreadyRevoking) => {}
                Err(e) if e.is_retryable() => {
                    warn!(session_id = %session.session_id, error = %e, "Revoke failed");
                    report.failed += 1;
                }
                Err(e) => {
                    error!(session_id = %session.session_id, error = %e, "Revoke failed");
                    report.failed += 1;
                }
            }

            self.registry.remove(&session.session_id);
            report.removed.push(session.session_id);
        }

        if !report.is_empty() {
            info!(
                removed = report.removed.len(),
                revoked = report.revoked,
                failed = report.failed,
                "Cleaned up expired sessions"
            );
        }
        report
    }

    pub async fn tick(&self) -> SweepReport {
        self.tick_at(Utc::now()).await
    }

    /// Spawn the sweep loop. It runs until the returned handle is shut down.
    pub fn start(self: Arc<Self>) -> CleanupHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let interval_secs = self.interval.as_secs_f64();
        info!(interval_secs, "Starting cleanup scheduler");

        let task = tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Cleanup scheduler stopped");
        });

        CleanupHandle { stop_tx, task }
    }
}

/// Handle for a running cleanup loop
pub struct CleanupHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CleanupHandle {
    /// Signal the loop to stop and wait for the in-flight tick to finish.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Cleanup task panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
