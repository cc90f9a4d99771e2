//! Background eviction of idle throttle state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::clock::Clock;
use super::registry::{PurgeReport, ThrottleRegistry};

/// Removes state for keys idle longer than the retention window.
///
/// An evicted key that shows up again is treated as brand new, so a missed or
/// partial sweep only delays reclaiming memory.
#[derive(Clone)]
pub struct PurgeSweeper {
    registry: Arc<ThrottleRegistry>,
    clock: Arc<dyn Clock>,
    retention_window: Duration,
}

impl PurgeSweeper {
    pub fn new(
        registry: Arc<ThrottleRegistry>,
        clock: Arc<dyn Clock>,
        retention_window: Duration,
    ) -> Self {
        Self {
            registry,
            clock,
            retention_window,
        }
    }

    /// Run one purge pass now.
    pub fn sweep(&self) -> PurgeReport {
        let now = self.clock.now();
        let Some(threshold) = now.checked_sub(self.retention_window) else {
            return PurgeReport::default();
        };

        let report = self.registry.purge_older_than(threshold);
        if report.removed > 0 {
            debug!("Purged {} idle throttle key(s)", report.removed);
        }
        report
    }

    /// Run `sweep` every `interval` until the returned handle is shut down.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self, interval: Duration) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        info!(
            "Starting throttle sweeper (every {:?}, retention {:?})",
            interval, self.retention_window
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep();
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Throttle sweeper stopped");
        });

        SweeperHandle { shutdown_tx, task }
    }

    pub fn retention_window(&self) -> Duration {
        self.retention_window
    }
}

/// Handle to a running sweeper task.
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for its task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
