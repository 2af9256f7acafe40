//! Background recovery sweeper.
//!
//! A periodic sweep over all backends that transitions excluded ones
//! back to healthy once their cool-down has elapsed, so idle backends
//! recover without waiting for traffic to probe them. The sweeper is
//! an accelerator only: lazy recovery on the selection path keeps the
//! balancer correct even when no sweeper runs.

use crate::backend::BackendHandle;
use crate::metrics::MetricsCollector;
use crate::policy::SelectionPolicy;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{MissedTickBehavior, interval};
use tracing::info;

/// Periodically recovers cooled-down backends and re-admits them into
/// the selection policy's pool.
pub struct RecoverySweeper<Q, S> {
    handles: Arc<Vec<Arc<BackendHandle<Q, S>>>>,
    policy: Arc<dyn SelectionPolicy<Q, S>>,
    sweep_interval: Duration,
    metrics: MetricsCollector,
}

impl<Q, S> RecoverySweeper<Q, S> {
    /// Create a sweeper over `handles`, re-admitting recoveries into
    /// `policy`.
    pub fn new(
        handles: Arc<Vec<Arc<BackendHandle<Q, S>>>>,
        policy: Arc<dyn SelectionPolicy<Q, S>>,
        sweep_interval: Duration,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            handles,
            policy,
            sweep_interval,
            metrics,
        }
    }

    /// Run until the shutdown signal fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(interval = ?self.sweep_interval, "recovery sweeper starting");

        let mut ticker = interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }

                _ = shutdown.recv() => {
                    info!("recovery sweeper shutting down");
                    break;
                }
            }
        }
    }

    /// One pass: recover every backend whose cool-down has elapsed.
    ///
    /// `try_recover` reports the transition to exactly one caller, so a
    /// sweep never double-admits a backend that a concurrent lazy check
    /// already brought back.
    fn sweep(&self) {
        for handle in self.handles.iter() {
            if handle.try_recover() {
                self.policy.readmit(handle);
                self.metrics.record_sweeper_recovery(handle.address());
                self.metrics.set_backend_health(handle.address(), true);
            }
        }
    }
}
