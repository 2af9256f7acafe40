//! The balancer: selection, dispatch, outcome accounting and recovery.
//!
//! [`Balancer`] owns a fixed set of backend handles, a selection
//! policy, and one background recovery sweeper. Callers hand it opaque
//! requests; it picks a backend, dispatches through that backend's
//! invoker, records the outcome against the backend's health and load
//! state, and hands the response (or a wrapped failure) back. There is
//! no failover: one invocation touches at most one backend.

use crate::backend::{BackendHandle, BackendTarget};
use crate::config::BalancerConfig;
use crate::health::{HealthConfig, RecoverySweeper};
use crate::invoker::BoxError;
use crate::metrics::MetricsCollector;
use crate::policy::{PolicyKind, SelectionPolicy};
use crate::util::ShutdownSignal;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Error returned by [`Balancer::invoke`].
#[derive(Debug, Error)]
pub enum InvokeError {
    /// Selection came up empty: no backends are configured, or every
    /// backend is currently excluded.
    #[error("no backend available")]
    NoBackendAvailable,

    /// The selected backend's invoker reported a failure.
    #[error("backend {address} failed: {source}")]
    Backend {
        /// Address of the backend that failed.
        address: Arc<str>,
        /// The invoker's own error.
        #[source]
        source: BoxError,
    },
}

impl InvokeError {
    /// Address of the failing backend, when the error names one.
    pub fn backend_address(&self) -> Option<&str> {
        match self {
            InvokeError::Backend { address, .. } => Some(address),
            InvokeError::NoBackendAvailable => None,
        }
    }
}

/// Point-in-time view of one backend, for status endpoints and logs.
///
/// `healthy` is the raw exclusion flag; reading it does not trigger a
/// lazy recovery check the way [`Balancer::is_healthy`] does.
#[derive(Debug, Clone)]
pub struct BackendStatus {
    /// The backend's identifying address.
    pub address: Arc<str>,
    /// Raw health flag at observation time.
    pub healthy: bool,
    /// Invocations in flight at observation time.
    pub active_load: u32,
    /// Consecutive failures since the last success or recovery.
    pub consecutive_failures: u32,
}

/// Routes opaque requests across a fixed set of replicated backends.
///
/// Cheap to share behind an `Arc`; every operation takes `&self`.
pub struct Balancer<Q, S> {
    handles: Arc<Vec<Arc<BackendHandle<Q, S>>>>,
    policy: Arc<dyn SelectionPolicy<Q, S>>,
    kind: PolicyKind,
    metrics: MetricsCollector,
    shutdown: ShutdownSignal,
    sweeper: parking_lot::Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl<Q, S> Balancer<Q, S>
where
    Q: 'static,
    S: 'static,
{
    /// Build a balancer over `targets` and start its recovery sweeper.
    ///
    /// The sweeper needs a tokio runtime; constructed outside of one,
    /// the balancer still works and relies on lazy recovery alone.
    pub fn new(kind: PolicyKind, targets: Vec<BackendTarget<Q, S>>, config: BalancerConfig) -> Self {
        let health = HealthConfig {
            failure_threshold: config.failure_threshold,
            cool_down: config.cool_down,
        };

        let handles: Arc<Vec<Arc<BackendHandle<Q, S>>>> = Arc::new(
            targets
                .into_iter()
                .map(|target| Arc::new(BackendHandle::new(target, health.clone())))
                .collect(),
        );

        let policy = kind.build::<Q, S>();
        for handle in handles.iter() {
            policy.readmit(handle);
        }

        let metrics = MetricsCollector::new();
        for handle in handles.iter() {
            metrics.set_backend_health(handle.address(), true);
        }

        let shutdown = ShutdownSignal::new();
        let sweeper = spawn_sweeper(&handles, &policy, &config, &metrics, &shutdown);

        info!(
            policy = %kind,
            backends = handles.len(),
            failure_threshold = config.failure_threshold,
            cool_down = ?config.cool_down,
            "balancer started"
        );

        Self {
            handles,
            policy,
            kind,
            metrics,
            shutdown,
            sweeper: parking_lot::Mutex::new(sweeper),
            stopped: AtomicBool::new(false),
        }
    }
}

impl<Q, S> Balancer<Q, S> {
    /// Route one request to a backend chosen by the selection policy.
    ///
    /// The outcome is recorded against the backend before this returns:
    /// a success resets its failure streak, a failure counts toward
    /// exclusion. Failures are wrapped with the backend's address and
    /// surfaced as-is; the balancer never retries elsewhere.
    #[instrument(skip_all, fields(policy = %self.kind))]
    pub async fn invoke(&self, request: Q) -> Result<S, InvokeError> {
        let Some(handle) = self.policy.select(&self.handles) else {
            warn!(policy = %self.kind, "no backend available");
            self.metrics.record_no_backend();
            return Err(InvokeError::NoBackendAvailable);
        };

        let address = Arc::clone(handle.address_arc());
        debug!(backend = %address, load = handle.current_load(), "dispatching invocation");

        let started = Instant::now();
        let result = handle.invoke(request).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(_) => {
                handle.record_success();
                self.metrics.record_invocation(&address, true, elapsed);
            }
            Err(error) => {
                warn!(backend = %address, error = %error, "backend invocation failed");
                if handle.record_failure() {
                    self.metrics.record_exclusion(&address);
                    self.metrics.set_backend_health(&address, false);
                }
                self.metrics.record_invocation(&address, false, elapsed);
            }
        }
        self.policy.on_outcome(&handle);

        result.map_err(|source| InvokeError::Backend { address, source })
    }

    /// The policy this balancer routes with.
    pub fn policy_kind(&self) -> PolicyKind {
        self.kind
    }

    /// Configured backend addresses, in configuration order.
    pub fn addresses(&self) -> Vec<Arc<str>> {
        self.handles
            .iter()
            .map(|h| Arc::clone(h.address_arc()))
            .collect()
    }

    /// In-flight invocation count for `address`, or `None` if no such
    /// backend is configured.
    pub fn current_load(&self, address: &str) -> Option<u32> {
        self.find(address).map(|h| h.current_load())
    }

    /// Current eligibility of `address`, triggering a lazy cool-down
    /// check. `None` if no such backend is configured.
    pub fn is_healthy(&self, address: &str) -> Option<bool> {
        self.find(address).map(|h| h.is_healthy())
    }

    /// Addresses currently eligible for selection, in policy order
    /// (for load-aware: ascending `(load, address)`).
    pub fn snapshot_pool(&self) -> Vec<Arc<str>> {
        self.policy.snapshot(&self.handles)
    }

    /// Point-in-time status of every backend, in configuration order.
    pub fn backend_status(&self) -> Vec<BackendStatus> {
        self.handles
            .iter()
            .map(|h| BackendStatus {
                address: Arc::clone(h.address_arc()),
                healthy: h.healthy_flag(),
                active_load: h.current_load(),
                consecutive_failures: h.consecutive_failures(),
            })
            .collect()
    }

    /// The balancer's metrics collector, for wiring up an exporter.
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Stop the background recovery sweeper. Idempotent.
    ///
    /// Invocations keep working after a stop; excluded backends then
    /// recover only through lazy checks on the selection path.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(policy = %self.kind, "stopping balancer background recovery");
        self.shutdown.signal();
    }

    fn find(&self, address: &str) -> Option<&Arc<BackendHandle<Q, S>>> {
        self.handles.iter().find(|h| h.address() == address)
    }
}

impl<Q, S> Drop for Balancer<Q, S> {
    fn drop(&mut self) {
        self.stop();
        // The sweeper only parks on its ticker, so aborting is safe.
        if let Some(task) = self.sweeper.lock().take() {
            task.abort();
        }
    }
}

/// Spawn the recovery sweeper if a runtime is available and the
/// interval is usable.
fn spawn_sweeper<Q, S>(
    handles: &Arc<Vec<Arc<BackendHandle<Q, S>>>>,
    policy: &Arc<dyn SelectionPolicy<Q, S>>,
    config: &BalancerConfig,
    metrics: &MetricsCollector,
    shutdown: &ShutdownSignal,
) -> Option<JoinHandle<()>>
where
    Q: 'static,
    S: 'static,
{
    if config.sweep_interval.is_zero() {
        warn!("sweep interval is zero; periodic recovery disabled");
        return None;
    }

    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            let sweeper = RecoverySweeper::new(
                Arc::clone(handles),
                Arc::clone(policy),
                config.sweep_interval,
                metrics.clone(),
            );
            Some(runtime.spawn(sweeper.run(shutdown.subscribe())))
        }
        Err(_) => {
            warn!("no tokio runtime; periodic recovery disabled, lazy recovery still applies");
            None
        }
    }
}
