//! Per-backend handle: address, invoker, health and load accounting.

use crate::health::{HealthConfig, HealthTracker};
use crate::invoker::{BoxError, Invoker};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::{info, warn};

/// A backend to route to: an address paired with the capability that
/// reaches it.
///
/// The address is an opaque identifier from the router's point of view;
/// it is used for logging, error reporting and deterministic tie-breaks,
/// never for dialing.
pub struct BackendTarget<Q, S> {
    /// Identifying address, unique within one router.
    pub address: String,
    /// Capability that delivers requests to this backend.
    pub invoker: Arc<dyn Invoker<Q, S>>,
}

impl<Q, S> BackendTarget<Q, S> {
    /// Pair an address with an invoker.
    pub fn new<I>(address: impl Into<String>, invoker: I) -> Self
    where
        I: Invoker<Q, S> + 'static,
    {
        Self {
            address: address.into(),
            invoker: Arc::new(invoker),
        }
    }
}

impl<Q, S> fmt::Debug for BackendTarget<Q, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendTarget")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Live routing state for one backend.
///
/// Tracks the number of in-flight invocations and the health state
/// machine alongside the invoker itself. Handles are shared behind
/// `Arc` between the router, its selection policy and the recovery
/// sweeper; every field they touch is atomic.
pub struct BackendHandle<Q, S> {
    address: Arc<str>,
    invoker: Arc<dyn Invoker<Q, S>>,
    health: HealthTracker,
    /// Invocations currently in flight.
    active_load: AtomicU32,
    /// Membership flag for load-aware selection pools; guards against
    /// the same handle being admitted twice.
    in_pool: AtomicBool,
}

impl<Q, S> BackendHandle<Q, S> {
    /// Create a handle for `target`, healthy and idle.
    pub fn new(target: BackendTarget<Q, S>, health: HealthConfig) -> Self {
        Self {
            address: target.address.into(),
            invoker: target.invoker,
            health: HealthTracker::new(health),
            active_load: AtomicU32::new(0),
            in_pool: AtomicBool::new(false),
        }
    }

    /// The backend's identifying address.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub(crate) fn address_arc(&self) -> &Arc<str> {
        &self.address
    }

    /// Number of invocations currently in flight.
    pub fn current_load(&self) -> u32 {
        self.active_load.load(Ordering::Relaxed)
    }

    /// Is this backend eligible for selection?
    ///
    /// Checking is what drives lazy recovery: if the backend is
    /// excluded but its cool-down has elapsed, this call flips it back
    /// to healthy.
    pub fn is_healthy(&self) -> bool {
        if self.health.healthy_flag() {
            return true;
        }
        if self.try_recover() {
            return true;
        }
        self.health.healthy_flag()
    }

    /// Consecutive failures since the last success or recovery.
    pub fn consecutive_failures(&self) -> u32 {
        self.health.consecutive_failures()
    }

    /// Deliver one request to this backend, counting it as in-flight
    /// load for the duration of the call.
    ///
    /// Load is released however the call ends, including when the
    /// returned future is dropped mid-flight. Health accounting is the
    /// router's job, not the handle's.
    pub async fn invoke(&self, request: Q) -> Result<S, BoxError> {
        let _load = LoadGuard::acquire(&self.active_load);
        self.invoker.invoke(request).await
    }

    /// Raw health flag, without triggering lazy recovery. Used for
    /// status reporting, where observation should not mutate.
    pub(crate) fn healthy_flag(&self) -> bool {
        self.health.healthy_flag()
    }

    pub(crate) fn record_success(&self) {
        self.health.record_success();
    }

    /// Record a failed invocation, logging the exclusion transition
    /// when this failure is the one that crossed the threshold.
    pub(crate) fn record_failure(&self) -> bool {
        let excluded = self.health.record_failure();
        if excluded {
            warn!(
                backend = %self.address,
                failures = self.health.consecutive_failures(),
                "backend excluded after repeated failures"
            );
        }
        excluded
    }

    /// Flip this backend back to healthy if its cool-down has elapsed.
    /// Returns true only for the caller that performed the transition.
    pub(crate) fn try_recover(&self) -> bool {
        let recovered = self.health.try_recover();
        if recovered {
            info!(backend = %self.address, "backend recovered after cool-down");
        }
        recovered
    }

    pub(crate) fn in_pool(&self) -> bool {
        self.in_pool.load(Ordering::Acquire)
    }

    pub(crate) fn set_in_pool(&self, member: bool) {
        self.in_pool.store(member, Ordering::Release);
    }
}

impl<Q, S> fmt::Debug for BackendHandle<Q, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendHandle")
            .field("address", &self.address)
            .field("active_load", &self.current_load())
            .field("healthy", &self.health.healthy_flag())
            .finish_non_exhaustive()
    }
}

/// Decrements the in-flight counter on drop, so load is released even
/// when an invocation future is cancelled.
struct LoadGuard<'a> {
    load: &'a AtomicU32,
}

impl<'a> LoadGuard<'a> {
    fn acquire(load: &'a AtomicU32) -> Self {
        load.fetch_add(1, Ordering::Relaxed);
        Self { load }
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.load.fetch_sub(1, Ordering::Relaxed);
    }
}
