//! Backend selection policies.
//!
//! A policy decides which backend serves the next invocation. All
//! policies share one contract: selection never blocks on a backend,
//! never retries on its own, and returns `None` when nothing is
//! eligible.

mod health_aware;
mod load_aware;
mod round_robin;

pub use health_aware::HealthAware;
pub use load_aware::LoadAware;
pub use round_robin::RoundRobin;

use crate::backend::BackendHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Strategy for picking the backend that serves the next invocation.
///
/// `handles` is the router's full backend set, in configuration order;
/// policies that keep internal state (the load-aware pool) treat it as
/// the authoritative roster to refill from.
pub trait SelectionPolicy<Q, S>: Send + Sync {
    /// Pick the backend for the next invocation, or `None` when no
    /// backend is eligible.
    fn select(&self, handles: &[Arc<BackendHandle<Q, S>>]) -> Option<Arc<BackendHandle<Q, S>>>;

    /// Called after the router has recorded an invocation outcome on
    /// `handle`. Pool-keeping policies use this to take the handle
    /// back, now reflecting its post-call load.
    fn on_outcome(&self, _handle: &Arc<BackendHandle<Q, S>>) {}

    /// Offer a handle to the policy's internal state: initial admission
    /// at construction and re-admission after recovery. A no-op for
    /// stateless policies.
    fn readmit(&self, _handle: &Arc<BackendHandle<Q, S>>) {}

    /// Addresses currently eligible for selection, in policy order.
    fn snapshot(&self, handles: &[Arc<BackendHandle<Q, S>>]) -> Vec<Arc<str>>;
}

/// Which selection policy a router runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Rotate through all backends regardless of health.
    #[default]
    RoundRobin,
    /// Rotate through backends, skipping excluded ones.
    HealthAware,
    /// Prefer the backend with the fewest in-flight invocations.
    LoadAware,
}

impl PolicyKind {
    /// Stable snake_case name, as used in config files and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::RoundRobin => "round_robin",
            PolicyKind::HealthAware => "health_aware",
            PolicyKind::LoadAware => "load_aware",
        }
    }

    /// Instantiate the policy this kind names.
    pub(crate) fn build<Q, S>(&self) -> Arc<dyn SelectionPolicy<Q, S>>
    where
        Q: 'static,
        S: 'static,
    {
        match self {
            PolicyKind::RoundRobin => Arc::new(RoundRobin::new()),
            PolicyKind::HealthAware => Arc::new(HealthAware::new()),
            PolicyKind::LoadAware => Arc::new(LoadAware::new()),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a policy name is not recognized.
#[derive(Debug, Error)]
#[error("unknown policy '{0}' (expected round_robin, health_aware or load_aware)")]
pub struct ParsePolicyError(String);

impl FromStr for PolicyKind {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round_robin" | "round-robin" => Ok(PolicyKind::RoundRobin),
            "health_aware" | "health-aware" => Ok(PolicyKind::HealthAware),
            "load_aware" | "load-aware" => Ok(PolicyKind::LoadAware),
            other => Err(ParsePolicyError(other.to_string())),
        }
    }
}
