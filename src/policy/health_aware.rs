//! Health-aware round-robin selection.

use super::SelectionPolicy;
use crate::backend::BackendHandle;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin that skips excluded backends.
///
/// Each probe advances the shared rotation counter, so the rotation
/// order is preserved across skips. At most one full cycle is probed
/// per selection; if every backend is excluded the selection fails
/// rather than blocking or retrying.
///
/// Probing calls [`BackendHandle::is_healthy`], which is what gives
/// excluded backends their lazy way back in once the cool-down elapses.
pub struct HealthAware {
    counter: AtomicUsize,
}

impl HealthAware {
    /// Create a health-aware policy starting at the first backend.
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl Default for HealthAware {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q, S> SelectionPolicy<Q, S> for HealthAware {
    fn select(&self, handles: &[Arc<BackendHandle<Q, S>>]) -> Option<Arc<BackendHandle<Q, S>>> {
        if handles.is_empty() {
            return None;
        }

        for _ in 0..handles.len() {
            let idx = self.counter.fetch_add(1, Ordering::Relaxed) % handles.len();
            let handle = &handles[idx];
            if handle.is_healthy() {
                return Some(Arc::clone(handle));
            }
        }

        None
    }

    fn snapshot(&self, handles: &[Arc<BackendHandle<Q, S>>]) -> Vec<Arc<str>> {
        handles
            .iter()
            .filter(|h| h.is_healthy())
            .map(|h| Arc::clone(h.address_arc()))
            .collect()
    }
}
