//! Round-robin selection.

use super::SelectionPolicy;
use crate::backend::BackendHandle;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Rotate through all backends in configuration order.
///
/// Health is deliberately not consulted: an excluded backend still
/// takes its turn. This is the cheapest policy and the right one when
/// failures are handled elsewhere.
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    /// Create a round-robin policy starting at the first backend.
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q, S> SelectionPolicy<Q, S> for RoundRobin {
    fn select(&self, handles: &[Arc<BackendHandle<Q, S>>]) -> Option<Arc<BackendHandle<Q, S>>> {
        if handles.is_empty() {
            return None;
        }

        let idx = self.counter.fetch_add(1, Ordering::Relaxed) % handles.len();
        Some(Arc::clone(&handles[idx]))
    }

    fn snapshot(&self, handles: &[Arc<BackendHandle<Q, S>>]) -> Vec<Arc<str>> {
        handles.iter().map(|h| Arc::clone(h.address_arc())).collect()
    }
}
