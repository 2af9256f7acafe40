//! Load-aware selection over a min-ordered pool.
//!
//! The pool is a binary heap of `(load, address)` keys, smallest
//! first, with the address as a deterministic tie-break. A handle
//! leaves the pool when selected and is offered back once its
//! invocation outcome is recorded, carrying its post-call load. The
//! per-handle membership flag keeps refills and re-admissions from
//! ever admitting the same handle twice.

use super::SelectionPolicy;
use crate::backend::BackendHandle;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tracing::debug;

/// Prefer the backend with the fewest in-flight invocations.
pub struct LoadAware<Q, S> {
    pool: Mutex<BinaryHeap<PoolEntry<Q, S>>>,
}

/// Heap entry: a handle keyed by the load it advertised when pushed.
///
/// The live counter can move while the entry sits in the pool, so the
/// key is a hint, not an invariant; `select` re-keys entries it catches
/// being stale.
struct PoolEntry<Q, S> {
    load: u32,
    handle: Arc<BackendHandle<Q, S>>,
}

impl<Q, S> PartialEq for PoolEntry<Q, S> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<Q, S> Eq for PoolEntry<Q, S> {}

impl<Q, S> PartialOrd for PoolEntry<Q, S> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<Q, S> Ord for PoolEntry<Q, S> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap and we want the least
        // loaded backend on top, with the lexicographically smallest
        // address winning ties.
        (other.load, other.handle.address()).cmp(&(self.load, self.handle.address()))
    }
}

impl<Q, S> LoadAware<Q, S> {
    /// Create a load-aware policy with an empty pool; the first
    /// selection (or initial re-admission) fills it.
    pub fn new() -> Self {
        Self {
            pool: Mutex::new(BinaryHeap::new()),
        }
    }
}

impl<Q, S> Default for LoadAware<Q, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q, S> SelectionPolicy<Q, S> for LoadAware<Q, S> {
    fn select(&self, handles: &[Arc<BackendHandle<Q, S>>]) -> Option<Arc<BackendHandle<Q, S>>> {
        let mut pool = self.pool.lock();
        let mut refilled = false;
        let mut rekeys = 0;

        loop {
            let Some(entry) = pool.pop() else {
                // Drained, including the case where every resident
                // entry was discarded as excluded. One refill attempt
                // from the full set, then give up.
                if refilled {
                    return None;
                }
                refill(&mut pool, handles);
                refilled = true;
                continue;
            };
            entry.handle.set_in_pool(false);

            if !entry.handle.is_healthy() {
                debug!(
                    backend = %entry.handle.address(),
                    "dropping excluded backend from selection pool"
                );
                continue;
            }

            let live = entry.handle.current_load();
            if live != entry.load {
                // Stale key: the counter moved while the entry sat in
                // the pool. Push it back under its live load so heap
                // order stays truthful, within a bounded number of
                // attempts per selection.
                if rekeys <= handles.len() {
                    rekeys += 1;
                    entry.handle.set_in_pool(true);
                    pool.push(PoolEntry {
                        load: live,
                        handle: entry.handle,
                    });
                    continue;
                }
                debug!(
                    backend = %entry.handle.address(),
                    advertised = entry.load,
                    live,
                    "selecting backend despite stale pool key"
                );
            }

            return Some(entry.handle);
        }
    }

    fn on_outcome(&self, handle: &Arc<BackendHandle<Q, S>>) {
        // The handle left the pool when it was selected; take it back
        // now that its post-call load is known. An excluded handle
        // stays out until it recovers.
        self.readmit(handle);
    }

    fn readmit(&self, handle: &Arc<BackendHandle<Q, S>>) {
        if !handle.is_healthy() {
            return;
        }

        let mut pool = self.pool.lock();
        if handle.in_pool() {
            return;
        }
        handle.set_in_pool(true);
        pool.push(PoolEntry {
            load: handle.current_load(),
            handle: Arc::clone(handle),
        });
    }

    fn snapshot(&self, _handles: &[Arc<BackendHandle<Q, S>>]) -> Vec<Arc<str>> {
        let pool = self.pool.lock();
        let mut entries: Vec<_> = pool
            .iter()
            .map(|e| (e.load, Arc::clone(e.handle.address_arc())))
            .collect();
        entries.sort();
        entries.into_iter().map(|(_, addr)| addr).collect()
    }
}

/// Admit every healthy, non-resident handle under its live load.
fn refill<Q, S>(pool: &mut BinaryHeap<PoolEntry<Q, S>>, handles: &[Arc<BackendHandle<Q, S>>]) {
    for handle in handles {
        if handle.is_healthy() && !handle.in_pool() {
            handle.set_in_pool(true);
            pool.push(PoolEntry {
                load: handle.current_load(),
                handle: Arc::clone(handle),
            });
        }
    }
}
