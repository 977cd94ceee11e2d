//! Execution guard
//!
//! Holding a guard marks an entry as busy: the sweep refreshes its access
//! time instead of evicting it. The counter is incremented in
//! [`ScriptCache::acquire`](super::ScriptCache::acquire) and decremented when
//! the guard is released or dropped, so error returns and panics unwinding
//! through the caller still release it.
//!
//! The guard owns an `Arc` to its entry. If the entry is superseded by a
//! reload while the guard is alive, the old compiled unit stays valid until
//! the last guard (or other handle) goes away.

use std::sync::{Arc, Mutex};

use super::entry::CacheEntry;
use super::{lock_state, CacheState};

pub struct ExecutionGuard<U> {
    state: Arc<Mutex<CacheState<U>>>,
    entry: Arc<CacheEntry<U>>,
}

impl<U> ExecutionGuard<U> {
    /// Must be called with the cache lock held by the caller
    pub(super) fn new(state: Arc<Mutex<CacheState<U>>>, entry: Arc<CacheEntry<U>>) -> Self {
        entry.begin_execution();
        Self { state, entry }
    }

    pub fn entry(&self) -> &Arc<CacheEntry<U>> {
        &self.entry
    }

    /// The compiled unit being executed
    pub fn unit(&self) -> &U {
        self.entry.unit()
    }

    /// Release explicitly; same as dropping the guard
    pub fn release(self) {}
}

impl<U> Drop for ExecutionGuard<U> {
    fn drop(&mut self) {
        let _state = lock_state(&self.state);
        self.entry.end_execution();
    }
}

impl<U> std::fmt::Debug for ExecutionGuard<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionGuard")
            .field("path", &self.entry.path())
            .field("generation", &self.entry.generation())
            .finish()
    }
}
