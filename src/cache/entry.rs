use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::SystemTime;

/// One cached script: its compiled unit plus freshness and usage metadata
///
/// `last_access` and `executing` are atomics so the entry can be shared
/// through an `Arc`, but they are only written while the owning cache's lock
/// is held. That is what keeps a sweep from racing an `acquire`.
#[derive(Debug)]
pub struct CacheEntry<U> {
    unit: U,
    path: PathBuf,
    generation: u64,
    last_modified: SystemTime,
    last_access: AtomicU64,
    executing: AtomicUsize,
}

impl<U> CacheEntry<U> {
    pub(crate) fn new(
        unit: U,
        path: PathBuf,
        generation: u64,
        last_modified: SystemTime,
        now: u64,
    ) -> Self {
        Self {
            unit,
            path,
            generation,
            last_modified,
            last_access: AtomicU64::new(now),
            executing: AtomicUsize::new(0),
        }
    }

    /// The compiled unit
    pub fn unit(&self) -> &U {
        &self.unit
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load sequence number, unique per cache; a reload always gets a new one
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// File modification time observed when this entry was loaded
    pub fn last_modified(&self) -> SystemTime {
        self.last_modified
    }

    /// Last lookup (or busy sweep) time in Unix seconds
    pub fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::SeqCst)
    }

    /// Number of in-flight invocations
    pub fn executing(&self) -> usize {
        self.executing.load(Ordering::SeqCst)
    }

    pub(crate) fn touch(&self, now: u64) {
        self.last_access.store(now, Ordering::SeqCst);
    }

    pub(crate) fn begin_execution(&self) {
        self.executing.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn end_execution(&self) {
        // Never underflow, even if a caller releases something it never acquired
        let _ = self
            .executing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub(crate) fn is_idle(&self, now: u64, max_hold: u64) -> bool {
        now.saturating_sub(self.last_access()) > max_hold
    }

    pub fn info(&self) -> EntryInfo {
        EntryInfo {
            path: self.path.clone(),
            generation: self.generation,
            last_modified: DateTime::<Utc>::from(self.last_modified),
            last_access: self.last_access(),
            executing: self.executing(),
        }
    }
}

/// Point-in-time view of an entry, for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub path: PathBuf,
    pub generation: u64,
    pub last_modified: DateTime<Utc>,
    pub last_access: u64,
    pub executing: usize,
}
