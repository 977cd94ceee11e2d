//! Opportunistic eviction sweep
//!
//! There is no timer. A sweep is attempted on every cache lookup and only
//! scans when at least `check_delay` seconds have passed since the last
//! scan, which keeps lookups O(1) amortized.
//!
//! During a scan:
//! - entries with in-flight executions get their access time refreshed
//! - other entries idle for more than `max_hold` seconds are removed
//!
//! Because sweeps piggyback on lookups, an idle cache is never swept: entries
//! stay resident until the next lookup of any path.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

use super::{CacheSettings, CacheState};
use crate::logging::{operations, services, status};

/// Sweep counters
#[derive(Debug, Default)]
pub struct SweepStats {
    /// Scans that actually ran (throttled attempts are not counted)
    pub sweep_runs: AtomicU64,
    /// Entries removed for being idle
    pub evictions_total: AtomicU64,
}

impl SweepStats {
    pub fn record_run(&self) {
        self.sweep_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.evictions_total.fetch_add(count, Ordering::Relaxed);
    }

    pub fn get_sweep_runs(&self) -> u64 {
        self.sweep_runs.load(Ordering::Relaxed)
    }

    pub fn get_evictions_total(&self) -> u64 {
        self.evictions_total.load(Ordering::Relaxed)
    }
}

/// Whether a scan is due at `now`
pub(crate) fn is_due(last_sweep: u64, now: u64, check_delay: u64) -> bool {
    now.saturating_sub(last_sweep) >= check_delay
}

/// Run the throttled sweep; returns the evicted paths
///
/// The caller must hold the cache lock (it passes the locked state in).
pub(crate) fn sweep<U>(
    state: &mut CacheState<U>,
    now: u64,
    settings: &CacheSettings,
    stats: &SweepStats,
) -> Vec<PathBuf> {
    if !is_due(state.last_sweep, now, settings.check_delay_secs) {
        return Vec::new();
    }

    let started = Instant::now();
    let mut evicted = Vec::new();

    for (path, entry) in &state.entries {
        if entry.executing() > 0 {
            entry.touch(now);
        } else if entry.is_idle(now, settings.max_hold_secs) {
            evicted.push(path.clone());
        }
    }

    for path in &evicted {
        if let Some(entry) = state.entries.remove(path) {
            debug!(
                service = services::SCRIPT_CACHE,
                operation = operations::EVICT,
                path = %path.display(),
                generation = entry.generation(),
                idle_secs = now.saturating_sub(entry.last_access()),
                "evicted idle script"
            );
        }
    }

    state.last_sweep = now;
    stats.record_run();
    stats.record_evictions(evicted.len() as u64);

    if evicted.is_empty() {
        debug!(
            service = services::SCRIPT_CACHE,
            operation = operations::SWEEP,
            entry_count = state.entries.len(),
            "sweep complete: nothing evicted"
        );
    } else {
        info!(
            service = services::SCRIPT_CACHE,
            operation = operations::SWEEP,
            status = status::SUCCESS,
            evicted = evicted.len(),
            entry_count = state.entries.len(),
            duration_us = started.elapsed().as_micros() as u64,
            "sweep evicted {} idle script(s)",
            evicted.len()
        );
    }

    evicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::CacheEntry;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::UNIX_EPOCH;

    fn settings(max_hold: u64, check_delay: u64) -> CacheSettings {
        CacheSettings {
            max_hold_secs: max_hold,
            check_delay_secs: check_delay,
        }
    }

    fn state_with(entries: &[(&str, u64)]) -> CacheState<()> {
        let mut map = HashMap::new();
        for (i, (path, last_access)) in entries.iter().enumerate() {
            map.insert(
                PathBuf::from(path),
                Arc::new(CacheEntry::new(
                    (),
                    PathBuf::from(path),
                    i as u64,
                    UNIX_EPOCH,
                    *last_access,
                )),
            );
        }
        CacheState {
            entries: map,
            last_sweep: 0,
            next_generation: entries.len() as u64,
        }
    }

    #[test]
    fn test_is_due() {
        assert!(is_due(0, 1, 1));
        assert!(!is_due(10, 10, 1));
        assert!(is_due(10, 10, 0));
        assert!(!is_due(10, 5, 1));
    }

    #[test]
    fn test_throttled_sweep_is_noop() {
        let mut state = state_with(&[("/a", 0)]);
        state.last_sweep = 100;
        let stats = SweepStats::default();

        let evicted = sweep(&mut state, 100, &settings(5, 10), &stats);

        assert!(evicted.is_empty());
        assert_eq!(state.last_sweep, 100);
        assert_eq!(stats.get_sweep_runs(), 0);
        assert_eq!(state.entries.len(), 1);
    }

    #[test]
    fn test_evicts_only_idle_entries() {
        let mut state = state_with(&[("/old", 1), ("/fresh", 18), ("/edge", 15)]);
        let stats = SweepStats::default();

        let evicted = sweep(&mut state, 20, &settings(5, 1), &stats);

        assert_eq!(evicted, vec![PathBuf::from("/old")]);
        assert!(state.entries.contains_key(&PathBuf::from("/fresh")));
        // idle for exactly max_hold: kept
        assert!(state.entries.contains_key(&PathBuf::from("/edge")));
        assert_eq!(state.last_sweep, 20);
        assert_eq!(stats.get_sweep_runs(), 1);
        assert_eq!(stats.get_evictions_total(), 1);
    }

    #[test]
    fn test_executing_entry_is_refreshed_not_evicted() {
        let mut state = state_with(&[("/busy", 0)]);
        let busy = state.entries[&PathBuf::from("/busy")].clone();
        busy.begin_execution();
        let stats = SweepStats::default();

        let evicted = sweep(&mut state, 1_000, &settings(5, 1), &stats);

        assert!(evicted.is_empty());
        assert_eq!(busy.last_access(), 1_000);

        // Once released it becomes idle again only after max_hold
        busy.end_execution();
        assert!(sweep(&mut state, 1_004, &settings(5, 1), &stats).is_empty());
        assert_eq!(
            sweep(&mut state, 1_006, &settings(5, 1), &stats),
            vec![PathBuf::from("/busy")]
        );
    }
}
