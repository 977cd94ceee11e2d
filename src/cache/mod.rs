//! Compiled script cache
//!
//! Maps a script path to the compiled unit loaded from it and keeps that
//! unit in step with the file on disk:
//! - **Freshness**: every lookup compares the file's modification time with
//!   the one captured at load time; a difference triggers a full reload
//! - **Eviction**: an opportunistic sweep drops entries idle for longer than
//!   `max_hold` (see [`sweep`])
//! - **Execution safety**: callers wrap invocations in an
//!   [`ExecutionGuard`]; an entry with in-flight executions is never evicted
//!
//! ## Concurrency
//!
//! All bookkeeping (map lookups, freshness checks, loads, sweeps and the
//! execution counters) happens under a single mutex. Invocations themselves
//! run outside it, so a slow script only blocks its own caller. Two callers
//! racing on the same changed file cannot produce two different entries for
//! it, since loads are serialized.
//!
//! Replacing or evicting an entry only unmaps it. Anyone still holding the
//! `Arc<CacheEntry>` (an in-flight guard, a bound method) keeps using the old
//! unit until they let go.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::ScriptError;
use crate::logging::{operations, services, status};
use crate::runtime::{FileStat, RuntimeError, ScriptRuntime, SystemFileStat};

mod entry;
mod guard;
pub mod sweep;

pub use entry::{CacheEntry, EntryInfo};
pub use guard::ExecutionGuard;
pub use sweep::SweepStats;

/// Cache timing settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Idle seconds before an entry with no executions may be evicted
    pub max_hold_secs: u64,
    /// Minimum seconds between sweep scans
    pub check_delay_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_hold_secs: 10 * 60,
            check_delay_secs: 60,
        }
    }
}

impl CacheSettings {
    pub fn new(max_hold: Duration, check_delay: Duration) -> Self {
        Self {
            max_hold_secs: max_hold.as_secs(),
            check_delay_secs: check_delay.as_secs(),
        }
    }
}

/// Result of a cache lookup
pub enum Lookup<U> {
    /// Fresh entry for the current file contents
    Found(Arc<CacheEntry<U>>),
    /// No file at that path; nothing is cached for it
    NotFound,
    /// The file exists but the runtime failed to load it; nothing is cached
    LoadFailed(RuntimeError),
}

impl<U> Lookup<U> {
    /// Turn into a `Result`, treating a missing file as an error
    pub fn into_result(self, path: &Path) -> Result<Arc<CacheEntry<U>>, ScriptError> {
        match self {
            Self::Found(entry) => Ok(entry),
            Self::NotFound => Err(ScriptError::NotFound(path.to_path_buf())),
            Self::LoadFailed(source) => Err(ScriptError::Load {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Turn into a `Result`, treating a missing file as `None`
    pub fn into_option(self, path: &Path) -> Result<Option<Arc<CacheEntry<U>>>, ScriptError> {
        match self {
            Self::NotFound => Ok(None),
            other => other.into_result(path).map(Some),
        }
    }
}

impl<U> std::fmt::Debug for Lookup<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Found(entry) => f
                .debug_tuple("Found")
                .field(&entry.path())
                .field(&entry.generation())
                .finish(),
            Self::NotFound => f.write_str("NotFound"),
            Self::LoadFailed(err) => f.debug_tuple("LoadFailed").field(err).finish(),
        }
    }
}

/// Lookup counters
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    /// Loads of a path with no cached entry
    pub misses: AtomicU64,
    /// Loads that replaced an entry whose file changed
    pub reloads: AtomicU64,
    pub load_failures: AtomicU64,
    pub not_found: AtomicU64,
    pub sweep: SweepStats,
}

impl CacheStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            sweep_runs: self.sweep.get_sweep_runs(),
            evictions: self.sweep.get_evictions_total(),
        }
    }
}

/// Plain copy of [`CacheStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub reloads: u64,
    pub load_failures: u64,
    pub not_found: u64,
    pub sweep_runs: u64,
    pub evictions: u64,
}

pub(crate) struct CacheState<U> {
    pub(crate) entries: HashMap<PathBuf, Arc<CacheEntry<U>>>,
    pub(crate) last_sweep: u64,
    pub(crate) next_generation: u64,
}

impl<U> CacheState<U> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            last_sweep: 0,
            next_generation: 1,
        }
    }
}

/// Lock the cache state, recovering from poisoning
///
/// Every critical section only does counter and map bookkeeping, so state
/// left behind by a panicking holder is still consistent.
pub(crate) fn lock_state<U>(state: &Mutex<CacheState<U>>) -> MutexGuard<'_, CacheState<U>> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Path-keyed cache of compiled scripts
pub struct ScriptCache<R: ScriptRuntime> {
    state: Arc<Mutex<CacheState<R::Unit>>>,
    runtime: R,
    file_stat: Arc<dyn FileStat>,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
    stats: CacheStats,
}

impl<R: ScriptRuntime> ScriptCache<R> {
    /// Create a cache over the local filesystem and wall clock
    pub fn new(runtime: R, settings: CacheSettings) -> Self {
        Self::with_collaborators(
            runtime,
            Arc::new(SystemFileStat),
            Arc::new(SystemClock),
            settings,
        )
    }

    pub fn with_collaborators(
        runtime: R,
        file_stat: Arc<dyn FileStat>,
        clock: Arc<dyn Clock>,
        settings: CacheSettings,
    ) -> Self {
        info!(
            service = services::SCRIPT_CACHE,
            max_hold_secs = settings.max_hold_secs,
            check_delay_secs = settings.check_delay_secs,
            "script cache initialized"
        );

        Self {
            state: Arc::new(Mutex::new(CacheState::new())),
            runtime,
            file_stat,
            clock,
            settings,
            stats: CacheStats::default(),
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn settings(&self) -> CacheSettings {
        self.settings
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<R::Unit>> {
        lock_state(&self.state)
    }

    /// Find or load the compiled unit for `path`
    ///
    /// - cached and unchanged on disk: hit, access time refreshed, then sweep
    /// - cached but the file is gone: entry purged, `NotFound`
    /// - cached but the file changed: old entry unmapped, sweep, file reloaded
    /// - not cached: sweep, then file loaded if it exists
    ///
    /// A hit is touched before the sweep runs, so an entry that is being
    /// looked up is never evicted by that same lookup.
    ///
    /// A failed load caches nothing, so the next lookup retries it.
    pub fn lookup(&self, path: &Path) -> Lookup<R::Unit> {
        let now = self.clock.now_secs();
        let mut state = self.lock();

        let mut reloading = false;
        if let Some(entry) = state.entries.get(path).cloned() {
            match self.file_stat.modified(path) {
                None => {
                    state.entries.remove(path);
                    CacheStats::bump(&self.stats.not_found);
                    error!(
                        service = services::SCRIPT_CACHE,
                        operation = operations::LOOKUP,
                        status = status::NOT_FOUND,
                        path = %path.display(),
                        "cached script no longer exists"
                    );
                    return Lookup::NotFound;
                }
                Some(modified) if modified == entry.last_modified() => {
                    entry.touch(now);
                    sweep::sweep(&mut state, now, &self.settings, &self.stats.sweep);
                    CacheStats::bump(&self.stats.hits);
                    debug!(
                        service = services::SCRIPT_CACHE,
                        operation = operations::LOOKUP,
                        status = status::HIT,
                        path = %path.display(),
                        generation = entry.generation(),
                        "cache hit"
                    );
                    return Lookup::Found(entry);
                }
                Some(_) => {
                    state.entries.remove(path);
                    reloading = true;
                    debug!(
                        service = services::SCRIPT_CACHE,
                        operation = operations::LOOKUP,
                        status = status::STALE,
                        path = %path.display(),
                        generation = entry.generation(),
                        executing = entry.executing(),
                        "script changed on disk"
                    );
                }
            }
        }

        sweep::sweep(&mut state, now, &self.settings, &self.stats.sweep);

        let Some(modified) = self.file_stat.modified(path) else {
            CacheStats::bump(&self.stats.not_found);
            info!(
                service = services::SCRIPT_CACHE,
                operation = operations::LOOKUP,
                status = status::NOT_FOUND,
                path = %path.display(),
                "script not found"
            );
            return Lookup::NotFound;
        };

        let started = std::time::Instant::now();
        match self.runtime.load(path) {
            Ok(unit) => {
                let generation = state.next_generation;
                state.next_generation += 1;

                let entry = Arc::new(CacheEntry::new(
                    unit,
                    path.to_path_buf(),
                    generation,
                    modified,
                    now,
                ));
                state.entries.insert(path.to_path_buf(), Arc::clone(&entry));

                let op = if reloading {
                    CacheStats::bump(&self.stats.reloads);
                    operations::RELOAD
                } else {
                    CacheStats::bump(&self.stats.misses);
                    operations::LOAD
                };
                info!(
                    service = services::SCRIPT_CACHE,
                    operation = op,
                    status = status::SUCCESS,
                    path = %path.display(),
                    generation,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "script loaded"
                );

                Lookup::Found(entry)
            }
            Err(err) => {
                CacheStats::bump(&self.stats.load_failures);
                error!(
                    service = services::SCRIPT_CACHE,
                    operation = operations::LOAD,
                    status = status::ERROR,
                    path = %path.display(),
                    error = %err,
                    "error loading script"
                );
                Lookup::LoadFailed(err)
            }
        }
    }

    /// [`lookup`](Self::lookup) with a missing file reported as an error
    pub fn get_or_load(&self, path: &Path) -> Result<Arc<CacheEntry<R::Unit>>, ScriptError> {
        self.lookup(path).into_result(path)
    }

    /// Mark `entry` as executing until the returned guard is released
    pub fn acquire(&self, entry: &Arc<CacheEntry<R::Unit>>) -> ExecutionGuard<R::Unit> {
        let _state = self.lock();
        ExecutionGuard::new(Arc::clone(&self.state), Arc::clone(entry))
    }

    /// Locate the unit at `path` and run its constructor
    pub fn invoke_constructor(
        &self,
        path: &Path,
        args: &[serde_json::Value],
    ) -> Result<R::Instance, ScriptError> {
        let entry = self.get_or_load(path)?;
        let guard = self.acquire(&entry);
        let result = self.runtime.invoke_constructor(guard.unit(), args);
        guard.release();

        result.map_err(|source| {
            warn!(
                service = services::SCRIPT_CACHE,
                operation = operations::CONSTRUCT,
                status = status::ERROR,
                path = %path.display(),
                generation = entry.generation(),
                error = %source,
                "constructor failed"
            );
            ScriptError::Construction {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Unmap the entry for `path`; returns whether one existed
    pub fn invalidate(&self, path: &Path) -> bool {
        self.lock().entries.remove(path).is_some()
    }

    /// Unmap every entry; returns how many there were
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let count = state.entries.len();
        state.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().entries.contains_key(path)
    }

    /// Entries currently reachable by lookup, sorted by path
    pub fn snapshot(&self) -> Vec<EntryInfo> {
        let state = self.lock();
        let mut infos: Vec<EntryInfo> = state.entries.values().map(|e| e.info()).collect();
        infos.sort_by(|a, b| a.path.cmp(&b.path));
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicUsize;
    use std::time::{SystemTime, UNIX_EPOCH};

    /// In-memory files: path -> (mtime seconds, source)
    #[derive(Default)]
    struct FakeFs {
        files: Mutex<HashMap<PathBuf, (u64, String)>>,
    }

    impl FakeFs {
        fn write(&self, path: &str, mtime: u64, source: &str) {
            self.files
                .lock()
                .unwrap()
                .insert(PathBuf::from(path), (mtime, source.to_string()));
        }

        fn remove(&self, path: &str) {
            self.files.lock().unwrap().remove(Path::new(path));
        }
    }

    impl FileStat for FakeFs {
        fn modified(&self, path: &Path) -> Option<SystemTime> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .map(|(mtime, _)| UNIX_EPOCH + Duration::from_secs(*mtime))
        }
    }

    /// Runtime whose "compiled unit" is the file source
    struct FakeRuntime {
        fs: Arc<FakeFs>,
        loads: AtomicUsize,
    }

    impl ScriptRuntime for FakeRuntime {
        type Unit = String;
        type Member = String;
        type Instance = String;

        fn load(&self, path: &Path) -> Result<String, RuntimeError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let files = self.fs.files.lock().unwrap();
            let (_, source) = files
                .get(path)
                .ok_or_else(|| RuntimeError::new("no such file"))?;
            if source.starts_with("syntax error") {
                return Err(RuntimeError::new(source.clone()));
            }
            Ok(source.clone())
        }

        fn resolve_member(&self, unit: &String, name: &str) -> Result<String, RuntimeError> {
            if unit.contains(name) {
                Ok(name.to_string())
            } else {
                Err(RuntimeError::new(format!("no member named `{}`", name)))
            }
        }

        fn invoke(
            &self,
            member: &String,
            _instance: Option<&String>,
            _args: &[Value],
        ) -> Result<Value, RuntimeError> {
            if member == "fail" {
                return Err(RuntimeError::new("member failed"));
            }
            Ok(json!(member))
        }

        fn invoke_constructor(&self, unit: &String, args: &[Value]) -> Result<String, RuntimeError> {
            if unit.contains("no_ctor") {
                return Err(RuntimeError::new("constructor failed"));
            }
            Ok(format!("{}:{}", unit, args.len()))
        }
    }

    struct Harness {
        fs: Arc<FakeFs>,
        clock: Arc<ManualClock>,
        cache: ScriptCache<FakeRuntime>,
    }

    impl Harness {
        fn new(max_hold: u64, check_delay: u64) -> Self {
            let fs = Arc::new(FakeFs::default());
            let clock = Arc::new(ManualClock::new(0));
            let runtime = FakeRuntime {
                fs: Arc::clone(&fs),
                loads: AtomicUsize::new(0),
            };
            let cache = ScriptCache::with_collaborators(
                runtime,
                fs.clone(),
                clock.clone(),
                CacheSettings {
                    max_hold_secs: max_hold,
                    check_delay_secs: check_delay,
                },
            );
            Self { fs, clock, cache }
        }

        fn loads(&self) -> usize {
            self.cache.runtime().loads.load(Ordering::SeqCst)
        }
    }

    fn found(lookup: Lookup<String>) -> Arc<CacheEntry<String>> {
        match lookup {
            Lookup::Found(entry) => entry,
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[test]
    fn test_cache_hit_returns_same_entry() {
        let h = Harness::new(600, 60);
        h.fs.write("/app/a.lua", 100, "v1");

        let first = found(h.cache.lookup(Path::new("/app/a.lua")));
        h.clock.set(1);
        let second = found(h.cache.lookup(Path::new("/app/a.lua")));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(h.loads(), 1);
        assert_eq!(second.last_access(), 1);
        assert_eq!(h.cache.stats().hits, 1);
        assert_eq!(h.cache.stats().misses, 1);
    }

    #[test]
    fn test_changed_file_is_reloaded() {
        let h = Harness::new(600, 60);
        h.fs.write("/app/a.lua", 100, "v1");

        let first = found(h.cache.lookup(Path::new("/app/a.lua")));
        h.fs.write("/app/a.lua", 200, "v2");
        let second = found(h.cache.lookup(Path::new("/app/a.lua")));

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.unit(), "v1");
        assert_eq!(second.unit(), "v2");
        assert_eq!(second.last_modified(), UNIX_EPOCH + Duration::from_secs(200));
        assert!(second.generation() > first.generation());
        assert_eq!(h.loads(), 2);
        assert_eq!(h.cache.stats().reloads, 1);
        assert_eq!(h.cache.len(), 1);
    }

    #[test]
    fn test_missing_file_caches_nothing() {
        let h = Harness::new(600, 60);

        assert!(matches!(
            h.cache.lookup(Path::new("/app/missing.lua")),
            Lookup::NotFound
        ));
        assert!(h.cache.is_empty());
        assert_eq!(h.loads(), 0);

        let err = h.cache.get_or_load(Path::new("/app/missing.lua")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_vanished_file_purges_entry() {
        let h = Harness::new(600, 60);
        h.fs.write("/app/a.lua", 100, "v1");
        let entry = found(h.cache.lookup(Path::new("/app/a.lua")));

        h.fs.remove("/app/a.lua");
        assert!(matches!(
            h.cache.lookup(Path::new("/app/a.lua")),
            Lookup::NotFound
        ));
        assert!(!h.cache.contains(Path::new("/app/a.lua")));
        // The caller's handle is still usable
        assert_eq!(entry.unit(), "v1");
    }

    #[test]
    fn test_load_failure_is_retried() {
        let h = Harness::new(600, 60);
        h.fs.write("/app/a.lua", 100, "syntax error near end");

        match h.cache.lookup(Path::new("/app/a.lua")) {
            Lookup::LoadFailed(err) => assert!(err.message().contains("syntax error")),
            other => panic!("expected LoadFailed, got {:?}", other),
        }
        assert!(h.cache.is_empty());

        // Same mtime, but nothing was cached, so the load is attempted again
        assert!(matches!(
            h.cache.lookup(Path::new("/app/a.lua")),
            Lookup::LoadFailed(_)
        ));
        assert_eq!(h.loads(), 2);

        h.fs.write("/app/a.lua", 101, "fixed");
        assert_eq!(found(h.cache.lookup(Path::new("/app/a.lua"))).unit(), "fixed");
        assert_eq!(h.cache.stats().load_failures, 2);
    }

    #[test]
    fn test_get_or_load_maps_load_error() {
        let h = Harness::new(600, 60);
        h.fs.write("/app/a.lua", 100, "syntax error");

        let err = h.cache.get_or_load(Path::new("/app/a.lua")).unwrap_err();
        assert_eq!(err.kind(), "load_error");
        assert_eq!(err.path(), Path::new("/app/a.lua"));
    }

    #[test]
    fn test_lookup_into_option() {
        let h = Harness::new(600, 60);
        let path = Path::new("/app/a.lua");

        assert!(h.cache.lookup(path).into_option(path).unwrap().is_none());

        h.fs.write("/app/a.lua", 100, "v1");
        assert!(h.cache.lookup(path).into_option(path).unwrap().is_some());
    }

    #[test]
    fn test_documented_scenario() {
        // MaxHold = 5, CheckCacheDelay = 1
        let h = Harness::new(5, 1);
        let path = Path::new("/app/A.lua");

        // t=0: file created with mtime 100, first lookup loads it
        h.fs.write("/app/A.lua", 100, "v1");
        let first = found(h.cache.lookup(path));
        assert_eq!(first.last_access(), 0);

        // t=1: hit
        h.clock.set(1);
        let hit = found(h.cache.lookup(path));
        assert!(Arc::ptr_eq(&first, &hit));
        assert_eq!(hit.last_access(), 1);

        // t=2: modified, reload
        h.clock.set(2);
        h.fs.write("/app/A.lua", 200, "v2");
        let reloaded = found(h.cache.lookup(path));
        assert!(!Arc::ptr_eq(&first, &reloaded));
        assert_eq!(reloaded.last_modified(), UNIX_EPOCH + Duration::from_secs(200));

        // t=10: idle for 8s > 5s; a lookup of another script sweeps it out
        h.fs.write("/app/B.lua", 100, "b");
        h.clock.set(10);
        found(h.cache.lookup(Path::new("/app/B.lua")));
        assert!(!h.cache.contains(path));
        assert_eq!(h.cache.stats().evictions, 1);

        // The next lookup of A is a clean reload from disk
        let fresh = found(h.cache.lookup(path));
        assert!(!Arc::ptr_eq(&reloaded, &fresh));
        assert_eq!(fresh.unit(), "v2");
        assert_eq!(h.loads(), 4);
    }

    #[test]
    fn test_hit_after_idle_window_keeps_entry() {
        let h = Harness::new(5, 1);
        let path = Path::new("/app/a.lua");
        h.fs.write("/app/a.lua", 100, "v1");

        let first = found(h.cache.lookup(path));
        h.clock.set(10);
        let second = found(h.cache.lookup(path));

        // Touched before the sweep, so the lookup itself never evicts it
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(h.loads(), 1);
        assert_eq!(second.last_access(), 10);
        assert_eq!(h.cache.stats().sweep_runs, 1);
        assert_eq!(h.cache.stats().evictions, 0);
    }

    #[test]
    fn test_reload_runs_sweep() {
        let h = Harness::new(5, 1);
        h.fs.write("/app/a.lua", 100, "a");
        h.fs.write("/app/b.lua", 100, "b1");
        found(h.cache.lookup(Path::new("/app/a.lua")));
        found(h.cache.lookup(Path::new("/app/b.lua")));

        h.clock.set(10);
        h.fs.write("/app/b.lua", 200, "b2");
        assert_eq!(found(h.cache.lookup(Path::new("/app/b.lua"))).unit(), "b2");

        assert!(!h.cache.contains(Path::new("/app/a.lua")));
        assert_eq!(h.cache.stats().reloads, 1);
        assert_eq!(h.cache.stats().evictions, 1);
    }

    #[test]
    fn test_executing_entry_survives_sweeps() {
        let h = Harness::new(5, 1);
        h.fs.write("/app/busy.lua", 100, "busy");
        h.fs.write("/app/other.lua", 100, "other");

        let busy = found(h.cache.lookup(Path::new("/app/busy.lua")));
        let guard = h.cache.acquire(&busy);
        assert_eq!(busy.executing(), 1);

        // Lookups of another path keep triggering sweeps
        for t in [10, 100, 1_000] {
            h.clock.set(t);
            found(h.cache.lookup(Path::new("/app/other.lua")));
            assert!(h.cache.contains(Path::new("/app/busy.lua")));
        }

        guard.release();
        assert_eq!(busy.executing(), 0);

        // Refreshed by the last sweep at t=1000, evicted once idle past max_hold
        h.clock.set(1_006);
        found(h.cache.lookup(Path::new("/app/other.lua")));
        assert!(!h.cache.contains(Path::new("/app/busy.lua")));
    }

    #[test]
    fn test_sweep_is_throttled() {
        let h = Harness::new(5, 100);
        h.fs.write("/app/a.lua", 100, "a");
        h.fs.write("/app/b.lua", 100, "b");

        // First scan happens at t=100 (100s after the initial last_sweep of 0)
        h.clock.set(100);
        found(h.cache.lookup(Path::new("/app/a.lua")));
        assert_eq!(h.cache.stats().sweep_runs, 1);

        // a is idle for 50s, but no scan is due until t=200
        h.clock.set(150);
        found(h.cache.lookup(Path::new("/app/b.lua")));
        assert!(h.cache.contains(Path::new("/app/a.lua")));
        assert_eq!(h.cache.stats().sweep_runs, 1);

        h.clock.set(200);
        found(h.cache.lookup(Path::new("/app/b.lua")));
        assert!(!h.cache.contains(Path::new("/app/a.lua")));
        assert_eq!(h.cache.stats().sweep_runs, 2);
    }

    #[test]
    fn test_no_traffic_no_eviction() {
        let h = Harness::new(5, 1);
        h.fs.write("/app/a.lua", 100, "a");
        found(h.cache.lookup(Path::new("/app/a.lua")));

        // Time passes but nobody looks anything up
        h.clock.set(1_000_000);
        assert!(h.cache.contains(Path::new("/app/a.lua")));
        assert_eq!(h.cache.len(), 1);
    }

    #[test]
    fn test_superseded_entry_stays_alive_while_executing() {
        let h = Harness::new(600, 60);
        h.fs.write("/app/a.lua", 100, "v1");

        let old = found(h.cache.lookup(Path::new("/app/a.lua")));
        let guard = h.cache.acquire(&old);

        h.fs.write("/app/a.lua", 200, "v2");
        let new = found(h.cache.lookup(Path::new("/app/a.lua")));

        assert_eq!(guard.unit(), "v1");
        assert_eq!(new.unit(), "v2");
        assert_eq!(old.executing(), 1);
        assert_eq!(new.executing(), 0);

        drop(guard);
        assert_eq!(old.executing(), 0);
    }

    #[test]
    fn test_invoke_constructor() {
        let h = Harness::new(600, 60);
        h.fs.write("/app/a.lua", 100, "widget");
        h.fs.write("/app/b.lua", 100, "no_ctor");

        let instance = h
            .cache
            .invoke_constructor(Path::new("/app/a.lua"), &[json!(1), json!(2)])
            .unwrap();
        assert_eq!(instance, "widget:2");

        let err = h
            .cache
            .invoke_constructor(Path::new("/app/b.lua"), &[])
            .unwrap_err();
        assert_eq!(err.kind(), "construction_error");
        // The unit itself is fine and stays cached
        assert!(h.cache.contains(Path::new("/app/b.lua")));

        let err = h
            .cache
            .invoke_constructor(Path::new("/app/c.lua"), &[])
            .unwrap_err();
        assert!(err.is_not_found());

        let entry = found(h.cache.lookup(Path::new("/app/a.lua")));
        assert_eq!(entry.executing(), 0);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let h = Harness::new(600, 60);
        h.fs.write("/app/a.lua", 100, "a");
        h.fs.write("/app/b.lua", 100, "b");
        found(h.cache.lookup(Path::new("/app/a.lua")));
        found(h.cache.lookup(Path::new("/app/b.lua")));

        assert!(h.cache.invalidate(Path::new("/app/a.lua")));
        assert!(!h.cache.invalidate(Path::new("/app/a.lua")));
        assert_eq!(h.cache.len(), 1);

        assert_eq!(h.cache.clear(), 1);
        assert!(h.cache.is_empty());
    }

    #[test]
    fn test_snapshot_sorted() {
        let h = Harness::new(600, 60);
        h.fs.write("/app/b.lua", 100, "b");
        h.fs.write("/app/a.lua", 100, "a");
        found(h.cache.lookup(Path::new("/app/b.lua")));
        found(h.cache.lookup(Path::new("/app/a.lua")));

        let paths: Vec<PathBuf> = h.cache.snapshot().into_iter().map(|i| i.path).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("/app/a.lua"), PathBuf::from("/app/b.lua")]
        );
    }

    #[test]
    fn test_concurrent_guards_balance() {
        let h = Arc::new(Harness::new(600, 60));
        h.fs.write("/app/a.lua", 100, "ok fail");
        let entry = found(h.cache.lookup(Path::new("/app/a.lua")));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let h = Arc::clone(&h);
                let entry = Arc::clone(&entry);
                std::thread::spawn(move || {
                    let name = if i % 2 == 0 { "fail" } else { "ok" };
                    let member = h.cache.runtime().resolve_member(entry.unit(), name).unwrap();
                    for _ in 0..100 {
                        let guard = h.cache.acquire(&entry);
                        let result = h.cache.runtime().invoke(&member, None, &[]);
                        guard.release();
                        assert_eq!(result.is_err(), name == "fail");
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(entry.executing(), 0);
    }

    #[test]
    fn test_guard_released_on_panic() {
        let h = Harness::new(600, 60);
        h.fs.write("/app/a.lua", 100, "a");
        let entry = found(h.cache.lookup(Path::new("/app/a.lua")));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = h.cache.acquire(&entry);
            panic!("script blew up");
        }));

        assert!(result.is_err());
        assert_eq!(entry.executing(), 0);
        // Cache is still usable after the panic
        assert!(h.cache.contains(Path::new("/app/a.lua")));
    }
}
