//! Memoising wrapper around a direction resolver.
//!
//! Tables are keyed on the resolver name and every request field that can
//! change the result. Entries live in memory and, when a directory is
//! configured, as JSON files that survive across processes. Requests with
//! `cache_enabled = false` always reach the wrapped resolver.
//!
//! File names are the 64-bit FNV-1a hash of the key, so they stay the same
//! across builds and toolchains. Each file stores its full key, and a
//! file whose key differs from the request is treated as a miss.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use animaire_core::engine::{CollaboratorError, DirectionResolver, ResolveRequest};
use animaire_core::types::RawDirectionTable;

use crate::error::DirectionError;

/// Which entry to drop when the in-memory cache is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    #[default]
    #[serde(alias = "lru")]
    LeastRecentlyUsed,
    Fifo,
    /// Keep everything.
    Never,
}

fn default_max_entries() -> usize {
    64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory for persistent entries; in-memory only when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Bound on the entries held in memory and, separately, on the entry
    /// files in `directory`. On disk the file least recently written or
    /// loaded from disk goes first under LRU, the oldest written under FIFO.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default)]
    pub eviction: EvictionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: None,
            max_entries: default_max_entries(),
            eviction: EvictionPolicy::default(),
        }
    }
}

/// Hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, RawDirectionTable>,
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

#[derive(Serialize, Deserialize)]
struct DiskEntry {
    key: String,
    table: RawDirectionTable,
}

/// Wraps a resolver and reuses tables for repeated requests.
pub struct CachedResolver<R: DirectionResolver> {
    inner: R,
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl<R: DirectionResolver> CachedResolver<R> {
    pub fn new(inner: R, config: CacheConfig) -> Self {
        Self {
            inner,
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            entries: state.entries.len(),
        }
    }

    /// Drop all in-memory entries. Files on disk are left alone.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.clear();
        state.order.clear();
    }

    fn key(&self, request: &ResolveRequest<'_>) -> Result<String, DirectionError> {
        #[derive(Serialize)]
        struct Key<'a> {
            resolver: &'a str,
            request: &'a ResolveRequest<'a>,
        }
        let mut canonical = *request;
        canonical.cache_enabled = true;
        Ok(serde_json::to_string(&Key {
            resolver: self.inner.name(),
            request: &canonical,
        })?)
    }

    fn file_for(dir: &Path, key: &str) -> PathBuf {
        dir.join(format!("{:016x}.json", fnv1a_64(key.as_bytes())))
    }

    fn lookup_memory(&self, key: &str) -> Option<RawDirectionTable> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let table = state.entries.get(key).cloned();
        match table {
            Some(table) => {
                state.hits += 1;
                if self.config.eviction == EvictionPolicy::LeastRecentlyUsed {
                    if let Some(pos) = state.order.iter().position(|k| k == key) {
                        if let Some(k) = state.order.remove(pos) {
                            state.order.push_back(k);
                        }
                    }
                }
                Some(table)
            }
            None => None,
        }
    }

    fn lookup_disk(&self, key: &str) -> Option<RawDirectionTable> {
        let dir = self.config.directory.as_ref()?;
        let path = Self::file_for(dir, key);
        if !path.exists() {
            return None;
        }
        let parsed = std::fs::read_to_string(&path)
            .map_err(DirectionError::from)
            .and_then(|text| Ok(serde_json::from_str::<DiskEntry>(&text)?));
        match parsed {
            Ok(entry) if entry.key == key => {
                if self.config.eviction == EvictionPolicy::LeastRecentlyUsed {
                    touch(&path);
                }
                Some(entry.table)
            }
            Ok(_) => {
                log::warn!("Cache file {} belongs to another request", path.display());
                None
            }
            Err(e) => {
                log::warn!("Ignoring unreadable cache file {}: {}", path.display(), e);
                None
            }
        }
    }

    fn store_disk(&self, key: &str, table: &RawDirectionTable) {
        let Some(dir) = self.config.directory.as_ref() else {
            return;
        };
        let entry = DiskEntry {
            key: key.to_string(),
            table: table.clone(),
        };
        let path = Self::file_for(dir, key);
        let result = std::fs::create_dir_all(dir)
            .map_err(DirectionError::from)
            .and_then(|_| Ok(serde_json::to_string(&entry)?))
            .and_then(|json| Ok(std::fs::write(&path, json)?));
        match result {
            Ok(()) if self.config.eviction != EvictionPolicy::Never => self.prune_disk(dir, &path),
            Ok(()) => {}
            Err(e) => log::warn!("Could not persist direction cache entry: {}", e),
        }
    }

    /// Delete the oldest entry files until at most `max_entries` remain.
    /// `keep` is never removed.
    fn prune_disk(&self, dir: &Path, keep: &Path) {
        let listing = match std::fs::read_dir(dir) {
            Ok(listing) => listing,
            Err(e) => {
                log::warn!("Could not list cache directory {}: {}", dir.display(), e);
                return;
            }
        };
        let mut files: Vec<(SystemTime, PathBuf)> = listing
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| is_entry_file(path))
            .map(|path| {
                let modified = std::fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, path)
            })
            .collect();
        if files.len() <= self.config.max_entries {
            return;
        }
        files.sort();

        let mut excess = files.len() - self.config.max_entries;
        for (_, path) in files {
            if excess == 0 {
                break;
            }
            if path == keep {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => log::debug!("Evicted cache file {}", path.display()),
                Err(e) => log::warn!("Could not evict cache file {}: {}", path.display(), e),
            }
            excess -= 1;
        }
    }

    fn insert_memory(&self, key: String, table: RawDirectionTable) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.entries.insert(key.clone(), table).is_none() {
            state.order.push_back(key);
        }
        if self.config.eviction == EvictionPolicy::Never {
            return;
        }
        while state.entries.len() > self.config.max_entries {
            match state.order.pop_front() {
                Some(oldest) => {
                    state.entries.remove(&oldest);
                    log::debug!("Evicted direction cache entry");
                }
                None => break,
            }
        }
    }
}

/// 64-bit FNV-1a.
fn fnv1a_64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET_BASIS, |hash, &b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
}

/// `<16 hex digits>.json`, the shape of names written by `file_for`.
fn is_entry_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
        && path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .is_some_and(|stem| stem.len() == 16 && stem.chars().all(|c| c.is_ascii_hexdigit()))
}

fn touch(path: &Path) {
    let result = std::fs::File::options()
        .append(true)
        .open(path)
        .and_then(|file| file.set_modified(SystemTime::now()));
    if let Err(e) = result {
        log::debug!("Could not refresh cache file {}: {}", path.display(), e);
    }
}

impl<R: DirectionResolver> DirectionResolver for CachedResolver<R> {
    fn resolve(&self, request: &ResolveRequest<'_>) -> Result<RawDirectionTable, CollaboratorError> {
        if !request.cache_enabled {
            return self.inner.resolve(request);
        }
        let key = self.key(request)?;

        if let Some(table) = self.lookup_memory(&key) {
            log::debug!("Direction cache hit ({} rows)", table.rows.len());
            return Ok(table);
        }
        if let Some(table) = self.lookup_disk(&key) {
            log::info!("Loaded asymptotic directions from disk cache");
            {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                state.hits += 1;
            }
            self.insert_memory(key, table.clone());
            return Ok(table);
        }

        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.misses += 1;
        }
        let table = self.inner.resolve(request)?;
        self.store_disk(&key, &table);
        self.insert_memory(key, table.clone());
        Ok(table)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use animaire_core::types::{KpIndex, RawDirectionRow, SampleGrid};
    use chrono::NaiveDateTime;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    impl Counting {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DirectionResolver for Counting {
        fn resolve(&self, request: &ResolveRequest<'_>) -> Result<RawDirectionTable, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let rows = request
                .grid
                .points()
                .iter()
                .map(|p| RawDirectionRow {
                    latitude: p.latitude,
                    longitude: p.longitude,
                    zenith_deg: 0.0,
                    azimuth_deg: 0.0,
                    asymptotic_latitude: p.latitude,
                    asymptotic_longitude: p.longitude,
                    cutoff_rigidity_gv: request.kp.value() as f64,
                })
                .collect();
            Ok(RawDirectionTable { rows })
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn request<'a>(
        grid: &'a SampleGrid,
        kp: u8,
        cache_enabled: bool,
        extra: &'a BTreeMap<String, String>,
    ) -> ResolveRequest<'a> {
        ResolveRequest {
            grid,
            kp: KpIndex::new(kp).unwrap(),
            date_and_time: NaiveDateTime::default(),
            cache_enabled,
            angles: None,
            extra,
        }
    }

    fn config(max_entries: usize, eviction: EvictionPolicy) -> CacheConfig {
        CacheConfig {
            directory: None,
            max_entries,
            eviction,
        }
    }

    #[test]
    fn test_repeated_requests_hit_the_cache() {
        let cached = CachedResolver::new(Counting::new(), CacheConfig::default());
        let grid = SampleGrid::from_pairs(&[(10.0, 10.0)]).unwrap();
        let extra = BTreeMap::new();
        let first = cached.resolve(&request(&grid, 2, true, &extra)).unwrap();
        let second = cached.resolve(&request(&grid, 2, true, &extra)).unwrap();
        assert_eq!(first, second);
        assert_eq!(cached.inner().calls(), 1);
        assert_eq!(
            cached.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );

        cached.resolve(&request(&grid, 5, true, &extra)).unwrap();
        assert_eq!(cached.inner().calls(), 2);
    }

    #[test]
    fn test_disabled_cache_always_calls_through() {
        let cached = CachedResolver::new(Counting::new(), CacheConfig::default());
        let grid = SampleGrid::from_pairs(&[(10.0, 10.0)]).unwrap();
        let extra = BTreeMap::new();
        for _ in 0..3 {
            cached.resolve(&request(&grid, 1, false, &extra)).unwrap();
        }
        assert_eq!(cached.inner().calls(), 3);
        assert_eq!(cached.stats().entries, 0);
    }

    #[test]
    fn test_lru_keeps_recently_used_entry() {
        let cached = CachedResolver::new(Counting::new(), config(2, EvictionPolicy::LeastRecentlyUsed));
        let grid = SampleGrid::from_pairs(&[(0.0, 0.0)]).unwrap();
        let extra = BTreeMap::new();
        cached.resolve(&request(&grid, 1, true, &extra)).unwrap();
        cached.resolve(&request(&grid, 2, true, &extra)).unwrap();
        cached.resolve(&request(&grid, 1, true, &extra)).unwrap(); // touch kp=1
        cached.resolve(&request(&grid, 3, true, &extra)).unwrap(); // evicts kp=2
        assert_eq!(cached.inner().calls(), 3);

        cached.resolve(&request(&grid, 1, true, &extra)).unwrap();
        assert_eq!(cached.inner().calls(), 3);
        cached.resolve(&request(&grid, 2, true, &extra)).unwrap();
        assert_eq!(cached.inner().calls(), 4);
    }

    #[test]
    fn test_fifo_evicts_oldest_insert() {
        let cached = CachedResolver::new(Counting::new(), config(2, EvictionPolicy::Fifo));
        let grid = SampleGrid::from_pairs(&[(0.0, 0.0)]).unwrap();
        let extra = BTreeMap::new();
        cached.resolve(&request(&grid, 1, true, &extra)).unwrap();
        cached.resolve(&request(&grid, 2, true, &extra)).unwrap();
        cached.resolve(&request(&grid, 1, true, &extra)).unwrap();
        cached.resolve(&request(&grid, 3, true, &extra)).unwrap(); // evicts kp=1
        cached.resolve(&request(&grid, 1, true, &extra)).unwrap();
        assert_eq!(cached.inner().calls(), 4);
    }

    #[test]
    fn test_never_policy_is_unbounded() {
        let cached = CachedResolver::new(Counting::new(), config(1, EvictionPolicy::Never));
        let grid = SampleGrid::from_pairs(&[(0.0, 0.0)]).unwrap();
        let extra = BTreeMap::new();
        for kp in 0..5 {
            cached.resolve(&request(&grid, kp, true, &extra)).unwrap();
        }
        assert_eq!(cached.stats().entries, 5);
    }

    #[test]
    fn test_options_are_part_of_the_key() {
        let cached = CachedResolver::new(Counting::new(), CacheConfig::default());
        let grid = SampleGrid::from_pairs(&[(0.0, 0.0)]).unwrap();
        let plain = BTreeMap::new();
        let mut tuned = BTreeMap::new();
        tuned.insert("pole_latitude".to_string(), "79.0".to_string());
        cached.resolve(&request(&grid, 1, true, &plain)).unwrap();
        cached.resolve(&request(&grid, 1, true, &tuned)).unwrap();
        assert_eq!(cached.inner().calls(), 2);
    }

    #[test]
    fn test_disk_entries_survive_a_new_resolver() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CacheConfig {
            directory: Some(dir.path().join("cache")),
            ..CacheConfig::default()
        };
        let grid = SampleGrid::from_pairs(&[(30.0, 40.0), (31.0, 41.0)]).unwrap();
        let extra = BTreeMap::new();

        let first = CachedResolver::new(Counting::new(), cfg.clone());
        let table = first.resolve(&request(&grid, 4, true, &extra)).unwrap();
        assert_eq!(first.inner().calls(), 1);

        let second = CachedResolver::new(Counting::new(), cfg);
        let reloaded = second.resolve(&request(&grid, 4, true, &extra)).unwrap();
        assert_eq!(second.inner().calls(), 0);
        assert_eq!(reloaded, table);
        assert_eq!(second.stats().hits, 1);
    }

    #[test]
    fn test_corrupt_disk_entry_falls_back_to_resolver() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CacheConfig {
            directory: Some(dir.path().to_path_buf()),
            ..CacheConfig::default()
        };
        let grid = SampleGrid::from_pairs(&[(30.0, 40.0)]).unwrap();
        let extra = BTreeMap::new();
        let cached = CachedResolver::new(Counting::new(), cfg);
        let key = cached.key(&request(&grid, 4, true, &extra)).unwrap();
        std::fs::write(CachedResolver::<Counting>::file_for(dir.path(), &key), "not json").unwrap();

        cached.resolve(&request(&grid, 4, true, &extra)).unwrap();
        assert_eq!(cached.inner().calls(), 1);
    }

    fn entry_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| is_entry_file(p))
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_file_names_use_a_fixed_hash() {
        assert_eq!(fnv1a_64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(fnv1a_64(b"foobar"), 0x8594_4171_f739_67e8);
        assert_eq!(
            CachedResolver::<Counting>::file_for(Path::new("cache"), "a"),
            Path::new("cache").join("af63dc4c8601ec8c.json")
        );
        assert!(is_entry_file(Path::new("cache/af63dc4c8601ec8c.json")));
        assert!(!is_entry_file(Path::new("cache/notes.json")));
        assert!(!is_entry_file(Path::new("cache/af63dc4c8601ec8c.txt")));
    }

    #[test]
    fn test_disk_entries_are_bounded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.json"), "{}").unwrap();
        let cfg = CacheConfig {
            directory: Some(dir.path().to_path_buf()),
            max_entries: 2,
            eviction: EvictionPolicy::Fifo,
        };
        let grid = SampleGrid::from_pairs(&[(0.0, 0.0)]).unwrap();
        let extra = BTreeMap::new();
        let cached = CachedResolver::new(Counting::new(), cfg);
        for kp in 1..=4 {
            cached.resolve(&request(&grid, kp, true, &extra)).unwrap();
        }

        assert_eq!(entry_files(dir.path()).len(), 2);
        let newest = cached.key(&request(&grid, 4, true, &extra)).unwrap();
        assert!(CachedResolver::<Counting>::file_for(dir.path(), &newest).exists());
        assert!(dir.path().join("notes.json").exists());
    }

    #[test]
    fn test_never_policy_keeps_every_disk_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CacheConfig {
            directory: Some(dir.path().to_path_buf()),
            max_entries: 1,
            eviction: EvictionPolicy::Never,
        };
        let grid = SampleGrid::from_pairs(&[(0.0, 0.0)]).unwrap();
        let extra = BTreeMap::new();
        let cached = CachedResolver::new(Counting::new(), cfg);
        for kp in 1..=3 {
            cached.resolve(&request(&grid, kp, true, &extra)).unwrap();
        }
        assert_eq!(entry_files(dir.path()).len(), 3);
    }

    #[test]
    fn test_eviction_policy_names() {
        let cfg: CacheConfig = serde_json::from_str(r#"{"eviction": "fifo"}"#).unwrap();
        assert_eq!(cfg.eviction, EvictionPolicy::Fifo);
        assert_eq!(cfg.max_entries, 64);
        let lru: EvictionPolicy = serde_json::from_str(r#""lru""#).unwrap();
        assert_eq!(lru, EvictionPolicy::LeastRecentlyUsed);
    }
}
