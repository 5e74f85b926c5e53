//! Thread-safe LRU/TTL cache of simulation results
//!
//! Entries are keyed by fingerprint. A hit refreshes the entry's timestamp,
//! so TTL measures time since last use and eviction removes the least
//! recently touched entry.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::CacheConfig;

/// Fraction of `max_size` above which `set` first sweeps expired entries
pub const CLEANUP_THRESHOLD: f64 = 0.8;

/// Seconds since the Unix epoch
pub(crate) fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[derive(Debug, Clone)]
pub(crate) struct CacheEntry<V> {
    pub value: V,
    /// Last touched, seconds since the epoch
    pub timestamp: f64,
    /// Per-entry TTL override in seconds
    pub ttl: Option<f64>,
    /// Tie-break for entries touched within the same clock tick
    pub sequence: u64,
}

/// Snapshot of cache counters and sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    /// Default TTL in seconds
    pub ttl: f64,
    /// Approximate serialized size of keys and values, in bytes
    pub memory_estimate: usize,
    pub last_save_time: Option<f64>,
    #[serde(default)]
    pub dirty: bool,
}

pub(crate) struct CacheState<V> {
    pub entries: HashMap<String, CacheEntry<V>>,
    pub max_size: usize,
    pub ttl: f64,
    pub cache_file: PathBuf,
    pub hits: u64,
    pub misses: u64,
    pub dirty: bool,
    pub last_save_time: Option<f64>,
    sequence: u64,
    writes: u64,
}

impl<V> CacheState<V> {
    pub fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    /// Number of mutations so far; lookups never change it
    pub fn write_count(&self) -> u64 {
        self.writes
    }

    /// Flag unsaved changes; bumps the write count so an in-flight save can
    /// tell it raced with a write
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.writes += 1;
    }

    fn is_expired(&self, entry: &CacheEntry<V>, now: f64) -> bool {
        now - entry.timestamp > entry.ttl.unwrap_or(self.ttl)
    }

    pub fn cleanup_expired(&mut self, now: f64) -> usize {
        let default_ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now - entry.timestamp <= entry.ttl.unwrap_or(default_ttl));
        before - self.entries.len()
    }

    /// Remove the least recently touched entry
    fn evict_oldest(&mut self) -> bool {
        let oldest = self
            .entries
            .iter()
            .min_by(|(_, a), (_, b)| {
                a.timestamp
                    .total_cmp(&b.timestamp)
                    .then(a.sequence.cmp(&b.sequence))
            })
            .map(|(key, _)| key.clone());

        match oldest {
            Some(key) => {
                self.entries.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Evict until there is room for one more entry
    pub fn make_room(&mut self) {
        while self.entries.len() >= self.max_size {
            if !self.evict_oldest() {
                break;
            }
        }
    }

    pub fn enforce_capacity(&mut self) {
        while self.entries.len() > self.max_size {
            if !self.evict_oldest() {
                break;
            }
        }
    }

    /// Insert or replace, evicting first if a new key would overflow
    pub fn insert_entry(&mut self, key: String, mut entry: CacheEntry<V>) {
        if !self.entries.contains_key(&key) {
            self.make_room();
        }
        entry.sequence = self.next_sequence();
        self.entries.insert(key, entry);
    }
}

/// LRU + TTL cache with atomic disk persistence
///
/// All map access goes through `state`; physical file I/O is serialized by
/// `io_lock` so a slow write never holds up lookups.
pub struct SimulationCache<V> {
    pub(crate) state: Mutex<CacheState<V>>,
    pub(crate) io_lock: Mutex<()>,
}

impl<V> SimulationCache<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self::with_config(&CacheConfig {
            max_size,
            ttl,
            ..CacheConfig::default()
        })
    }

    pub fn with_config(config: &CacheConfig) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                max_size: config.max_size.max(1),
                ttl: config.ttl.as_secs_f64(),
                cache_file: config.cache_path(),
                hits: 0,
                misses: 0,
                dirty: false,
                last_save_time: None,
                sequence: 0,
                writes: 0,
            }),
            io_lock: Mutex::new(()),
        }
    }

    /// Lock the entry map, recovering from a poisoned lock
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, CacheState<V>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up a live entry, refreshing its timestamp on a hit
    pub fn get(&self, key: &str) -> Option<V> {
        let mut state = self.lock_state();
        let now = now_secs();
        let sequence = state.next_sequence();

        let expired = match state.entries.get(key) {
            Some(entry) => state.is_expired(entry, now),
            None => {
                state.misses += 1;
                return None;
            }
        };

        if expired {
            state.entries.remove(key);
            state.misses += 1;
            return None;
        }

        state.hits += 1;
        let entry = state.entries.get_mut(key)?;
        entry.timestamp = now;
        entry.sequence = sequence;
        Some(entry.value.clone())
    }

    /// Presence check without touching timestamps or counters
    pub fn contains_key(&self, key: &str) -> bool {
        let state = self.lock_state();
        let now = now_secs();
        state
            .entries
            .get(key)
            .map(|entry| !state.is_expired(entry, now))
            .unwrap_or(false)
    }

    /// Insert or overwrite, evicting the least recently used entry when full
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let mut state = self.lock_state();
        let now = now_secs();

        if state.entries.len() as f64 > CLEANUP_THRESHOLD * state.max_size as f64 {
            state.cleanup_expired(now);
        }

        state.insert_entry(
            key.into(),
            CacheEntry {
                value,
                timestamp: now,
                ttl: ttl.map(|d| d.as_secs_f64()),
                sequence: 0,
            },
        );
        state.mark_dirty();
    }

    /// Remove every entry, or those whose key contains `pattern`
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        let mut state = self.lock_state();
        let before = state.entries.len();
        match pattern {
            Some(pattern) => state.entries.retain(|key, _| !key.contains(pattern)),
            None => state.entries.clear(),
        }
        let removed = before - state.entries.len();
        if removed > 0 {
            state.mark_dirty();
        }
        removed
    }

    /// Remove every entry past its TTL
    pub fn cleanup_expired(&self) -> usize {
        self.lock_state().cleanup_expired(now_secs())
    }

    /// Copy entries from `other`, keeping the newer one on key collision
    pub fn merge(&self, other: &SimulationCache<V>) -> usize {
        if std::ptr::eq(self, other) {
            return 0;
        }

        let incoming: Vec<(String, CacheEntry<V>)> = {
            let other_state = other.lock_state();
            other_state
                .entries
                .iter()
                .map(|(key, entry)| (key.clone(), entry.clone()))
                .collect()
        };

        let mut state = self.lock_state();
        let mut merged = 0;
        for (key, entry) in incoming {
            let newer = match state.entries.get(&key) {
                Some(existing) => entry.timestamp > existing.timestamp,
                None => true,
            };
            if newer {
                state.insert_entry(key, entry);
                merged += 1;
            }
        }
        if merged > 0 {
            state.mark_dirty();
        }
        merged
    }

    pub fn len(&self) -> usize {
        self.lock_state().entries.len()
    }

    /// Keys currently held, including entries not yet swept for expiry
    pub fn keys(&self) -> Vec<String> {
        self.lock_state().entries.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_dirty(&self) -> bool {
        self.lock_state().dirty
    }

    pub fn get_stats(&self) -> CacheStats {
        let state = self.lock_state();
        let total = state.hits + state.misses;
        let memory_estimate = state
            .entries
            .iter()
            .map(|(key, entry)| {
                key.len()
                    + serde_json::to_vec(&entry.value).map(|v| v.len()).unwrap_or(0)
                    + std::mem::size_of::<f64>() * 2
            })
            .sum();

        CacheStats {
            size: state.entries.len(),
            max_size: state.max_size,
            hits: state.hits,
            misses: state.misses,
            hit_rate: if total == 0 { 0.0 } else { state.hits as f64 / total as f64 },
            ttl: state.ttl,
            memory_estimate,
            last_save_time: state.last_save_time,
            dirty: state.dirty,
        }
    }

    /// Change capacity; shrinking evicts least recently used entries
    pub fn set_max_size(&self, max_size: usize) {
        let mut state = self.lock_state();
        state.max_size = max_size.max(1);
        let before = state.entries.len();
        state.enforce_capacity();
        if state.entries.len() != before {
            state.mark_dirty();
        }
    }

    pub fn set_ttl(&self, ttl: Duration) {
        self.lock_state().ttl = ttl.as_secs_f64();
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs_f64(self.lock_state().ttl)
    }

    pub fn set_cache_file(&self, path: impl AsRef<Path>) {
        self.lock_state().cache_file = path.as_ref().to_path_buf();
    }

    pub fn cache_file(&self) -> PathBuf {
        self.lock_state().cache_file.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn cache(max_size: usize) -> SimulationCache<String> {
        SimulationCache::new(max_size, Duration::from_secs(3600))
    }

    #[test]
    fn test_miss_then_hit() {
        let cache = cache(10);
        assert_eq!(cache.get("goal:1:abc"), None);

        cache.set("goal:1:abc", "result".to_string(), None);
        assert_eq!(cache.get("goal:1:abc"), Some("result".to_string()));
        assert_eq!(cache.get("goal:1:abc"), Some("result".to_string()));

        let stats = cache.get_stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!(stats.dirty);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = cache(10);
        cache.set("short", "v".to_string(), Some(Duration::from_secs(1)));
        cache.set("long", "v".to_string(), None);

        thread::sleep(Duration::from_millis(1100));

        assert_eq!(cache.get("short"), None);
        assert_eq!(cache.get_stats().size, 1);
        assert_eq!(cache.get_stats().misses, 1);
        assert!(cache.get("long").is_some());
    }

    #[test]
    fn test_cleanup_expired() {
        let cache = cache(10);
        cache.set("a", "v".to_string(), Some(Duration::from_millis(10)));
        cache.set("b", "v".to_string(), Some(Duration::from_millis(10)));
        cache.set("c", "v".to_string(), None);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(cache.cleanup_expired(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lru_bound_keeps_most_recent() {
        let max_size = 5;
        let cache = cache(max_size);
        for i in 0..max_size + 3 {
            cache.set(format!("key{}", i), format!("value{}", i), None);
        }

        assert_eq!(cache.len(), max_size);
        for i in 0..3 {
            assert!(!cache.contains_key(&format!("key{}", i)));
        }
        for i in 3..max_size + 3 {
            assert!(cache.contains_key(&format!("key{}", i)));
        }
    }

    #[test]
    fn test_touch_protects_from_eviction() {
        let cache = cache(3);
        cache.set("a", "1".to_string(), None);
        cache.set("b", "2".to_string(), None);
        cache.set("c", "3".to_string(), None);

        // "a" becomes most recent, so "b" is the LRU victim
        assert!(cache.get("a").is_some());
        cache.set("d", "4".to_string(), None);

        assert!(cache.contains_key("a"));
        assert!(!cache.contains_key("b"));
        assert!(cache.contains_key("c"));
        assert!(cache.contains_key("d"));
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = cache(2);
        cache.set("a", "1".to_string(), None);
        cache.set("b", "2".to_string(), None);
        cache.set("a", "updated".to_string(), None);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some("updated".to_string()));
    }

    #[test]
    fn test_zero_capacity_still_stores_one() {
        let cache = cache(0);
        cache.set("a", "1".to_string(), None);
        cache.set("b", "2".to_string(), None);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key("b"));
    }

    #[test]
    fn test_invalidate_by_pattern() {
        let cache = cache(10);
        cache.set("goal:123:aaa", "x".to_string(), None);
        cache.set("goal:123:bbb", "x".to_string(), None);
        cache.set("goal:1234:ccc", "x".to_string(), None);
        cache.set("goal:456:ddd", "x".to_string(), None);
        cache.set("goal:789:eee", "x".to_string(), None);

        let removed = cache.invalidate(Some("goal:123:"));
        assert_eq!(removed, 2);
        assert_eq!(cache.len(), 3);
        assert!(cache.contains_key("goal:1234:ccc"));

        assert_eq!(cache.invalidate(Some("nothing")), 0);
        assert_eq!(cache.invalidate(None), 3);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_max_size_shrinks() {
        let cache = cache(10);
        for i in 0..6 {
            cache.set(format!("k{}", i), "v".to_string(), None);
        }
        cache.set_max_size(2);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains_key("k4"));
        assert!(cache.contains_key("k5"));
    }

    #[test]
    fn test_merge_keeps_newer() {
        let local = cache(10);
        let remote = cache(10);

        local.set("shared", "old".to_string(), None);
        local.set("local_only", "l".to_string(), None);
        thread::sleep(Duration::from_millis(5));
        remote.set("shared", "new".to_string(), None);
        remote.set("remote_only", "r".to_string(), None);

        assert_eq!(local.merge(&remote), 2);
        assert_eq!(local.len(), 3);
        assert_eq!(local.get("shared"), Some("new".to_string()));

        // remote_only carries the same timestamp on both sides, so it is skipped
        assert_eq!(remote.merge(&local), 2);
        assert_eq!(remote.get("shared"), Some("new".to_string()));
        assert_eq!(remote.len(), 3);
        assert_eq!(local.merge(&local), 0);
    }

    #[test]
    fn test_lookups_do_not_count_as_writes() {
        let cache = cache(10);
        cache.set("goal:1", "a".to_string(), None);
        let writes = cache.lock_state().write_count();

        assert!(cache.get("goal:1").is_some());
        assert!(cache.get("goal:missing").is_none());
        assert!(cache.contains_key("goal:1"));
        assert_eq!(cache.lock_state().write_count(), writes);

        cache.set("goal:2", "b".to_string(), None);
        assert_eq!(cache.lock_state().write_count(), writes + 1);
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(cache(50));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..100 {
                        let key = format!("t{}-{}", t, i % 20);
                        cache.set(key.clone(), format!("{}", i), None);
                        cache.get(&key);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.len() <= 50);
        assert_eq!(cache.get_stats().hits + cache.get_stats().misses, 400);
    }
}
