//! JSON persistence for the simulation cache
//!
//! Files are written to a sibling `.tmp` file and renamed over the target,
//! so a reader never sees a half-written cache.

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::store::{now_secs, CacheEntry, CacheStats, SimulationCache};
use crate::error::CacheError;

pub const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub timestamp: f64,
    pub version: u32,
    pub cache_stats: CacheStats,
}

/// On-disk layout: entries map to `[value, timestamp]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEnvelope<V> {
    pub metadata: CacheMetadata,
    pub cache: BTreeMap<String, (V, f64)>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PersistedCache<V> {
    Enveloped(CacheEnvelope<V>),
    /// Bare map written before metadata was added
    Legacy(BTreeMap<String, (V, f64)>),
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = temp_path(path);
    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn read_entries<V: DeserializeOwned>(path: &Path) -> Result<BTreeMap<String, (V, f64)>, CacheError> {
    let contents = fs::read_to_string(path)?;
    let parsed: PersistedCache<V> = serde_json::from_str(&contents)?;
    Ok(match parsed {
        PersistedCache::Enveloped(envelope) => {
            debug!(
                "Cache file {} has format version {}",
                path.display(),
                envelope.metadata.version
            );
            envelope.cache
        }
        PersistedCache::Legacy(map) => {
            debug!("Cache file {} uses the legacy layout", path.display());
            map
        }
    })
}

impl<V> SimulationCache<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    /// Write live entries to `path`; returns false on failure
    pub fn save(&self, path: impl AsRef<Path>) -> bool {
        match self.try_save(path.as_ref()) {
            Ok(count) => {
                info!("Saved {} cache entries to {}", count, path.as_ref().display());
                true
            }
            Err(e) => {
                warn!("Failed to save cache to {}: {}", path.as_ref().display(), e);
                false
            }
        }
    }

    fn try_save(&self, path: &Path) -> Result<usize, CacheError> {
        self.cleanup_expired();
        let stats = self.get_stats();

        let (cache, writes) = {
            let state = self.lock_state();
            let cache: BTreeMap<String, (V, f64)> = state
                .entries
                .iter()
                .map(|(key, entry)| (key.clone(), (entry.value.clone(), entry.timestamp)))
                .collect();
            (cache, state.write_count())
        };

        let now = now_secs();
        let envelope = CacheEnvelope {
            metadata: CacheMetadata {
                timestamp: now,
                version: CACHE_FORMAT_VERSION,
                cache_stats: stats,
            },
            cache,
        };
        let bytes = serde_json::to_vec(&envelope)?;

        let _io = self.io_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        write_atomic(path, &bytes)?;

        let mut state = self.lock_state();
        state.last_save_time = Some(now);
        // A write that landed after the snapshot keeps the cache dirty
        if state.write_count() == writes {
            state.dirty = false;
        }
        Ok(envelope.cache.len())
    }

    /// Merge entries from `path` into memory; returns false if nothing usable
    /// was read
    pub fn load(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No cache file at {}", path.display());
            return false;
        }

        let loaded = {
            let _io = self.io_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            read_entries::<V>(path)
        };

        let entries = match loaded {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Ignoring unreadable cache file {}: {}", path.display(), e);
                return false;
            }
        };

        let total = entries.len();
        let now = now_secs();
        let mut state = self.lock_state();
        let ttl = state.ttl;

        let mut fresh: Vec<(String, V, f64)> = entries
            .into_iter()
            .filter(|(_, (_, timestamp))| now - timestamp <= ttl)
            .map(|(key, (value, timestamp))| (key, value, timestamp))
            .collect();
        fresh.sort_by(|a, b| a.2.total_cmp(&b.2));

        let mut taken = 0;
        for (key, value, timestamp) in fresh {
            let newer = state
                .entries
                .get(&key)
                .map(|existing| timestamp > existing.timestamp)
                .unwrap_or(true);
            if newer {
                let sequence = state.next_sequence();
                state.entries.insert(
                    key,
                    CacheEntry {
                        value,
                        timestamp,
                        ttl: None,
                        sequence,
                    },
                );
                taken += 1;
            }
        }
        state.enforce_capacity();

        info!(
            "Loaded {} of {} cache entries from {}",
            taken,
            total,
            path.display()
        );
        true
    }

    pub fn save_to_configured(&self) -> bool {
        let path = self.cache_file();
        self.save(path)
    }

    pub fn load_from_configured(&self) -> bool {
        let path = self.cache_file();
        self.load(path)
    }
}
