//! Simulation result caching
//!
//! - `SimulationCache`: LRU/TTL store with JSON persistence
//! - `SaveScheduler`: background saver for dirty caches
//! - `Fingerprint`: deterministic cache keys
//! - `CacheService`: cache + saver lifecycle

mod fingerprint;
mod persistence;
mod scheduler;
mod store;

pub use fingerprint::Fingerprint;
pub use persistence::{CacheEnvelope, CacheMetadata, CACHE_FORMAT_VERSION};
pub use scheduler::SaveScheduler;
pub use store::{CacheStats, SimulationCache, CLEANUP_THRESHOLD};

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Shortest interval the background saver accepts
pub const MIN_SAVE_INTERVAL: Duration = Duration::from_secs(1);

/// Cache sizing, expiry and file location
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub max_size: usize,
    pub ttl: Duration,
    pub save_interval: Duration,
    pub cache_dir: PathBuf,
    pub cache_file: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            ttl: Duration::from_secs(3600),
            save_interval: Duration::from_secs(300),
            cache_dir: PathBuf::from("data/cache"),
            cache_file: "simulation_cache.json".to_string(),
        }
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a number", name, raw);
            None
        }
    }
}

impl CacheConfig {
    /// Defaults overridden by `GOAL_CACHE_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(max_size) = env_number::<usize>("GOAL_CACHE_MAX_SIZE") {
            config.max_size = max_size;
        }
        if let Some(ttl) = env_number::<u64>("GOAL_CACHE_TTL") {
            config.ttl = Duration::from_secs(ttl);
        }
        if let Some(interval) = env_number::<u64>("GOAL_CACHE_SAVE_INTERVAL") {
            config.save_interval = Duration::from_secs(interval).max(MIN_SAVE_INTERVAL);
        }
        if let Ok(dir) = std::env::var("GOAL_CACHE_DIR") {
            if !dir.trim().is_empty() {
                config.cache_dir = PathBuf::from(dir);
            }
        }
        config
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_dir.join(&self.cache_file)
    }
}

/// A shared cache with its background saver
///
/// Loads any existing cache file on start; `shutdown` (or drop) stops the
/// saver and flushes pending changes.
pub struct CacheService<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    config: CacheConfig,
    cache: Arc<SimulationCache<V>>,
    scheduler: SaveScheduler<V>,
}

impl<V> CacheService<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn start(mut config: CacheConfig) -> Self {
        config.save_interval = config.save_interval.max(MIN_SAVE_INTERVAL);
        let cache = Arc::new(SimulationCache::with_config(&config));
        if cache.load_from_configured() {
            debug!("Cache warmed with {} entries", cache.len());
        }
        let scheduler = SaveScheduler::start(Arc::clone(&cache), config.save_interval);
        Self {
            config,
            cache,
            scheduler,
        }
    }

    pub fn cache(&self) -> &Arc<SimulationCache<V>> {
        &self.cache
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Change how often dirty entries are written; clamped to `MIN_SAVE_INTERVAL`
    pub fn set_save_interval(&mut self, interval: Duration) {
        let interval = interval.max(MIN_SAVE_INTERVAL);
        self.config.save_interval = interval;
        self.scheduler.reschedule(interval);
    }

    pub fn save_interval(&self) -> Duration {
        self.scheduler.interval()
    }

    pub fn set_max_size(&mut self, max_size: usize) {
        self.config.max_size = max_size;
        self.cache.set_max_size(max_size);
    }

    pub fn set_ttl(&mut self, ttl: Duration) {
        self.config.ttl = ttl;
        self.cache.set_ttl(ttl);
    }

    pub fn shutdown(&mut self) {
        self.scheduler.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.max_size, 100);
        assert_eq!(config.ttl, Duration::from_secs(3600));
        assert_eq!(config.save_interval, Duration::from_secs(300));
        assert_eq!(config.cache_path(), PathBuf::from("data/cache/simulation_cache.json"));
    }

    #[test]
    fn test_service_persists_across_restarts() {
        let dir = std::env::temp_dir().join(format!("goal_service_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let config = CacheConfig {
            cache_dir: dir.clone(),
            ..CacheConfig::default()
        };

        let mut service: CacheService<f64> = CacheService::start(config.clone());
        service.cache().set("goal:1:ff", 0.75, None);
        service.set_max_size(50);
        service.shutdown();

        let restarted: CacheService<f64> = CacheService::start(config);
        assert_eq!(restarted.cache().get("goal:1:ff"), Some(0.75));
        drop(restarted);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_save_interval_has_a_floor() {
        let dir = std::env::temp_dir().join(format!("goal_service_interval_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let config = CacheConfig {
            cache_dir: dir.clone(),
            save_interval: Duration::ZERO,
            ..CacheConfig::default()
        };

        let mut service: CacheService<f64> = CacheService::start(config);
        assert_eq!(service.save_interval(), MIN_SAVE_INTERVAL);

        service.set_save_interval(Duration::ZERO);
        assert_eq!(service.save_interval(), MIN_SAVE_INTERVAL);
        assert_eq!(service.config().save_interval, MIN_SAVE_INTERVAL);

        service.set_save_interval(Duration::from_secs(30));
        assert_eq!(service.save_interval(), Duration::from_secs(30));
        service.shutdown();

        let _ = fs::remove_dir_all(&dir);
    }
}
