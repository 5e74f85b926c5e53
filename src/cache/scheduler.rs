//! Background saver for dirty caches
//!
//! One thread owns one pending timer. Rescheduling replaces the timer;
//! shutdown stops the thread and flushes synchronously.

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::store::SimulationCache;

enum Command {
    Reschedule(Duration),
    Shutdown,
}

/// Periodically persists a cache to its configured file while dirty
pub struct SaveScheduler<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    cache: Arc<SimulationCache<V>>,
    interval: Duration,
    sender: Option<Sender<Command>>,
    handle: Option<JoinHandle<()>>,
}

impl<V> SaveScheduler<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn start(cache: Arc<SimulationCache<V>>, interval: Duration) -> Self {
        let (sender, receiver) = mpsc::channel::<Command>();
        let worker_cache = Arc::clone(&cache);

        let spawned = thread::Builder::new()
            .name("goal-cache-saver".to_string())
            .spawn(move || {
                let mut interval = interval;
                loop {
                    match receiver.recv_timeout(interval) {
                        Ok(Command::Reschedule(next)) => {
                            debug!("Cache save rescheduled every {:?}", next);
                            interval = next;
                        }
                        Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {
                            if worker_cache.is_dirty() {
                                worker_cache.save_to_configured();
                            }
                        }
                    }
                }
            });

        let (sender, handle) = match spawned {
            Ok(handle) => (Some(sender), Some(handle)),
            Err(e) => {
                warn!("Could not start cache saver thread, saving only on shutdown: {}", e);
                (None, None)
            }
        };

        Self {
            cache,
            interval,
            sender,
            handle,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Replace the pending timer with a new interval
    pub fn reschedule(&mut self, interval: Duration) {
        self.interval = interval;
        if let Some(sender) = &self.sender {
            let _ = sender.send(Command::Reschedule(interval));
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop the timer thread and flush if there are unsaved changes
    pub fn shutdown(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Command::Shutdown);
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Cache saver thread panicked");
            }
        }
        if self.cache.is_dirty() {
            self.cache.save_to_configured();
        }
    }
}

impl<V> Drop for SaveScheduler<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn cache_at(name: &str) -> (Arc<SimulationCache<String>>, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("goal_saver_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let cache = Arc::new(SimulationCache::new(10, Duration::from_secs(3600)));
        let path = dir.join("cache.json");
        cache.set_cache_file(&path);
        (cache, dir)
    }

    #[test]
    fn test_scheduled_save_after_invalidation() {
        let (cache, dir) = cache_at("invalidate");
        for (i, goal) in ["123", "123", "456", "789", "999"].iter().enumerate() {
            cache.set(format!("goal:{}:{:x}", goal, i), format!("result{}", i), None);
        }
        assert!(cache.save_to_configured());
        assert!(!cache.is_dirty());

        let removed = cache.invalidate(Some("goal:123"));
        assert_eq!(removed, 2);
        assert!(cache.is_dirty());

        let mut scheduler = SaveScheduler::start(Arc::clone(&cache), Duration::from_millis(50));
        thread::sleep(Duration::from_millis(400));
        assert!(!cache.is_dirty());

        let reloaded: SimulationCache<String> = SimulationCache::new(10, Duration::from_secs(3600));
        assert!(reloaded.load(cache.cache_file()));
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded.invalidate(Some("goal:123")), 0);

        scheduler.shutdown();
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_clean_cache_is_not_written() {
        let (cache, dir) = cache_at("clean");
        let mut scheduler = SaveScheduler::start(Arc::clone(&cache), Duration::from_millis(20));
        thread::sleep(Duration::from_millis(100));
        scheduler.shutdown();
        assert!(!cache.cache_file().exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_shutdown_flushes_pending_changes() {
        let (cache, dir) = cache_at("flush");
        let mut scheduler = SaveScheduler::start(Arc::clone(&cache), Duration::from_secs(3600));
        cache.set("goal:1:ab", "value".to_string(), None);

        scheduler.shutdown();
        assert!(!scheduler.is_running());
        assert!(cache.cache_file().exists());
        assert!(!cache.is_dirty());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_reschedule_replaces_timer() {
        let (cache, dir) = cache_at("reschedule");
        let mut scheduler = SaveScheduler::start(Arc::clone(&cache), Duration::from_secs(3600));
        cache.set("goal:2:cd", "value".to_string(), None);

        scheduler.reschedule(Duration::from_millis(30));
        assert_eq!(scheduler.interval(), Duration::from_millis(30));
        thread::sleep(Duration::from_millis(300));
        assert!(!cache.is_dirty());

        drop(scheduler);
        let _ = fs::remove_dir_all(&dir);
    }
}
