//! Named result caches shared by the executors.

use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kman_core::config::ExecutorConfig;
use kman_core::ManagerError;
use lru::LruCache;
use tokio::time::Instant;
use tracing::{debug, info};

/// Key-value cache with per-entry atomic replacement.
pub trait Cache<K, V>: Send + Sync {
    fn name(&self) -> &str;

    fn get(&self, key: &K) -> Option<V>;

    fn put(&self, key: K, value: V);

    /// Returns whether an entry was removed.
    fn remove(&self, key: &K) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&self);
}

struct Entry<V> {
    value: V,
    deadline: Instant,
}

/// Size-bounded LRU cache whose entries expire `ttl` after they were last
/// written or read.
pub struct LruTtlCache<K: Hash + Eq, V> {
    name: String,
    ttl: Duration,
    entries: Mutex<LruCache<K, Entry<V>>>,
}

impl<K: Hash + Eq + Clone, V: Clone> LruTtlCache<K, V> {
    pub fn new(name: impl Into<String>, capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name: name.into(),
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn purge_expired(entries: &mut LruCache<K, Entry<V>>, now: Instant) {
        let expired: Vec<K> = entries
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            entries.pop(&key);
        }
    }
}

impl<K, V> Cache<K, V> for LruTtlCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(key) {
            Some(entry) if entry.deadline > now => {
                entry.deadline = now + self.ttl;
                return Some(entry.value.clone());
            }
            Some(_) => {}
            None => return None,
        }
        entries.pop(key);
        None
    }

    fn put(&self, key: K, value: V) {
        let deadline = Instant::now() + self.ttl;
        self.entries.lock().unwrap().put(key, Entry { value, deadline });
    }

    fn remove(&self, key: &K) -> bool {
        self.entries.lock().unwrap().pop(key).is_some()
    }

    fn len(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        Self::purge_expired(&mut entries, Instant::now());
        entries.len()
    }

    fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

// ── Cache manager ─────────────────────────────────────────────

/// Type-erased view the manager keeps of every cache it created.
trait ManagedCache: Send + Sync {
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    fn clear_all(&self);
}

impl<K, V> ManagedCache for LruTtlCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn clear_all(&self) {
        self.clear();
    }
}

/// Factory of named caches. Asking twice for the same name returns the same
/// cache, so independent components can share results by name.
pub struct CacheManager {
    capacity: usize,
    ttl: Duration,
    caches: Mutex<HashMap<String, Arc<dyn ManagedCache>>>,
}

impl CacheManager {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            caches: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(config.cache_capacity, config.result_ttl())
    }

    /// Get or create the cache called `name`.
    pub fn cache<K, V>(&self, name: &str) -> Result<Arc<dyn Cache<K, V>>, ManagerError>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let mut caches = self.caches.lock().unwrap();
        if let Some(existing) = caches.get(name) {
            let typed = existing
                .clone()
                .as_any()
                .downcast::<LruTtlCache<K, V>>()
                .map_err(|_| {
                    ManagerError::invalid_argument(format!(
                        "Cache '{}' already exists with different key or value types",
                        name
                    ))
                })?;
            return Ok(typed);
        }

        debug!(cache = %name, capacity = self.capacity, ttl_secs = self.ttl.as_secs(), "Creating cache");
        let cache = Arc::new(LruTtlCache::<K, V>::new(name, self.capacity, self.ttl));
        caches.insert(name.to_string(), cache.clone());
        Ok(cache)
    }

    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Forget a cache and drop its entries. Holders of the old handle see it
    /// empty; the next `cache()` call creates a fresh one.
    pub fn destroy_cache(&self, name: &str) -> bool {
        let removed = self.caches.lock().unwrap().remove(name);
        match removed {
            Some(cache) => {
                cache.clear_all();
                info!(cache = %name, "Cache destroyed");
                true
            }
            None => false,
        }
    }
}
