//! Thread-safe handle around [`TtlCache`].

use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::cache::TtlCache;
use crate::error::CacheError;

/// A cloneable, internally synchronized [`TtlCache`].
///
/// All clones share the same entries. Reads return owned clones so the lock is
/// held only for the duration of a single operation.
#[derive(Debug)]
pub struct SharedCache<K, V> {
    inner: Arc<Mutex<TtlCache<K, V>>>,
}

impl<K, V> Clone for SharedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> SharedCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Wrap an existing cache.
    pub fn new(cache: TtlCache<K, V>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(cache)),
        }
    }

    /// Get a clone of a live value.
    pub fn get(&self, key: &K) -> Result<Option<V>, CacheError> {
        Ok(self.lock()?.get(key).cloned())
    }

    /// Insert a value with the default TTL.
    pub fn insert(&self, key: K, value: V) -> Result<(), CacheError> {
        self.lock()?.insert(key, value);
        Ok(())
    }

    /// Insert a value with an explicit TTL. Zero means "do not cache".
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) -> Result<(), CacheError> {
        self.lock()?.insert_with_ttl(key, value, ttl);
        Ok(())
    }

    /// Remove an entry.
    pub fn remove(&self, key: &K) -> Result<Option<V>, CacheError> {
        Ok(self.lock()?.remove(key))
    }

    /// Sweep expired entries.
    pub fn cleanup(&self) -> Result<(), CacheError> {
        self.lock()?.cleanup();
        Ok(())
    }

    /// Drop every entry.
    pub fn clear(&self) -> Result<(), CacheError> {
        self.lock()?.clear();
        Ok(())
    }

    /// Number of non-expired entries.
    pub fn active_count(&self) -> Result<usize, CacheError> {
        Ok(self.lock()?.active_count())
    }

    /// The default TTL.
    pub fn ttl(&self) -> Result<Duration, CacheError> {
        Ok(self.lock()?.ttl())
    }

    fn lock(&self) -> Result<MutexGuard<'_, TtlCache<K, V>>, CacheError> {
        self.inner.lock().map_err(|_| CacheError::Poisoned)
    }
}
