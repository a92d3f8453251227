//! Single-flight locks: one in-flight fetch per cache key.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slots<K> = HashMap<K, Arc<AsyncMutex<()>>>;

/// A map of per-key async locks that removes idle keys.
#[derive(Debug)]
pub(crate) struct KeyLocks<K> {
    slots: Mutex<Slots<K>>,
}

impl<K> KeyLocks<K>
where
    K: Hash + Eq + Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive use of `key`.
    pub(crate) async fn lock(&self, key: &K) -> FlightGuard<'_, K> {
        let slot = self
            .slots()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let guard = slot.lock_owned().await;
        FlightGuard {
            locks: self,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.slots().len()
    }

    fn slots(&self) -> MutexGuard<'_, Slots<K>> {
        // The map only holds lock handles; a panic cannot leave it half-updated.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Held while a fetch for one key is in progress.
pub(crate) struct FlightGuard<'a, K>
where
    K: Hash + Eq + Clone,
{
    locks: &'a KeyLocks<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K> Drop for FlightGuard<'_, K>
where
    K: Hash + Eq + Clone,
{
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut slots = self.locks.slots();
        // Only the map's own handle left means nobody is waiting.
        if slots
            .get(&self.key)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.key);
        }
    }
}
