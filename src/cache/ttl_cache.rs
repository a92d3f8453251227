//! Time-to-live cache with an optional capacity bound.
//!
//! Each entry carries its own TTL. Expired entries are never returned and are
//! dropped when they are next touched, by [`TtlCache::cleanup`], or by the
//! sweep an insert runs once per [`TtlCache::sweep_interval`].
//!
//! When a capacity bound is set and an insert pushes the cache over it,
//! entries are evicted in a fixed order until the cache fits again:
//!
//! 1. already-expired entries, oldest insertion first;
//! 2. live entries, least recently used first (ties broken by insertion order).
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use edgar_http::cache::TtlCache;
//!
//! let mut cache: TtlCache<String, i64> = TtlCache::new(Duration::from_secs(300));
//!
//! cache.insert("CIK0000320193".to_string(), 320193);
//! assert_eq!(cache.get(&"CIK0000320193".to_string()), Some(&320193));
//!
//! // A zero TTL means "do not cache"
//! cache.insert_with_ttl("CIK0000789019".to_string(), 789019, Duration::ZERO);
//! assert!(cache.get(&"CIK0000789019".to_string()).is_none());
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};

/// How often inserts sweep out expired entries.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Entry<V> {
    value: V,
    /// `None` when the TTL reaches past the representable range
    expires_at: Option<Instant>,
    /// Insertion order
    seq: u64,
    /// Recency tick of the last read or write
    last_access: u64,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|expires_at| now < expires_at)
    }

    fn remaining(&self, now: Instant) -> Duration {
        self.expires_at
            .map_or(Duration::MAX, |expires_at| expires_at.saturating_duration_since(now))
    }
}

/// A cache whose entries expire after a per-entry time-to-live.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    cache: HashMap<K, Entry<V>>,
    ttl: Duration,
    capacity: Option<usize>,
    clock: Arc<dyn Clock>,
    next_seq: u64,
    tick: u64,
    sweep_interval: Duration,
    last_sweep: Instant,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create a new cache with the given default time-to-live.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Create a new cache that reads time from `clock`.
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let last_sweep = clock.now();
        Self {
            cache: HashMap::new(),
            ttl,
            capacity: None,
            clock,
            next_seq: 0,
            tick: 0,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            last_sweep,
        }
    }

    /// Bound the number of stored entries.
    pub fn max_entries(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Sweep expired entries on insert at most once per `interval`.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Insert a value with the default TTL.
    pub fn insert(&mut self, key: K, value: V) {
        let ttl = self.ttl;
        self.insert_with_ttl(key, value, ttl);
    }

    /// Insert or overwrite a value with an explicit TTL.
    ///
    /// A zero TTL stores nothing and removes any previous entry for the key.
    pub fn insert_with_ttl(&mut self, key: K, value: V, ttl: Duration) {
        if ttl.is_zero() {
            self.cache.remove(&key);
            return;
        }

        let now = self.clock.now();
        if now.saturating_duration_since(self.last_sweep) >= self.sweep_interval {
            self.cache.retain(|_, entry| entry.is_live(now));
            self.last_sweep = now;
        }

        self.next_seq += 1;
        self.tick += 1;
        self.cache.insert(
            key,
            Entry {
                value,
                expires_at: now.checked_add(ttl),
                seq: self.next_seq,
                last_access: self.tick,
            },
        );
        self.evict(now);
    }

    /// Get a value if it exists and hasn't expired, marking it recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let now = self.clock.now();
        if !self.cache.get(key)?.is_live(now) {
            self.cache.remove(key);
            return None;
        }

        self.tick += 1;
        let tick = self.tick;
        self.cache.get_mut(key).map(|entry| {
            entry.last_access = tick;
            &entry.value
        })
    }

    /// Get a value without touching its recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        let now = self.clock.now();
        self.cache
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| &entry.value)
    }

    /// Time left before an entry expires.
    ///
    /// Returns `None` if the key doesn't exist or has expired, and
    /// `Duration::MAX` for entries that never expire.
    pub fn remaining_ttl(&self, key: &K) -> Option<Duration> {
        let now = self.clock.now();
        self.cache
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.remaining(now))
    }

    /// Remove an entry, returning the value if it hadn't expired.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let now = self.clock.now();
        self.cache
            .remove(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value)
    }

    /// Check if a key exists and hasn't expired.
    pub fn contains(&self, key: &K) -> bool {
        self.peek(key).is_some()
    }

    /// Remove all expired entries.
    pub fn cleanup(&mut self) {
        let now = self.clock.now();
        self.cache.retain(|_, entry| entry.is_live(now));
        self.last_sweep = now;
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Number of non-expired entries.
    pub fn active_count(&self) -> usize {
        let now = self.clock.now();
        self.cache.values().filter(|entry| entry.is_live(now)).count()
    }

    /// Clear all entries.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// The default TTL applied by [`TtlCache::insert`].
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Change the default TTL. Existing entries keep their own.
    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }

    /// The capacity bound, if any.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn evict(&mut self, now: Instant) {
        let Some(capacity) = self.capacity else {
            return;
        };
        if self.cache.len() <= capacity {
            return;
        }

        let mut expired: Vec<(u64, K)> = self
            .cache
            .iter()
            .filter(|(_, entry)| !entry.is_live(now))
            .map(|(key, entry)| (entry.seq, key.clone()))
            .collect();
        expired.sort_unstable_by_key(|(seq, _)| *seq);
        for (_, key) in expired {
            if self.cache.len() <= capacity {
                return;
            }
            self.cache.remove(&key);
        }

        let mut live: Vec<((u64, u64), K)> = self
            .cache
            .iter()
            .map(|(key, entry)| ((entry.last_access, entry.seq), key.clone()))
            .collect();
        live.sort_unstable_by_key(|(order, _)| *order);
        for (_, key) in live {
            if self.cache.len() <= capacity {
                return;
            }
            self.cache.remove(&key);
        }
    }
}
