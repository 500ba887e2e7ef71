use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::trace;

use super::keys::NO_CACHE;

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// In-process value cache with a fixed time-to-live per entry.
///
/// Expiry is absolute (`inserted + ttl`), never sliding. Expired entries are
/// purged at the start of every lookup. Two callers missing on the same key at
/// once may both compute; the first stored value is kept and returned to both.
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }

    /// Cached value for `key`, computing it with `compute` on a miss.
    pub fn get_or_insert_with<F>(&self, key: &str, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        match self.get_or_try_insert_with(key, || Ok::<_, std::convert::Infallible>(compute())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like [`get_or_insert_with`](Self::get_or_insert_with), but errors are
    /// returned to the caller and never cached.
    pub fn get_or_try_insert_with<F, E>(&self, key: &str, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));

        if key == NO_CACHE {
            trace!("Cache bypass");
            return compute();
        }

        if let Some(entry) = self.entries.get(key) {
            trace!(key, "Cache hit");
            return Ok(entry.value.clone());
        }

        trace!(key, "Cache miss");
        let value = compute()?;
        let stored = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry {
                value,
                expires_at: now + self.ttl,
            });
        Ok(stored.value.clone())
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.purge_expired();
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
