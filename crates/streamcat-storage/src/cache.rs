//! Bounded in-memory entity cache.
//!
//! Key→entity LRU with hit/miss counters. Unlike the statement cache,
//! evicting an entry here has no side effect beyond freeing memory.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use tokio::sync::Mutex;

use crate::storable::{Storable, StorableKey};

/// Point-in-time counters for cache effectiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub struct StorageCache {
    entries: Mutex<LruCache<StorableKey, Box<dyn Storable>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl StorageCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub async fn get(&self, key: &StorableKey) -> Option<Box<dyn Storable>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entity) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entity.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn put(&self, entity: Box<dyn Storable>) {
        let key = entity.key();
        self.entries.lock().await.put(key, entity);
    }

    pub async fn remove(&self, key: &StorableKey) {
        self.entries.lock().await.pop(key);
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.lock().await.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storable::tests::Widget;

    fn widget(id: i64) -> Widget {
        Widget {
            id,
            name: format!("w{id}"),
        }
    }

    #[tokio::test]
    async fn counts_hits_and_misses() {
        let cache = StorageCache::new(NonZeroUsize::new(8).unwrap());
        let entity = widget(1);

        assert!(cache.get(&entity.key()).await.is_none());
        cache.put(Box::new(entity.clone())).await;
        let cached = cache.get(&entity.key()).await.unwrap();
        assert_eq!(cached.downcast_ref::<Widget>(), Some(&entity));

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn capacity_bounds_resident_entries() {
        let cache = StorageCache::new(NonZeroUsize::new(2).unwrap());
        for id in 0..3 {
            cache.put(Box::new(widget(id))).await;
        }

        // Oldest entry is gone; the newest two remain.
        assert!(cache.get(&widget(0).key()).await.is_none());
        assert!(cache.get(&widget(1).key()).await.is_some());
        assert!(cache.get(&widget(2).key()).await.is_some());
        assert_eq!(cache.stats().await.entries, 2);
    }

    #[tokio::test]
    async fn remove_and_clear_forget_entries() {
        let cache = StorageCache::new(NonZeroUsize::new(8).unwrap());
        cache.put(Box::new(widget(1))).await;
        cache.put(Box::new(widget(2))).await;

        cache.remove(&widget(1).key()).await;
        assert!(cache.get(&widget(1).key()).await.is_none());

        cache.clear().await;
        assert_eq!(cache.stats().await.entries, 0);
    }
}
