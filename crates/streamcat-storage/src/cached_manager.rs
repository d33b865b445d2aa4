//! Cache-backed storage manager.
//!
//! Wraps a backing [`StorageManager`] with the bounded entity cache and a
//! [`StorageWriter`] policy. Reads go through the cache; mutations go through
//! the writer first and touch the cache only after the write succeeded, so a
//! failed write can never leave the cache ahead of the store.
//!
//! `list` and `find` always bypass the cache: a bounded key→entity cache
//! cannot answer "everything in this namespace" without risking a stale or
//! partial view.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::{CacheStats, StorageCache};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::manager::StorageManager;
use crate::storable::{QueryParam, Storable, StorableKey};
use crate::writer::{StorageWriter, WriteThrough};

pub struct CacheBackedStorageManager<S, W> {
    store: Arc<S>,
    writer: W,
    cache: StorageCache,
}

impl<S: StorageManager> CacheBackedStorageManager<S, WriteThrough<S>> {
    /// Write-through composition over one backing store.
    pub fn write_through(store: S, config: CacheConfig) -> Self {
        let store = Arc::new(store);
        Self {
            writer: WriteThrough::new(store.clone()),
            cache: StorageCache::new(config.bounded_capacity()),
            store,
        }
    }
}

impl<S: StorageManager, W: StorageWriter> CacheBackedStorageManager<S, W> {
    pub fn with_writer(store: Arc<S>, writer: W, config: CacheConfig) -> Self {
        Self {
            store,
            writer,
            cache: StorageCache::new(config.bounded_capacity()),
        }
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }
}

#[async_trait]
impl<S: StorageManager, W: StorageWriter> StorageManager for CacheBackedStorageManager<S, W> {
    async fn add(&self, storable: Box<dyn Storable>) -> Result<()> {
        self.writer.add(storable.clone()).await?;
        self.cache.put(storable).await;
        Ok(())
    }

    async fn add_or_update(&self, storable: Box<dyn Storable>) -> Result<()> {
        self.writer.add_or_update(storable.clone()).await?;
        self.cache.put(storable).await;
        Ok(())
    }

    async fn remove(&self, key: &StorableKey) -> Result<Option<Box<dyn Storable>>> {
        let prior = self.writer.remove(key).await?;
        self.cache.remove(key).await;
        Ok(prior)
    }

    async fn get(&self, key: &StorableKey) -> Result<Option<Box<dyn Storable>>> {
        if let Some(entity) = self.cache.get(key).await {
            return Ok(Some(entity));
        }
        let entity = self.store.get(key).await?;
        if let Some(entity) = &entity {
            self.cache.put(entity.clone()).await;
        }
        Ok(entity)
    }

    async fn list(&self, namespace: &str) -> Result<Vec<Box<dyn Storable>>> {
        self.store.list(namespace).await
    }

    async fn find(
        &self,
        namespace: &str,
        params: &[QueryParam],
    ) -> Result<Vec<Box<dyn Storable>>> {
        self.store.find(namespace, params).await
    }

    async fn next_id(&self, namespace: &str) -> Result<i64> {
        self.store.next_id(namespace).await
    }

    async fn cleanup(&self) -> Result<()> {
        self.cache.clear().await;
        self.store.cleanup().await
    }
}
