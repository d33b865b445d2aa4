//! Write policy between a cache layer and its backing store.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::manager::StorageManager;
use crate::storable::{Storable, StorableKey};

/// How mutations reach the backing store. The cache layer applies its own
/// bookkeeping only after the writer reports success.
#[async_trait]
pub trait StorageWriter: Send + Sync {
    async fn add(&self, storable: Box<dyn Storable>) -> Result<()>;

    async fn add_or_update(&self, storable: Box<dyn Storable>) -> Result<()>;

    async fn remove(&self, key: &StorableKey) -> Result<Option<Box<dyn Storable>>>;
}

/// Synchronous write-through: every mutation goes straight to the backing
/// store and failures propagate unchanged.
pub struct WriteThrough<S> {
    store: Arc<S>,
}

impl<S> WriteThrough<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: StorageManager> StorageWriter for WriteThrough<S> {
    async fn add(&self, storable: Box<dyn Storable>) -> Result<()> {
        self.store.add(storable).await
    }

    async fn add_or_update(&self, storable: Box<dyn Storable>) -> Result<()> {
        self.store.add_or_update(storable).await
    }

    async fn remove(&self, key: &StorableKey) -> Result<Option<Box<dyn Storable>>> {
        self.store.remove(key).await
    }
}
