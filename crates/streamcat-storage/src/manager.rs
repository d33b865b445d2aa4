//! Storage manager contract and its SQL-backed implementation.

use async_trait::async_trait;

use crate::error::{Result, StorageError};
use crate::executor::QueryExecutor;
use crate::storable::{QueryParam, Storable, StorableKey};

/// CRUD surface over namespaced entities. The read side never conflates
/// emptiness with absence: `get` is an `Option`, `list`/`find` are always
/// vectors.
#[async_trait]
pub trait StorageManager: Send + Sync {
    /// Insert-only. A live entity under the same key with equal state is a
    /// no-op; one with different state is [`StorageError::AlreadyExists`].
    async fn add(&self, storable: Box<dyn Storable>) -> Result<()>;

    /// Idempotent upsert.
    async fn add_or_update(&self, storable: Box<dyn Storable>) -> Result<()>;

    /// Delete the addressed entity, yielding the prior value if it existed.
    async fn remove(&self, key: &StorableKey) -> Result<Option<Box<dyn Storable>>>;

    async fn get(&self, key: &StorableKey) -> Result<Option<Box<dyn Storable>>>;

    async fn list(&self, namespace: &str) -> Result<Vec<Box<dyn Storable>>>;

    /// Entities matching every filter. An empty filter list is equivalent to
    /// [`StorageManager::list`].
    async fn find(
        &self,
        namespace: &str,
        params: &[QueryParam],
    ) -> Result<Vec<Box<dyn Storable>>>;

    /// Next id for an auto-increment namespace.
    async fn next_id(&self, namespace: &str) -> Result<i64>;

    /// Release held resources. The manager must not be used afterwards.
    async fn cleanup(&self) -> Result<()>;
}

/// SQL-backed manager over a [`QueryExecutor`].
pub struct SqlStorageManager {
    executor: QueryExecutor,
}

impl SqlStorageManager {
    pub fn new(executor: QueryExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }
}

#[async_trait]
impl StorageManager for SqlStorageManager {
    async fn add(&self, storable: Box<dyn Storable>) -> Result<()> {
        let key = storable.key();
        if let Some(existing) = self.executor.select_by_key(&key).await? {
            // Re-adding identical state is accepted; conflicting state is not.
            if existing.to_fields()? == storable.to_fields()? {
                return Ok(());
            }
            return Err(StorageError::AlreadyExists {
                namespace: key.namespace().to_string(),
                key: key.describe(),
            });
        }
        self.executor.insert(storable.as_ref()).await
    }

    async fn add_or_update(&self, storable: Box<dyn Storable>) -> Result<()> {
        self.executor.insert_or_update(storable.as_ref()).await
    }

    async fn remove(&self, key: &StorableKey) -> Result<Option<Box<dyn Storable>>> {
        let prior = self.executor.select_by_key(key).await?;
        if prior.is_some() {
            self.executor.delete(key).await?;
        }
        Ok(prior)
    }

    async fn get(&self, key: &StorableKey) -> Result<Option<Box<dyn Storable>>> {
        self.executor.select_by_key(key).await
    }

    async fn list(&self, namespace: &str) -> Result<Vec<Box<dyn Storable>>> {
        self.executor.select(namespace).await
    }

    async fn find(
        &self,
        namespace: &str,
        params: &[QueryParam],
    ) -> Result<Vec<Box<dyn Storable>>> {
        self.executor.select_where(namespace, params).await
    }

    async fn next_id(&self, namespace: &str) -> Result<i64> {
        self.executor.next_id(namespace).await
    }

    async fn cleanup(&self) -> Result<()> {
        self.executor.cleanup().await
    }
}
