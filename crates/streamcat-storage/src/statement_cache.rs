//! Prepared-statement cache.
//!
//! Maps a [`QueryShape`] to a dedicated connection on which the driver keeps
//! the statement prepared, so repeated operations of the same shape reuse one
//! prepared plan instead of reconnecting and re-preparing per call.
//!
//! Build-once under concurrency: the first miss for a shape installs a
//! pending slot, concurrent misses for the same shape wait on it, and the
//! winner publishes the built entry. A failed build clears the slot so a
//! later call can retry, and a builder whose future is dropped mid-build is
//! treated the same way via a drop guard, so waiters are released rather than
//! parked forever. Pending slots live outside the LRU map and are never
//! evicted.
//!
//! This cache is the one whose eviction has a side effect: dropping an entry,
//! whether by capacity or explicit invalidation, closes the entry's owned
//! connection exactly once. The entity read cache (`cache.rs`) has no such
//! side effect.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::Notify;
use tracing::debug;

use crate::connection::{ConnectionRegistry, ConnectionSource, TrackedConnection};
use crate::error::Result;
use crate::query::QueryShape;

struct Inner {
    ready: LruCache<QueryShape, TrackedConnection>,
    pending: HashMap<QueryShape, Arc<Notify>>,
}

// The map mutex is synchronous and held only across map operations, never
// across an await. That lets PendingGuard clean up from a plain Drop impl.
pub struct StatementCache {
    inner: std::sync::Mutex<Inner>,
}

/// Releases a pending slot that its builder did not publish, whether the
/// build failed or its future was dropped before finishing.
struct PendingGuard<'a> {
    cache: &'a StatementCache,
    shape: Option<QueryShape>,
}

impl PendingGuard<'_> {
    fn disarm(&mut self) {
        self.shape = None;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Some(shape) = self.shape.take() {
            let mut inner = self.cache.lock_inner();
            if let Some(notify) = inner.pending.remove(&shape) {
                notify.notify_waiters();
            }
        }
    }
}

impl StatementCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: std::sync::Mutex::new(Inner {
                ready: LruCache::new(capacity),
                pending: HashMap::new(),
            }),
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Connection holding the prepared statement for `shape`, building it at
    /// most once even under concurrent demand.
    pub async fn acquire(
        &self,
        shape: &QueryShape,
        source: &dyn ConnectionSource,
        registry: &ConnectionRegistry,
    ) -> Result<TrackedConnection> {
        loop {
            // The lock guard is confined to blocks with no awaits inside, so
            // the returned future stays `Send`.
            let notify = {
                let mut inner = self.lock_inner();
                if let Some(conn) = inner.ready.get(shape) {
                    return Ok(conn.clone());
                }
                match inner.pending.get(shape).cloned() {
                    Some(notify) => Some(notify),
                    None => {
                        inner
                            .pending
                            .insert(shape.clone(), Arc::new(Notify::new()));
                        None
                    }
                }
            };
            let Some(notify) = notify else {
                // Armed before the first await so cancellation at any point
                // releases the slot.
                let guard = PendingGuard {
                    cache: self,
                    shape: Some(shape.clone()),
                };
                return self.build(shape, source, registry, guard).await;
            };
            let notified = notify.notified();
            tokio::pin!(notified);
            // Register for the wakeup while holding the lock and the slot is
            // still the one observed above, so a publish landing right after
            // the release is not lost.
            {
                let inner = self.lock_inner();
                match inner.pending.get(shape) {
                    Some(current) if Arc::ptr_eq(current, &notify) => {
                        notified.as_mut().enable();
                    }
                    // Slot already published or released; retry from the top.
                    _ => continue,
                }
            }
            notified.await;
        }
    }

    async fn build(
        &self,
        shape: &QueryShape,
        source: &dyn ConnectionSource,
        registry: &ConnectionRegistry,
        mut guard: PendingGuard<'_>,
    ) -> Result<TrackedConnection> {
        // On Err (or if this future is dropped here) the guard releases the
        // pending slot and wakes the waiters, who will retry the build.
        let built = registry.track(source.connect().await?);

        let evicted = {
            let mut inner = self.lock_inner();
            let evicted = inner.ready.push(shape.clone(), built.clone());
            if let Some(notify) = inner.pending.remove(shape) {
                notify.notify_waiters();
            }
            guard.disarm();
            evicted
        };
        if let Some((evicted_shape, conn)) = evicted {
            debug!(namespace = evicted_shape.namespace(), "evicting cached statement");
            conn.close_quietly().await;
        }
        Ok(built)
    }

    /// Drop the entry for `shape`, closing its connection.
    pub async fn invalidate(&self, shape: &QueryShape) -> Result<()> {
        let entry = self.lock_inner().ready.pop(shape);
        match entry {
            Some(conn) => conn.close().await,
            None => Ok(()),
        }
    }

    /// Drop every cached entry, closing each connection. Close failures are
    /// suppressed so the sweep always completes.
    pub async fn clear(&self) {
        let entries: Vec<TrackedConnection> = {
            let mut inner = self.lock_inner();
            let mut entries = Vec::with_capacity(inner.ready.len());
            while let Some((_, conn)) = inner.ready.pop_lru() {
                entries.push(conn);
            }
            entries
        };
        for conn in entries {
            conn.close_quietly().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.lock_inner().ready.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::MockSource;
    use crate::connection::Connection;
    use crate::query::SqlOp;
    use async_trait::async_trait;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn shape(namespace: &str) -> QueryShape {
        QueryShape::new(namespace, SqlOp::Select, vec![], vec![])
    }

    #[tokio::test]
    async fn same_shape_reuses_one_connection() {
        let cache = StatementCache::new(NonZeroUsize::new(4).unwrap());
        let source = MockSource::new();
        let registry = ConnectionRegistry::new();

        let a = cache.acquire(&shape("widgets"), &source, &registry).await.unwrap();
        let b = cache.acquire(&shape("widgets"), &source, &registry).await.unwrap();
        assert_eq!(source.opened.load(Ordering::SeqCst), 1);
        drop((a, b));

        cache.acquire(&shape("streams"), &source, &registry).await.unwrap();
        assert_eq!(source.opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_build_once() {
        let cache = Arc::new(StatementCache::new(NonZeroUsize::new(4).unwrap()));
        let source = Arc::new(MockSource::new());
        let registry = Arc::new(ConnectionRegistry::new());

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let source = source.clone();
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .acquire(&shape("widgets"), source.as_ref(), registry.as_ref())
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(source.opened.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 1);
    }

    /// Source whose connect never resolves, keeping a builder stuck until
    /// its task is aborted.
    struct StuckSource;

    #[async_trait]
    impl ConnectionSource for StuckSource {
        async fn connect(&self) -> Result<Box<dyn Connection>> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn cancelled_build_releases_the_pending_slot() {
        let cache = Arc::new(StatementCache::new(NonZeroUsize::new(4).unwrap()));
        let registry = Arc::new(ConnectionRegistry::new());

        let stuck = {
            let cache = cache.clone();
            let registry = registry.clone();
            tokio::spawn(async move {
                cache
                    .acquire(&shape("widgets"), &StuckSource, registry.as_ref())
                    .await
            })
        };
        // Wait until the stuck builder holds the pending slot.
        while !cache.lock_inner().pending.contains_key(&shape("widgets")) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        stuck.abort();
        assert!(stuck.await.unwrap_err().is_cancelled());

        // A later caller must be able to build the entry, not wait forever.
        let source = MockSource::new();
        let conn = tokio::time::timeout(
            Duration::from_secs(2),
            cache.acquire(&shape("widgets"), &source, &registry),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(!conn.is_closed().await);
        assert_eq!(source.opened.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn capacity_eviction_closes_exactly_one_connection() {
        let cache = StatementCache::new(NonZeroUsize::new(2).unwrap());
        let source = MockSource::new();
        let registry = ConnectionRegistry::new();

        cache.acquire(&shape("a"), &source, &registry).await.unwrap();
        cache.acquire(&shape("b"), &source, &registry).await.unwrap();
        assert_eq!(source.closed.load(Ordering::SeqCst), 0);

        // Third distinct shape evicts the least recently used entry.
        cache.acquire(&shape("c"), &source, &registry).await.unwrap();
        assert_eq!(source.opened.load(Ordering::SeqCst), 3);
        assert_eq!(source.closed.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn invalidate_closes_the_entry_connection() {
        let cache = StatementCache::new(NonZeroUsize::new(2).unwrap());
        let source = MockSource::new();
        let registry = ConnectionRegistry::new();

        let conn = cache.acquire(&shape("a"), &source, &registry).await.unwrap();
        cache.invalidate(&shape("a")).await.unwrap();
        assert_eq!(source.closed.load(Ordering::SeqCst), 1);
        assert!(conn.is_closed().await);

        // Unknown shape is a no-op.
        cache.invalidate(&shape("zzz")).await.unwrap();
        assert_eq!(source.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clear_closes_every_entry() {
        let cache = StatementCache::new(NonZeroUsize::new(4).unwrap());
        let source = MockSource::new();
        let registry = ConnectionRegistry::new();

        cache.acquire(&shape("a"), &source, &registry).await.unwrap();
        cache.acquire(&shape("b"), &source, &registry).await.unwrap();
        cache.clear().await;
        assert_eq!(source.closed.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len().await, 0);
    }
}
