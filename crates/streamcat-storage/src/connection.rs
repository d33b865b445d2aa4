//! Connection abstraction and lifecycle bookkeeping.
//!
//! The executor never talks to a driver connection directly. Every connection
//! a [`ConnectionSource`] opens is wrapped in a [`TrackedConnection`] and
//! registered with the shared [`ConnectionRegistry`], so `close_all` can
//! reclaim everything the engine ever opened, whether the connection is
//! currently parked inside the statement cache or in flight in a one-shot
//! call. Close is idempotent: the slot is emptied exactly once, and closing
//! again is a no-op.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{Result, StorageError};
use crate::value::{FieldMap, Value};

/// One live database connection.
#[async_trait]
pub trait Connection: Send {
    /// Run a statement that returns no rows. Yields rows affected.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Run a query and eagerly drain every row into a column→value map.
    async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<FieldMap>>;

    /// Run a query expected to yield a single integer scalar.
    async fn fetch_scalar(&mut self, sql: &str, params: &[Value]) -> Result<i64>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Factory for fresh connections.
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>>;
}

type Slot = Arc<Mutex<Option<Box<dyn Connection>>>>;

/// Handle to one registered connection. Cloning shares the underlying slot,
/// so the statement cache and the registry can both close the same
/// connection without double-closing it.
#[derive(Clone)]
pub struct TrackedConnection {
    slot: Slot,
}

impl std::fmt::Debug for TrackedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedConnection").finish_non_exhaustive()
    }
}

impl TrackedConnection {
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let mut guard = self.slot.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::ConnectionClosed)?;
        conn.execute(sql, params).await
    }

    pub async fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<FieldMap>> {
        let mut guard = self.slot.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::ConnectionClosed)?;
        conn.fetch_all(sql, params).await
    }

    pub async fn fetch_scalar(&self, sql: &str, params: &[Value]) -> Result<i64> {
        let mut guard = self.slot.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::ConnectionClosed)?;
        conn.fetch_scalar(sql, params).await
    }

    /// Close the underlying connection. The first call releases the driver
    /// handle; subsequent calls return `Ok(())`.
    pub async fn close(&self) -> Result<()> {
        let conn = self.slot.lock().await.take();
        match conn {
            Some(conn) => conn.close().await,
            None => Ok(()),
        }
    }

    /// Close after a primary error: failures here are logged and suppressed
    /// so they never mask the error the caller is already propagating.
    pub async fn close_quietly(&self) {
        if let Err(error) = self.close().await {
            warn!(%error, "failed to close connection during cleanup");
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.slot.lock().await.is_none()
    }
}

/// Shared ledger of every connection the engine has opened.
#[derive(Default)]
pub struct ConnectionRegistry {
    slots: std::sync::Mutex<Vec<Slot>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap and register a freshly opened connection.
    pub fn track(&self, conn: Box<dyn Connection>) -> TrackedConnection {
        let slot: Slot = Arc::new(Mutex::new(Some(conn)));
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        // Closed slots are dropped here instead of growing without bound.
        slots.retain(|s| s.try_lock().map(|g| g.is_some()).unwrap_or(true));
        slots.push(slot.clone());
        TrackedConnection { slot }
    }

    /// Close every registered connection. Individual close failures are
    /// logged and do not stop the sweep.
    pub async fn close_all(&self) {
        let slots: Vec<Slot> = {
            let mut guard = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        for slot in slots {
            let conn = slot.lock().await.take();
            if let Some(conn) = conn {
                if let Err(error) = conn.close().await {
                    warn!(%error, "failed to close connection during shutdown");
                }
            }
        }
    }

    /// Number of registered connections that are still open.
    pub async fn open_count(&self) -> usize {
        let slots: Vec<Slot> = {
            let guard = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            guard.clone()
        };
        let mut open = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                open += 1;
            }
        }
        open
    }
}
