//! Query execution engine.
//!
//! [`QueryExecutor`] turns dialect-generated SQL into executed statements and
//! materialized entities. It owns the connection policy:
//!
//! - Without a statement cache, every operation opens a fresh tracked
//!   connection and closes it on every exit path. A close failure after a
//!   successful operation propagates; a close failure after a primary error
//!   is logged and suppressed so the primary error survives.
//! - With a statement cache, operations run on the shape's cached connection,
//!   which stays open until evicted or invalidated.
//!
//! `next_id` never uses the statement cache: its plan runs start to finish on
//! one fresh connection because sequence emulation (MySQL's
//! `LAST_INSERT_ID`) is connection-scoped.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::ExecutionConfig;
use crate::connection::{ConnectionRegistry, ConnectionSource, TrackedConnection};
use crate::dialect::Dialect;
use crate::error::{Result, StorageError};
use crate::query::SqlQuery;
use crate::statement_cache::StatementCache;
use crate::storable::{QueryParam, Storable, StorableKey, StorableRegistry};
use crate::value::FieldMap;

pub struct QueryExecutor {
    config: ExecutionConfig,
    source: Arc<dyn ConnectionSource>,
    dialect: Arc<dyn Dialect>,
    storables: Arc<StorableRegistry>,
    connections: ConnectionRegistry,
    statements: Option<StatementCache>,
}

impl QueryExecutor {
    pub fn new(
        config: ExecutionConfig,
        source: Arc<dyn ConnectionSource>,
        dialect: Arc<dyn Dialect>,
        storables: Arc<StorableRegistry>,
    ) -> Self {
        let statements = config
            .statement_cache_size
            .and_then(NonZeroUsize::new)
            .map(StatementCache::new);
        Self {
            config,
            source,
            dialect,
            storables,
            connections: ConnectionRegistry::new(),
            statements,
        }
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn storables(&self) -> &StorableRegistry {
        &self.storables
    }

    /// Shared connection ledger, exposed for lifecycle assertions in tests.
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub async fn insert(&self, storable: &dyn Storable) -> Result<()> {
        let query = self.dialect.insert(storable)?;
        self.run_update(query).await?;
        Ok(())
    }

    pub async fn insert_or_update(&self, storable: &dyn Storable) -> Result<()> {
        let query = self.dialect.upsert(storable)?;
        self.run_update(query).await?;
        Ok(())
    }

    /// Delete the addressed entity. Yields rows affected (0 or 1).
    pub async fn delete(&self, key: &StorableKey) -> Result<u64> {
        let query = self.dialect.delete(key);
        self.run_update(query).await
    }

    pub async fn select(&self, namespace: &str) -> Result<Vec<Box<dyn Storable>>> {
        let query = self.dialect.select(namespace);
        let rows = self.run_query(query).await?;
        self.materialize(namespace, rows)
    }

    pub async fn select_by_key(&self, key: &StorableKey) -> Result<Option<Box<dyn Storable>>> {
        let query = self.dialect.select_by_key(key);
        let rows = self.run_query(query).await?;
        let entities = self.materialize(key.namespace(), rows)?;
        Ok(entities.into_iter().next())
    }

    pub async fn select_where(
        &self,
        namespace: &str,
        params: &[QueryParam],
    ) -> Result<Vec<Box<dyn Storable>>> {
        let query = self.dialect.select_where(namespace, params);
        let rows = self.run_query(query).await?;
        self.materialize(namespace, rows)
    }

    /// Reserve and return the next id for an auto-increment namespace.
    /// Sequential calls yield strictly increasing positive values even when
    /// rows are deleted in between.
    pub async fn next_id(&self, namespace: &str) -> Result<i64> {
        if !self.storables.is_auto_increment(namespace)? {
            return Err(StorageError::NonIncrementalColumn {
                namespace: namespace.to_string(),
            });
        }
        let plan = self.dialect.next_id(namespace);
        let conn = self.fresh_connection().await?;
        let result = self
            .with_timeout(async {
                for statement in &plan.setup {
                    conn.execute(&statement.text, &statement.params).await?;
                }
                conn.fetch_scalar(&plan.query.text, &plan.query.params).await
            })
            .await;
        self.finish(conn, result).await
    }

    /// Release everything the executor holds: cached statements and every
    /// connection it ever opened.
    pub async fn cleanup(&self) -> Result<()> {
        if let Some(statements) = &self.statements {
            statements.clear().await;
        }
        self.connections.close_all().await;
        Ok(())
    }

    async fn run_update(&self, query: SqlQuery) -> Result<u64> {
        debug!(sql = &*query.text, "executing update");
        match &self.statements {
            Some(statements) => {
                let conn = statements
                    .acquire(&query.shape, self.source.as_ref(), &self.connections)
                    .await?;
                self.with_timeout(conn.execute(&query.text, &query.params))
                    .await
            }
            None => {
                let conn = self.fresh_connection().await?;
                let result = self
                    .with_timeout(conn.execute(&query.text, &query.params))
                    .await;
                self.finish(conn, result).await
            }
        }
    }

    async fn run_query(&self, query: SqlQuery) -> Result<Vec<FieldMap>> {
        debug!(sql = &*query.text, "executing query");
        match &self.statements {
            Some(statements) => {
                let conn = statements
                    .acquire(&query.shape, self.source.as_ref(), &self.connections)
                    .await?;
                self.with_timeout(conn.fetch_all(&query.text, &query.params))
                    .await
            }
            None => {
                let conn = self.fresh_connection().await?;
                let result = self
                    .with_timeout(conn.fetch_all(&query.text, &query.params))
                    .await;
                self.finish(conn, result).await
            }
        }
    }

    async fn fresh_connection(&self) -> Result<TrackedConnection> {
        let conn = self.source.connect().await?;
        Ok(self.connections.track(conn))
    }

    /// Close a one-shot connection without letting the close mask a primary
    /// error.
    async fn finish<T>(&self, conn: TrackedConnection, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                conn.close().await?;
                Ok(value)
            }
            Err(err) => {
                conn.close_quietly().await;
                Err(err)
            }
        }
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.config.query_timeout_ms {
            Some(millis) => tokio::time::timeout(Duration::from_millis(millis), fut)
                .await
                .map_err(|_| StorageError::QueryTimeout { millis })?,
            None => fut.await,
        }
    }

    fn materialize(&self, namespace: &str, rows: Vec<FieldMap>) -> Result<Vec<Box<dyn Storable>>> {
        rows.iter()
            .map(|row| self.storables.materialize(namespace, row))
            .collect()
    }
}
