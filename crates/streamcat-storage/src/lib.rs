//! Streamcat Storage Engine
//!
//! Generic persistence layer for the catalog platform. Entities describe
//! themselves as namespaced field maps, dialects turn those maps into
//! parameterized SQL, and the executor runs the SQL with connection tracking
//! and prepared-statement reuse.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────┐
//! │ CacheBackedStorageManager      │  read-through LRU + write policy
//! └──────────────┬─────────────────┘
//!                │
//! ┌──────────────▼─────────────────┐
//! │ SqlStorageManager              │  CRUD contract (StorageManager)
//! └──────────────┬─────────────────┘
//!                │
//! ┌──────────────▼─────────────────┐
//! │ QueryExecutor                  │  timeouts, statement cache,
//! │   Dialect · StorableRegistry   │  connection lifecycle
//! └──────────────┬─────────────────┘
//!                │
//! ┌──────────────▼─────────────────┐
//! │ ConnectionSource (SQLite/MySQL)│  driver connections
//! └────────────────────────────────┘
//! ```
//!
//! ## Usage Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use streamcat_storage::{
//!     CacheBackedStorageManager, ExecutionConfig, QueryExecutor, SqliteConnectionSource,
//!     SqliteDialect, SqlStorageManager, StorableRegistry, StorageManager,
//! };
//!
//! let storables = Arc::new(
//!     StorableRegistry::builder().register::<Topology>()?.build(),
//! );
//! let executor = QueryExecutor::new(
//!     ExecutionConfig::default(),
//!     Arc::new(SqliteConnectionSource::new("sqlite://catalog.db")?),
//!     Arc::new(SqliteDialect::new()),
//!     storables,
//! );
//! let store = SqlStorageManager::new(executor);
//!
//! store.add(Box::new(topology)).await?;
//! let found = store.get(&key).await?;
//! store.cleanup().await?;
//! ```
//!
//! ## Guarantees
//!
//! - `get` is an `Option`; `list`/`find` are always vectors. Emptiness and
//!   absence never blur at the API boundary.
//! - A statement shape is prepared at most once per cache lifetime, even
//!   under concurrent first use.
//! - Every opened connection is registered centrally; `cleanup` reclaims all
//!   of them, and closing twice is a no-op.
//! - `next_id` values are strictly increasing and positive per namespace,
//!   surviving entity deletion.

pub mod cache;
pub mod cached_manager;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod manager;
pub mod query;
pub mod sqlite;
pub mod statement_cache;
pub mod storable;
pub mod value;
pub mod writer;

#[cfg(feature = "mysql")]
pub mod mysql;

pub use cache::{CacheStats, StorageCache};
pub use cached_manager::CacheBackedStorageManager;
pub use config::{CacheConfig, ExecutionConfig};
pub use connection::{Connection, ConnectionRegistry, ConnectionSource, TrackedConnection};
pub use dialect::{Dialect, MySqlDialect, PhoenixDialect, SqliteDialect};
pub use error::{Result, StorageError};
pub use executor::QueryExecutor;
pub use manager::{SqlStorageManager, StorageManager};
pub use query::{NextIdPlan, QueryShape, RawSql, SqlOp, SqlQuery};
pub use sqlite::SqliteConnectionSource;
pub use statement_cache::StatementCache;
pub use storable::{
    QueryParam, Storable, StorableEntity, StorableKey, StorableRegistry, StorableRegistryBuilder,
};
pub use value::{FieldMap, Value};
pub use writer::{StorageWriter, WriteThrough};

#[cfg(feature = "mysql")]
pub use mysql::MySqlConnectionSource;
