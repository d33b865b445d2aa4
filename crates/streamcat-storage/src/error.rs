//! Error types for the storage engine.
//!
//! Every fallible operation in this crate returns [`Result`], aliased to
//! `Result<T, StorageError>` so call sites can propagate with `?`.
//!
//! Two failures are distinguishable from the generic driver wrapper because
//! callers branch on them:
//! - [`StorageError::NonIncrementalColumn`] — `next_id` was asked for a
//!   namespace whose key is not auto-incrementing.
//! - [`StorageError::AlreadyExists`] — `add` found a live entity under the key.
//!
//! Registration mistakes (`DuplicateRegistration`, `UnregisteredNamespace`)
//! are programmer errors surfaced at startup or first use; they are never
//! retried.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Catch-all for connect/prepare/execute/fetch failures. Always carries
    /// the driver cause.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A statement exceeded the configured per-statement timeout.
    #[error("query timed out after {millis}ms")]
    QueryTimeout { millis: u64 },

    /// Operation attempted on a connection that was already closed.
    #[error("connection is closed")]
    ConnectionClosed,

    /// `add` is insert-only; the key was already present.
    #[error("entity already exists in namespace '{namespace}' under key {key}")]
    AlreadyExists { namespace: String, key: String },

    /// `next_id` on a namespace whose primary key is not auto-incrementing.
    #[error("namespace '{namespace}' does not have an auto-increment key")]
    NonIncrementalColumn { namespace: String },

    /// A result column's backend type has no semantic value mapping.
    #[error("unsupported column type '{sql_type}' for column '{column}'")]
    UnsupportedColumnType { column: String, sql_type: String },

    /// No factory was registered for the namespace. Fatal configuration
    /// error, not a runtime lookup failure.
    #[error("no storable registered for namespace '{namespace}'")]
    UnregisteredNamespace { namespace: String },

    /// A factory was registered twice for the same namespace.
    #[error("storable already registered for namespace '{namespace}'")]
    DuplicateRegistration { namespace: String },

    /// A column required to populate an entity was absent from the row.
    #[error("missing field '{field}' in namespace '{namespace}'")]
    MissingField { namespace: String, field: String },

    /// A column held a value kind the entity did not expect.
    #[error("field '{field}' has unexpected type, expected {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
