//! StreamCat Catalog Entities
//!
//! Entity definitions the catalog platform persists through
//! `streamcat-storage`: topologies, streams, parsers, and uploaded file
//! resources, plus the namespace registration the storage engine needs to
//! materialize query results.

pub mod types;

pub use types::{now_ms, FileResource, ParserInfo, StreamInfo, Topology};

use streamcat_storage::{Result, StorableRegistry};

/// Registry covering every catalog namespace. Built once at startup and
/// handed to the query executor.
pub fn storable_registry() -> Result<StorableRegistry> {
    Ok(StorableRegistry::builder()
        .register::<Topology>()?
        .register::<StreamInfo>()?
        .register::<ParserInfo>()?
        .register::<FileResource>()?
        .build())
}
