//! Catalog entity definitions.
//!
//! Each entity lives in one namespace and knows how to flatten itself into a
//! column→value map and rebuild itself from one. Free-form configuration maps
//! are persisted as JSON text columns. Timestamps are milliseconds since the
//! Unix epoch.

use std::any::Any;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use streamcat_storage::value::{optional_text, require_i64, require_text};
use streamcat_storage::{FieldMap, Result, Storable, StorableEntity, Value};

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A deployed stream-processing topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub id: i64,
    pub name: String,
    /// Free-form deployment configuration, stored as JSON text.
    pub config: HashMap<String, String>,
    pub timestamp_ms: i64,
}

impl Topology {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            config: HashMap::new(),
            timestamp_ms: now_ms(),
        }
    }
}

impl Storable for Topology {
    fn namespace(&self) -> &str {
        Self::NAMESPACE
    }

    fn primary_key(&self) -> FieldMap {
        let mut key = FieldMap::new();
        key.insert("id".to_string(), Value::Integer(self.id));
        key
    }

    fn to_fields(&self) -> Result<FieldMap> {
        let mut fields = FieldMap::new();
        fields.insert("id".to_string(), Value::Integer(self.id));
        fields.insert("name".to_string(), Value::Text(self.name.clone()));
        fields.insert(
            "config".to_string(),
            Value::Text(serde_json::to_string(&self.config)?),
        );
        fields.insert("ts".to_string(), Value::Integer(self.timestamp_ms));
        Ok(fields)
    }

    fn clone_box(&self) -> Box<dyn Storable> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl StorableEntity for Topology {
    const NAMESPACE: &'static str = "topologies";

    fn from_fields(fields: &FieldMap) -> Result<Self> {
        let config = match optional_text(fields, "config")? {
            Some(json) => serde_json::from_str(&json)?,
            None => HashMap::new(),
        };
        Ok(Topology {
            id: require_i64(fields, Self::NAMESPACE, "id")?,
            name: require_text(fields, Self::NAMESPACE, "name")?,
            config,
            timestamp_ms: require_i64(fields, Self::NAMESPACE, "ts")?,
        })
    }
}

/// A named stream flowing between topology components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub id: i64,
    pub topology_id: i64,
    pub stream_id: String,
    /// Field schema of the stream, stored as JSON text.
    pub schema: String,
    pub timestamp_ms: i64,
}

impl Storable for StreamInfo {
    fn namespace(&self) -> &str {
        Self::NAMESPACE
    }

    fn primary_key(&self) -> FieldMap {
        let mut key = FieldMap::new();
        key.insert("id".to_string(), Value::Integer(self.id));
        key
    }

    fn to_fields(&self) -> Result<FieldMap> {
        let mut fields = FieldMap::new();
        fields.insert("id".to_string(), Value::Integer(self.id));
        fields.insert("topology_id".to_string(), Value::Integer(self.topology_id));
        fields.insert("stream_id".to_string(), Value::Text(self.stream_id.clone()));
        fields.insert("schema".to_string(), Value::Text(self.schema.clone()));
        fields.insert("ts".to_string(), Value::Integer(self.timestamp_ms));
        Ok(fields)
    }

    fn clone_box(&self) -> Box<dyn Storable> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl StorableEntity for StreamInfo {
    const NAMESPACE: &'static str = "streams";

    fn from_fields(fields: &FieldMap) -> Result<Self> {
        Ok(StreamInfo {
            id: require_i64(fields, Self::NAMESPACE, "id")?,
            topology_id: require_i64(fields, Self::NAMESPACE, "topology_id")?,
            stream_id: require_text(fields, Self::NAMESPACE, "stream_id")?,
            schema: require_text(fields, Self::NAMESPACE, "schema")?,
            timestamp_ms: require_i64(fields, Self::NAMESPACE, "ts")?,
        })
    }
}

/// A registered message parser implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserInfo {
    pub id: i64,
    pub name: String,
    pub class_name: String,
    pub jar_path: String,
    pub version: i64,
    pub timestamp_ms: i64,
}

impl Storable for ParserInfo {
    fn namespace(&self) -> &str {
        Self::NAMESPACE
    }

    fn primary_key(&self) -> FieldMap {
        let mut key = FieldMap::new();
        key.insert("id".to_string(), Value::Integer(self.id));
        key
    }

    fn to_fields(&self) -> Result<FieldMap> {
        let mut fields = FieldMap::new();
        fields.insert("id".to_string(), Value::Integer(self.id));
        fields.insert("name".to_string(), Value::Text(self.name.clone()));
        fields.insert("class_name".to_string(), Value::Text(self.class_name.clone()));
        fields.insert("jar_path".to_string(), Value::Text(self.jar_path.clone()));
        fields.insert("version".to_string(), Value::Integer(self.version));
        fields.insert("ts".to_string(), Value::Integer(self.timestamp_ms));
        Ok(fields)
    }

    fn clone_box(&self) -> Box<dyn Storable> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl StorableEntity for ParserInfo {
    const NAMESPACE: &'static str = "parser_info";

    fn from_fields(fields: &FieldMap) -> Result<Self> {
        Ok(ParserInfo {
            id: require_i64(fields, Self::NAMESPACE, "id")?,
            name: require_text(fields, Self::NAMESPACE, "name")?,
            class_name: require_text(fields, Self::NAMESPACE, "class_name")?,
            jar_path: require_text(fields, Self::NAMESPACE, "jar_path")?,
            version: require_i64(fields, Self::NAMESPACE, "version")?,
            timestamp_ms: require_i64(fields, Self::NAMESPACE, "ts")?,
        })
    }
}

/// An uploaded file resource. Keyed by name plus version, so the namespace
/// has no auto-increment id and `next_id` on it is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileResource {
    pub name: String,
    pub stored_path: String,
    pub version: i64,
    pub timestamp_ms: i64,
}

impl Storable for FileResource {
    fn namespace(&self) -> &str {
        Self::NAMESPACE
    }

    fn primary_key(&self) -> FieldMap {
        let mut key = FieldMap::new();
        key.insert("name".to_string(), Value::Text(self.name.clone()));
        key.insert("version".to_string(), Value::Integer(self.version));
        key
    }

    fn to_fields(&self) -> Result<FieldMap> {
        let mut fields = FieldMap::new();
        fields.insert("name".to_string(), Value::Text(self.name.clone()));
        fields.insert("stored_path".to_string(), Value::Text(self.stored_path.clone()));
        fields.insert("version".to_string(), Value::Integer(self.version));
        fields.insert("ts".to_string(), Value::Integer(self.timestamp_ms));
        Ok(fields)
    }

    fn clone_box(&self) -> Box<dyn Storable> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl StorableEntity for FileResource {
    const NAMESPACE: &'static str = "files";
    const AUTO_INCREMENT_ID: bool = false;

    fn from_fields(fields: &FieldMap) -> Result<Self> {
        Ok(FileResource {
            name: require_text(fields, Self::NAMESPACE, "name")?,
            stored_path: require_text(fields, Self::NAMESPACE, "stored_path")?,
            version: require_i64(fields, Self::NAMESPACE, "version")?,
            timestamp_ms: require_i64(fields, Self::NAMESPACE, "ts")?,
        })
    }
}
