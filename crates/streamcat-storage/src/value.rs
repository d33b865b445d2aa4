//! Semantic value model for entity fields and bind parameters.
//!
//! Every backend column type maps to exactly one [`Value`] kind when rows are
//! materialized, and every entity field maps to one kind when bound into a
//! statement. The mapping table lives with each backend (see `sqlite.rs`);
//! a column type outside the table is a hard [`UnsupportedColumnType`]
//! error, never silently dropped data.
//!
//! [`UnsupportedColumnType`]: crate::StorageError::UnsupportedColumnType

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use crate::error::{Result, StorageError};

/// Ordered column name → value map. `BTreeMap` iteration order gives the
/// fixed per-namespace column ordering that keeps generated SQL text stable.
pub type FieldMap = BTreeMap<String, Value>;

/// One semantic value kind. Timestamps are milliseconds since the Unix epoch.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(i64),
}

impl Value {
    /// Short kind name, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) | Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }
}

// Floats compare and hash by bit pattern so values can participate in cache
// keys with total equality.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(v) => v.hash(state),
            Value::Integer(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Text(v) => v.hash(state),
            Value::Bytes(v) => v.hash(state),
            Value::Timestamp(v) => v.hash(state),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// Required-field extraction used by `from_fields` implementations. A missing
/// column or a wrong value kind is a typed error; no partially populated
/// entity ever reaches a caller.
pub fn require<'a>(fields: &'a FieldMap, namespace: &str, field: &str) -> Result<&'a Value> {
    fields
        .get(field)
        .ok_or_else(|| StorageError::MissingField {
            namespace: namespace.to_string(),
            field: field.to_string(),
        })
}

pub fn require_i64(fields: &FieldMap, namespace: &str, field: &str) -> Result<i64> {
    require(fields, namespace, field)?
        .as_i64()
        .ok_or_else(|| StorageError::TypeMismatch {
            field: field.to_string(),
            expected: "integer",
        })
}

pub fn require_text(fields: &FieldMap, namespace: &str, field: &str) -> Result<String> {
    require(fields, namespace, field)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| StorageError::TypeMismatch {
            field: field.to_string(),
            expected: "text",
        })
}

/// Optional text extraction: an absent column and a SQL NULL both read as
/// `None`.
pub fn optional_text(fields: &FieldMap, field: &str) -> Result<Option<String>> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Text(v)) => Ok(Some(v.clone())),
        Some(_) => Err(StorageError::TypeMismatch {
            field: field.to_string(),
            expected: "text",
        }),
    }
}

/// Optional integer extraction with the same NULL semantics.
pub fn optional_i64(fields: &FieldMap, field: &str) -> Result<Option<i64>> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| StorageError::TypeMismatch {
                field: field.to_string(),
                expected: "integer",
            }),
    }
}
