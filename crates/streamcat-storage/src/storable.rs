//! Entity, key, and filter model.
//!
//! A [`Storable`] is a catalog entity bound to one namespace (its logical
//! storage location). It exposes its primary-key fields and its full field
//! set, and a [`StorableEntity`] implementation can repopulate itself from a
//! generic column→value map produced by the query executor.
//!
//! The [`StorableRegistry`] is the explicit namespace→constructor map the
//! executor uses to materialize rows. It is built once at startup; an
//! unregistered namespace is a configuration error, and double registration
//! fails fast at build time.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, StorageError};
use crate::value::{FieldMap, Value};

/// Object-safe entity contract.
///
/// Invariant: the key returned by [`Storable::key`] always carries the same
/// namespace the entity reports through [`Storable::namespace`].
pub trait Storable: Any + Send + Sync + fmt::Debug {
    /// Logical storage location for this entity type.
    fn namespace(&self) -> &str;

    /// The primary-key fields, in the fixed per-namespace ordering.
    fn primary_key(&self) -> FieldMap;

    /// All persisted fields, in the fixed per-namespace ordering.
    fn to_fields(&self) -> Result<FieldMap>;

    fn clone_box(&self) -> Box<dyn Storable>;

    fn as_any(&self) -> &dyn Any;

    /// The full address of this entity.
    fn key(&self) -> StorableKey {
        StorableKey::new(self.namespace(), self.primary_key())
    }
}

impl Clone for Box<dyn Storable> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl dyn Storable {
    /// Downcast to a concrete entity type.
    pub fn downcast_ref<T: Storable>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Sized companion to [`Storable`]: ties a concrete type to its namespace and
/// lets the registry reconstruct it from a column map.
pub trait StorableEntity: Storable + Sized + 'static {
    const NAMESPACE: &'static str;

    /// Whether the namespace's primary key is auto-incrementing. Namespaces
    /// where this is `false` reject `next_id`.
    const AUTO_INCREMENT_ID: bool = true;

    /// Reconstruct the entity from a materialized row. Fails with a typed
    /// error on a missing column or an unexpected value kind.
    fn from_fields(fields: &FieldMap) -> Result<Self>;
}

/// (namespace, primary-key fields) address of one entity, also used to scope
/// select/delete queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorableKey {
    namespace: String,
    fields: FieldMap,
}

impl StorableKey {
    pub fn new(namespace: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            namespace: namespace.into(),
            fields,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Compact rendering for error messages.
    pub fn describe(&self) -> String {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|(name, value)| format!("{name}={value:?}"))
            .collect();
        format!("{{{}}}", parts.join(", "))
    }
}

/// Single field-equality filter. A list of params combines conjunctively;
/// there is no OR and no range operator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryParam {
    pub field: String,
    pub value: Value,
}

impl QueryParam {
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

type StorableCtor = fn(&FieldMap) -> Result<Box<dyn Storable>>;

#[derive(Debug)]
struct Registration {
    ctor: StorableCtor,
    auto_increment: bool,
}

/// Explicit namespace→constructor map, built once and passed by reference to
/// the components that need it.
pub struct StorableRegistry {
    types: HashMap<String, Registration>,
}

impl StorableRegistry {
    pub fn builder() -> StorableRegistryBuilder {
        StorableRegistryBuilder {
            types: HashMap::new(),
        }
    }

    /// Construct an entity for `namespace` from a materialized row.
    pub fn materialize(&self, namespace: &str, fields: &FieldMap) -> Result<Box<dyn Storable>> {
        let registration = self.registration(namespace)?;
        (registration.ctor)(fields)
    }

    pub fn is_auto_increment(&self, namespace: &str) -> Result<bool> {
        Ok(self.registration(namespace)?.auto_increment)
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.types.contains_key(namespace)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    fn registration(&self, namespace: &str) -> Result<&Registration> {
        self.types
            .get(namespace)
            .ok_or_else(|| StorageError::UnregisteredNamespace {
                namespace: namespace.to_string(),
            })
    }
}

impl fmt::Debug for StorableRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorableRegistry")
            .field("namespaces", &self.types.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug)]
pub struct StorableRegistryBuilder {
    types: HashMap<String, Registration>,
}

impl StorableRegistryBuilder {
    /// Register an entity type under its namespace. Registering the same
    /// namespace twice is a fail-fast configuration error.
    pub fn register<T: StorableEntity>(mut self) -> Result<Self> {
        fn construct<T: StorableEntity>(fields: &FieldMap) -> Result<Box<dyn Storable>> {
            Ok(Box::new(T::from_fields(fields)?))
        }

        if self.types.contains_key(T::NAMESPACE) {
            return Err(StorageError::DuplicateRegistration {
                namespace: T::NAMESPACE.to_string(),
            });
        }
        self.types.insert(
            T::NAMESPACE.to_string(),
            Registration {
                ctor: construct::<T>,
                auto_increment: T::AUTO_INCREMENT_ID,
            },
        );
        Ok(self)
    }

    pub fn build(self) -> StorableRegistry {
        StorableRegistry { types: self.types }
    }
}
