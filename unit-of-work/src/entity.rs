//! Entity model and typed field selectors
//!
//! An entity is any `serde` type that names itself and declares its persisted
//! fields through a selector enum. Repositories only ever address columns or
//! document keys through that selector, so an unknown field name is rejected
//! once at the boundary instead of reaching the store.
//!
//! # Example
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use unit_of_work::entity::{Entity, EntityField};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Customer {
//!     #[serde(rename = "Id")]
//!     id: String,
//!     name: String,
//! }
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum CustomerField {
//!     Id,
//!     Name,
//! }
//!
//! impl EntityField for CustomerField {
//!     const ID: Self = Self::Id;
//!
//!     fn name(self) -> &'static str {
//!         match self {
//!             Self::Id => "Id",
//!             Self::Name => "name",
//!         }
//!     }
//!
//!     fn all() -> &'static [Self] {
//!         &[Self::Id, Self::Name]
//!     }
//! }
//!
//! impl Entity for Customer {
//!     type Field = CustomerField;
//! }
//!
//! assert_eq!(Customer::entity_name(), "Customer");
//! assert_eq!(CustomerField::from_name("name"), Some(CustomerField::Name));
//! ```

use std::fmt;
use std::hash::Hash;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::repository::{
    FieldValue, RepositoryError, RepositoryOperation, RepositoryResult,
};

/// Typed selector over the persisted fields of an entity
pub trait EntityField: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// The identity field
    const ID: Self;

    /// Serialized name of the field (column or document key)
    fn name(self) -> &'static str;

    /// Every persisted field, in declaration order
    fn all() -> &'static [Self];

    /// Resolve a serialized name back to its selector
    fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|field| field.name() == name)
    }
}

/// A persistable record type
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + Unpin + 'static {
    /// Field selector for this entity
    type Field: EntityField;

    /// Logical name used for table and collection names and in errors
    ///
    /// Defaults to the simple (unqualified, non-generic) type name.
    fn entity_name() -> &'static str {
        simple_type_name::<Self>()
    }
}

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// Whether `name` can be used as a table, collection or field name as-is
pub(crate) fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Strip module path and generic arguments from a type name
pub(crate) fn simple_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Serialize an entity into a record holding only its declared fields
pub fn to_record<T: Entity>(entity: &T) -> RepositoryResult<Map<String, Value>> {
    let value = serde_json::to_value(entity).map_err(|e| {
        RepositoryError::serialization_error(RepositoryOperation::Create, e.to_string())
            .with_entity(T::entity_name())
            .with_source(e)
    })?;
    let Value::Object(mut object) = value else {
        return Err(RepositoryError::serialization_error(
            RepositoryOperation::Create,
            "Entity did not serialize to an object",
        )
        .with_entity(T::entity_name()));
    };

    let mut record = Map::with_capacity(T::Field::all().len());
    for field in T::Field::all() {
        let name = field.name();
        record.insert(
            name.to_string(),
            object.remove(name).unwrap_or(Value::Null),
        );
    }
    Ok(record)
}

/// Deserialize a record read from a store into an entity
pub fn from_record<T: Entity>(record: Map<String, Value>) -> RepositoryResult<T> {
    serde_json::from_value(Value::Object(record)).map_err(|e| {
        RepositoryError::serialization_error(RepositoryOperation::Find, e.to_string())
            .with_entity(T::entity_name())
            .with_source(e)
    })
}

/// Read the identity value of an entity
pub fn identity_of<T: Entity>(entity: &T) -> RepositoryResult<FieldValue> {
    let mut record = to_record(entity)?;
    let id_name = T::Field::ID.name();
    let value = record.remove(id_name).unwrap_or(Value::Null);
    FieldValue::from_json(&value).ok_or_else(|| {
        RepositoryError::serialization_error(
            RepositoryOperation::Update,
            format!("Identity field '{}' is not a scalar", id_name),
        )
        .with_entity(T::entity_name())
    })
}
